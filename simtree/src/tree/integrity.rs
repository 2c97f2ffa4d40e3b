//! Structural verification of a tree.

use super::entry::Entry;
use super::region::{NodeOf, RegionModel};
use super::tree_impl::IndexTree;
use super::tree_types::{IndexError, IndexResult, PageId};
use crate::page::PageFile;

/// Summary of a successful integrity check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    pub nodes: u64,
    pub leaf_nodes: u64,
    pub directory_nodes: u64,
    /// Leaf entries, i.e. stored objects
    pub entries: u64,
    pub height: u32,
    /// Mean of entries / capacity over all nodes
    pub average_fill: f64,
}

impl<M, P> IndexTree<M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    /// Walks the whole tree and verifies its invariants:
    /// - node levels decrease by one per step, all leaves at level 0
    /// - non-root nodes hold between the minimum and maximum entry count
    /// - every entry lies within the region of its parent entry
    /// - the number of leaf entries equals the size of the tree
    ///
    /// Returns the first violation found as
    /// [`IndexError::IntegrityViolation`].
    pub fn integrity_check(&self) -> IndexResult<IntegrityReport> {
        let mut report = IntegrityReport {
            height: self.height(),
            ..Default::default()
        };
        let mut fill_sum = 0.0;
        let mut stack: Vec<(PageId, u32, Option<M::Region>)> =
            vec![(self.root_page(), self.root_level(), None)];

        while let Some((page_id, expected_level, parent_region)) = stack.pop() {
            let node = self.read_node(page_id)?;
            let is_root = page_id == self.root_page();
            if node.level != expected_level {
                return Err(IndexError::IntegrityViolation(format!(
                    "page {} is at level {}, expected {}",
                    page_id, node.level, expected_level
                )));
            }

            let capacities = self.capacities();
            let max = capacities.max_entries(node.level);
            let min = capacities.min_entries(node.level);
            if node.len() > max {
                return Err(IndexError::IntegrityViolation(format!(
                    "page {} holds {} entries, capacity is {}",
                    page_id,
                    node.len(),
                    max
                )));
            }
            if !is_root && node.len() < min {
                return Err(IndexError::IntegrityViolation(format!(
                    "page {} holds {} entries, minimum is {}",
                    page_id,
                    node.len(),
                    min
                )));
            }
            if is_root && !node.is_leaf() && node.is_empty() {
                return Err(IndexError::IntegrityViolation(format!(
                    "directory root {} is empty",
                    page_id
                )));
            }

            report.nodes += 1;
            fill_sum += node.len() as f64 / max as f64;
            if node.is_leaf() {
                report.leaf_nodes += 1;
            } else {
                report.directory_nodes += 1;
            }

            for entry in &node.entries {
                if entry.is_leaf() != node.is_leaf() {
                    return Err(IndexError::IntegrityViolation(format!(
                        "page {} at level {} mixes leaf and directory entries",
                        page_id, node.level
                    )));
                }
                self.model().validate_entry(parent_region.as_ref(), entry)?;
                match entry {
                    Entry::Leaf(_) => report.entries += 1,
                    Entry::Directory(dir) => {
                        stack.push((dir.child, node.level - 1, Some(dir.region.clone())))
                    }
                }
            }
        }

        if report.entries != self.size() {
            return Err(IndexError::IntegrityViolation(format!(
                "tree holds {} objects, size is {}",
                report.entries,
                self.size()
            )));
        }
        report.average_fill = if report.nodes > 0 {
            fill_sum / report.nodes as f64
        } else {
            0.0
        };
        Ok(report)
    }
}
