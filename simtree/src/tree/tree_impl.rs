//! IndexTree implementation: insertion, deletion and bulk loading.

use log::{debug, info, trace};

use super::entry::{Entry, Node};
use super::path::{IndexTreePath, ReinsertionState};
use super::region::{EntryOf, NodeOf, RegionModel, SplitResult};
use super::settings::{Capacities, OverflowTreatment, ReinsertVariant, TreeSettings};
use super::tree_types::{IndexError, IndexResult, ObjectId, PageId, TreeStatistics, TreeStats};
use crate::page::{PageFile, TreeMeta};

/// A balanced, paged index tree.
///
/// The tree core is written once against a [`RegionModel`]; the spatial
/// ([`crate::RStarTree`]) and metric ([`crate::MTree`]) trees are two
/// instantiations of it.
///
/// Mutating operations take `&mut self`, so a single writer is enforced by
/// the borrow checker. Queries take `&self` and may run concurrently.
pub struct IndexTree<M: RegionModel, P: PageFile<NodeOf<M>>> {
    model: M,
    pages: P,
    settings: TreeSettings,
    capacities: Capacities,
    root_page: PageId,
    /// Level of the root node, leaves being level 0
    root_level: u32,
    size: u64,
    stats: TreeStatistics,
}

impl<M, P> IndexTree<M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    /// Creates an empty tree in `pages`.
    ///
    /// Capacities are derived from the page size of `pages`. Fails with a
    /// configuration error if `pages` already holds a tree.
    pub fn create(model: M, pages: P, settings: TreeSettings) -> IndexResult<Self> {
        if pages.load_meta()?.is_some() {
            return Err(IndexError::Configuration(
                "page file already holds a tree, open it instead".into(),
            ));
        }
        let settings = TreeSettings {
            page_size: pages.page_size(),
            ..settings
        };
        let (example_leaf, example_directory) = model.example_entries();
        let capacities = Capacities::derive(&settings, &example_leaf, &example_directory)?;

        let root_page = pages.allocate_id()?;
        pages.write_node(root_page, Node::empty_leaf())?;

        let tree = Self {
            model,
            pages,
            settings,
            capacities,
            root_page,
            root_level: 0,
            size: 0,
            stats: TreeStatistics::default(),
        };
        tree.store_meta()?;
        debug!(
            "Created tree: leaf capacity {}, directory capacity {}, min fill {}/{}",
            capacities.leaf, capacities.directory, capacities.leaf_min, capacities.directory_min
        );
        Ok(tree)
    }

    /// Reopens the tree stored in `pages` by a previous session.
    ///
    /// Capacities are taken from the stored metadata; `model` must be
    /// configured like the one the tree was created with.
    pub fn open(model: M, pages: P, settings: TreeSettings) -> IndexResult<Self> {
        let meta = pages.load_meta()?.ok_or_else(|| {
            IndexError::Configuration("page file does not hold a tree".into())
        })?;
        let settings = TreeSettings {
            page_size: pages.page_size(),
            ..settings
        };
        settings.validate()?;
        let capacities = Capacities::with_capacities(
            meta.leaf_capacity as usize,
            meta.directory_capacity as usize,
            settings.min_fill,
        );
        debug!(
            "Opened tree: {} entries, root page {} at level {}",
            meta.entry_count, meta.root_page, meta.root_level
        );

        Ok(Self {
            model,
            pages,
            settings,
            capacities,
            root_page: meta.root_page,
            root_level: meta.root_level,
            size: meta.entry_count,
            stats: TreeStatistics::default(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn page_file(&self) -> &P {
        &self.pages
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    pub fn capacities(&self) -> Capacities {
        self.capacities
    }

    /// Number of stored objects
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of levels; 0 for an empty tree
    pub fn height(&self) -> u32 {
        if self.size == 0 && self.root_level == 0 {
            0
        } else {
            self.root_level + 1
        }
    }

    pub fn root_page(&self) -> PageId {
        self.root_page
    }

    pub fn root_level(&self) -> u32 {
        self.root_level
    }

    pub fn read_node(&self, page_id: PageId) -> IndexResult<NodeOf<M>> {
        self.pages.read_node(page_id)
    }

    pub(crate) fn statistics(&self) -> &TreeStatistics {
        &self.stats
    }

    /// Writes dirty pages and metadata through to the page file
    pub fn flush(&self) -> IndexResult<()> {
        self.store_meta()?;
        self.pages.flush()
    }

    fn store_meta(&self) -> IndexResult<()> {
        self.pages.store_meta(&TreeMeta {
            root_page: self.root_page,
            root_level: self.root_level,
            entry_count: self.size,
            leaf_capacity: self.capacities.leaf as u32,
            directory_capacity: self.capacities.directory as u32,
        })
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Inserts the object stored under `id` in the relation.
    pub fn insert(&mut self, id: ObjectId) -> IndexResult<()> {
        let leaf = self.model.leaf_entry(id)?;
        let mut state = ReinsertionState::new();
        self.insert_entry(Entry::Leaf(leaf), 0, &mut state)?;
        self.size += 1;
        self.store_meta()
    }

    /// Inserts all objects. An empty tree configured for bulk loading is
    /// bulk loaded instead.
    pub fn insert_all(&mut self, ids: &[ObjectId]) -> IndexResult<()> {
        if self.settings.bulk_load && self.size == 0 {
            return self.bulk_load(ids);
        }
        for id in ids {
            self.insert(*id)?;
        }
        Ok(())
    }

    /// Inserts `entry` into a node at `level`, then repairs the path.
    fn insert_entry(
        &mut self,
        mut entry: EntryOf<M>,
        level: u32,
        state: &mut ReinsertionState,
    ) -> IndexResult<()> {
        let (path, mut node, parent_region) = self.choose_path(&entry, level)?;
        self.model.attach(&mut entry, parent_region.as_ref())?;
        node.entries.push(entry);
        self.adjust_tree(path, node, state)
    }

    /// Descends from the root to the node at `level` the insertion
    /// strategy picks for `candidate`. Also returns the region of the
    /// directory entry pointing to that node.
    fn choose_path(
        &self,
        candidate: &EntryOf<M>,
        level: u32,
    ) -> IndexResult<(IndexTreePath, NodeOf<M>, Option<M::Region>)> {
        let height = (self.root_level + 1) as usize;
        let mut path = IndexTreePath::new();
        let mut node_id = self.root_page;
        let mut node = self.pages.read_node(node_id)?;
        let mut parent_region = None;
        path.push(node_id, 0);

        while node.level > level {
            let index = self
                .model
                .choose_subtree(&node.entries, candidate, height, path.depth())?;
            let (child, region) = match node.entries.get(index) {
                Some(Entry::Directory(dir)) => (dir.child, dir.region.clone()),
                _ => {
                    return Err(IndexError::IntegrityViolation(format!(
                        "no directory entry {} in page {}",
                        index, node_id
                    )))
                }
            };
            trace!("level {}: descending into entry {} (page {})", node.level, index, child);
            path.set_last_index(index);
            parent_region = Some(region);
            node_id = child;
            node = self.pages.read_node(node_id)?;
            path.push(node_id, 0);
        }

        if node.level != level {
            return Err(IndexError::IntegrityViolation(format!(
                "page {} is at level {}, expected {}",
                node_id, node.level, level
            )));
        }
        Ok((path, node, parent_region))
    }

    /// Unwinds `path` after `node` (its last step) gained entries: treats
    /// overflows and adjusts the regions of the ancestors.
    fn adjust_tree(
        &mut self,
        mut path: IndexTreePath,
        mut node: NodeOf<M>,
        state: &mut ReinsertionState,
    ) -> IndexResult<()> {
        loop {
            let node_id = match path.last() {
                Some(step) => step.node_id,
                None => return Err(IndexError::IntegrityViolation("empty path".into())),
            };
            let level = node.level;

            if node.len() <= self.capacities.max_entries(level) {
                self.adjust_regions(&path, &node)?;
                return self.pages.write_node(node_id, node);
            }

            if !path.is_root() {
                if let OverflowTreatment::LimitedReinsert { fraction, variant } =
                    self.settings.overflow_treatment
                {
                    if state.try_mark(level) {
                        let count = (fraction * node.len() as f64).floor() as usize;
                        if count > 0 {
                            return self.reinsert(path, node, count, variant, state);
                        }
                    }
                }
            }

            // Split: the first group stays in place
            let own_region = self.parent_region(&path)?;
            let entries = std::mem::take(&mut node.entries);
            let count = entries.len();
            let SplitResult {
                first,
                first_region,
                second,
                second_region,
            } = self.model.split(
                entries,
                own_region.as_ref(),
                self.capacities.min_entries(level),
            )?;
            let sibling_id = self.pages.allocate_id()?;
            debug!(
                "Split page {} at level {} ({} entries) into {} + {} (new page {})",
                node_id,
                level,
                count,
                first.len(),
                second.len(),
                sibling_id
            );
            self.pages.write_node(node_id, Node::new(level, first))?;
            self.pages.write_node(sibling_id, Node::new(level, second))?;
            TreeStatistics::increment(&self.stats.splits);

            if path.is_root() {
                let mut left = Entry::directory(node_id, first_region);
                let mut right = Entry::directory(sibling_id, second_region);
                self.model.attach(&mut left, None)?;
                self.model.attach(&mut right, None)?;

                let root_id = self.pages.allocate_id()?;
                self.pages
                    .write_node(root_id, Node::new(level + 1, vec![left, right]))?;
                self.root_page = root_id;
                self.root_level = level + 1;
                debug!("New root page {}, height is now {}", root_id, self.root_level + 1);
                return Ok(());
            }

            path.pop();
            let parent_step = match path.last() {
                Some(step) => *step,
                None => return Err(IndexError::IntegrityViolation("empty path".into())),
            };
            let parent_own_region = self.parent_region(&path)?;
            let mut left = Entry::directory(node_id, first_region);
            let mut right = Entry::directory(sibling_id, second_region);
            self.model.attach(&mut left, parent_own_region.as_ref())?;
            self.model.attach(&mut right, parent_own_region.as_ref())?;

            let mut parent = self.pages.read_node(parent_step.node_id)?;
            match parent.entries.get_mut(parent_step.entry_index) {
                Some(slot) => *slot = left,
                None => {
                    return Err(IndexError::IntegrityViolation(format!(
                        "no entry {} in page {}",
                        parent_step.entry_index, parent_step.node_id
                    )))
                }
            }
            parent.entries.push(right);
            node = parent;
        }
    }

    /// Forced reinsertion: removes `count` entries of the overflowing last
    /// node of `path` and inserts them again from the root.
    fn reinsert(
        &mut self,
        path: IndexTreePath,
        mut node: NodeOf<M>,
        count: usize,
        variant: ReinsertVariant,
        state: &mut ReinsertionState,
    ) -> IndexResult<()> {
        let node_id = match path.last() {
            Some(step) => step.node_id,
            None => return Err(IndexError::IntegrityViolation("empty path".into())),
        };
        let level = node.level;
        let distances = self.model.center_distances(&node.entries)?;

        let mut order: Vec<usize> = (0..node.len()).collect();
        match variant {
            ReinsertVariant::Far => {
                order.sort_by(|&a, &b| distances[b].total_cmp(&distances[a]))
            }
            ReinsertVariant::Close => {
                order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]))
            }
        }
        order.truncate(count);

        let mut slots: Vec<Option<EntryOf<M>>> =
            std::mem::take(&mut node.entries).into_iter().map(Some).collect();
        let removed: Vec<EntryOf<M>> = order.iter().filter_map(|&i| slots[i].take()).collect();
        node.entries = slots.into_iter().flatten().collect();

        debug!(
            "Reinserting {} of {} entries of page {} at level {}",
            removed.len(),
            removed.len() + node.len(),
            node_id,
            level
        );
        TreeStatistics::increment(&self.stats.reinsertions);

        self.adjust_regions(&path, &node)?;
        self.pages.write_node(node_id, node)?;
        for entry in removed {
            self.insert_entry(entry, level, state)?;
        }
        Ok(())
    }

    /// Region of the directory entry pointing to the last node of `path`;
    /// `None` for the root.
    fn parent_region(&self, path: &IndexTreePath) -> IndexResult<Option<M::Region>> {
        let step = match path.parent() {
            Some(step) => *step,
            None => return Ok(None),
        };
        let parent = self.pages.read_node(step.node_id)?;
        match parent.entries.get(step.entry_index) {
            Some(Entry::Directory(dir)) => Ok(Some(dir.region.clone())),
            _ => Err(IndexError::IntegrityViolation(format!(
                "no directory entry {} in page {}",
                step.entry_index, step.node_id
            ))),
        }
    }

    /// Recomputes the regions on `path` bottom-up, starting with the one
    /// covering `node`. Stops at the first region that does not change.
    fn adjust_regions(&self, path: &IndexTreePath, node: &NodeOf<M>) -> IndexResult<()> {
        let steps = path.steps();
        let mut updated: Option<NodeOf<M>> = None;

        for i in (1..steps.len()).rev() {
            let step = steps[i - 1];
            let child = updated.as_ref().unwrap_or(node);
            let mut parent = self.pages.read_node(step.node_id)?;

            let dir = match parent.entries.get_mut(step.entry_index) {
                Some(Entry::Directory(dir)) => dir,
                _ => {
                    return Err(IndexError::IntegrityViolation(format!(
                        "no directory entry {} in page {}",
                        step.entry_index, step.node_id
                    )))
                }
            };
            let region = self.model.cover(&child.entries, Some(&dir.region))?;
            if region == dir.region {
                return Ok(());
            }
            dir.region = region;
            self.pages.write_node(step.node_id, parent.clone())?;
            updated = Some(parent);
        }
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Removes the object `id`. Underfull nodes on the path are dissolved
    /// and their entries reinserted.
    pub fn delete(&mut self, id: ObjectId) -> IndexResult<()> {
        let object = self.model.object(id)?;
        let mut path = IndexTreePath::new();
        let mut node = self
            .find_leaf(self.root_page, id, &object, &mut path)?
            .ok_or(IndexError::ObjectNotFound(id))?;

        let index = match path.last() {
            Some(step) => step.entry_index,
            None => return Err(IndexError::ObjectNotFound(id)),
        };
        node.entries.remove(index);
        self.condense(path, node)?;

        self.size -= 1;
        self.store_meta()
    }

    /// Path from the root to the leaf entry of `id`, if stored.
    pub fn find_path_to_object(&self, id: ObjectId) -> IndexResult<Option<IndexTreePath>> {
        let object = self.model.object(id)?;
        let mut path = IndexTreePath::new();
        Ok(self
            .find_leaf(self.root_page, id, &object, &mut path)?
            .map(|_| path))
    }

    pub fn contains_object(&self, id: ObjectId) -> IndexResult<bool> {
        match self.find_path_to_object(id) {
            Ok(path) => Ok(path.is_some()),
            Err(IndexError::ObjectNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Depth first search for the leaf holding `id`, pruned by the regions
    /// that cannot hold `object`. On success `path` ends with the leaf and
    /// the index of the entry.
    fn find_leaf(
        &self,
        page_id: PageId,
        id: ObjectId,
        object: &M::Object,
        path: &mut IndexTreePath,
    ) -> IndexResult<Option<NodeOf<M>>> {
        let node = self.pages.read_node(page_id)?;
        if node.is_leaf() {
            let found = node
                .entries
                .iter()
                .position(|e| matches!(e, Entry::Leaf(leaf) if leaf.id == id));
            return Ok(found.map(|index| {
                path.push(page_id, index);
                node
            }));
        }

        for (index, entry) in node.entries.iter().enumerate() {
            if let Entry::Directory(dir) = entry {
                if !self.model.covers_object(&dir.region, object)? {
                    continue;
                }
                path.push(page_id, index);
                if let Some(leaf) = self.find_leaf(dir.child, id, object, path)? {
                    return Ok(Some(leaf));
                }
                path.pop();
            }
        }
        Ok(None)
    }

    /// Walks up from the leaf that lost an entry, dissolving underfull
    /// nodes, then reinserts their entries and shortens the tree if the
    /// root is left with a single child.
    fn condense(&mut self, mut path: IndexTreePath, mut node: NodeOf<M>) -> IndexResult<()> {
        let mut orphans: Vec<(u32, Vec<EntryOf<M>>)> = Vec::new();

        while !path.is_root() {
            let step = match path.pop() {
                Some(step) => step,
                None => break,
            };
            let parent_step = match path.last() {
                Some(step) => *step,
                None => return Err(IndexError::IntegrityViolation("empty path".into())),
            };
            let mut parent = self.pages.read_node(parent_step.node_id)?;

            if node.len() < self.capacities.min_entries(node.level) {
                debug!(
                    "Dissolving underfull page {} at level {} ({} entries)",
                    step.node_id,
                    node.level,
                    node.len()
                );
                parent.entries.remove(parent_step.entry_index);
                self.pages.free_id(step.node_id)?;
                orphans.push((node.level, node.entries));
            } else {
                match parent.entries.get_mut(parent_step.entry_index) {
                    Some(Entry::Directory(dir)) => {
                        dir.region = self.model.cover(&node.entries, Some(&dir.region))?;
                    }
                    _ => {
                        return Err(IndexError::IntegrityViolation(format!(
                            "no directory entry {} in page {}",
                            parent_step.entry_index, parent_step.node_id
                        )))
                    }
                }
                self.pages.write_node(step.node_id, node)?;
            }
            node = parent;
        }
        self.pages.write_node(self.root_page, node)?;

        // Higher levels first, so lower level entries find their subtrees
        orphans.sort_by(|a, b| b.0.cmp(&a.0));
        for (level, entries) in orphans {
            for entry in entries {
                let mut state = ReinsertionState::new();
                self.insert_entry(entry, level, &mut state)?;
            }
        }

        self.collapse_root()
    }

    /// Replaces a directory root holding a single entry by its child.
    fn collapse_root(&mut self) -> IndexResult<()> {
        loop {
            let root = self.pages.read_node(self.root_page)?;
            if root.is_leaf() || root.len() != 1 {
                return Ok(());
            }
            let child = match root.entries.first() {
                Some(Entry::Directory(dir)) => dir.child,
                _ => {
                    return Err(IndexError::IntegrityViolation(format!(
                        "directory root {} holds a leaf entry",
                        self.root_page
                    )))
                }
            };
            self.pages.free_id(self.root_page)?;
            debug!(
                "Root page {} replaced by its only child {}",
                self.root_page, child
            );
            self.root_page = child;
            self.root_level -= 1;
        }
    }

    // ========================================================================
    // Bulk loading
    // ========================================================================

    /// Builds the tree bottom-up from all `ids`, bypassing the insertion
    /// and overflow strategies. Requires an empty tree.
    pub fn bulk_load(&mut self, ids: &[ObjectId]) -> IndexResult<()> {
        if self.size != 0 {
            return Err(IndexError::InvalidArgument(format!(
                "bulk loading requires an empty tree, this one holds {} objects",
                self.size
            )));
        }
        let mut entries = ids
            .iter()
            .map(|id| self.model.leaf_entry(*id).map(Entry::Leaf))
            .collect::<IndexResult<Vec<_>>>()?;
        if entries.is_empty() {
            return Ok(());
        }

        let mut level = 0;
        loop {
            let capacity = self.capacities.max_entries(level);
            if entries.len() <= capacity {
                for entry in entries.iter_mut() {
                    self.model.attach(entry, None)?;
                }
                self.pages
                    .write_node(self.root_page, Node::new(level, entries))?;
                self.root_level = level;
                break;
            }

            let sizes = group_sizes(entries.len(), capacity);
            debug!(
                "Bulk loading level {}: {} entries into {} nodes",
                level,
                entries.len(),
                sizes.len()
            );
            let groups = self.model.bulk_partition(entries, &sizes)?;
            let mut parents = Vec::with_capacity(groups.len());
            for mut group in groups {
                let region = self.model.cover(&group, None)?;
                for entry in group.iter_mut() {
                    self.model.attach(entry, Some(&region))?;
                }
                let page_id = self.pages.allocate_id()?;
                self.pages.write_node(page_id, Node::new(level, group))?;
                parents.push(Entry::directory(page_id, region));
            }
            entries = parents;
            level += 1;
        }

        self.size = ids.len() as u64;
        info!(
            "Bulk loaded {} objects, height {}",
            self.size,
            self.height()
        );
        self.store_meta()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Page ids of all leaves, left to right
    pub fn leaves(&self) -> IndexResult<Vec<PageId>> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root_page];
        while let Some(page_id) = stack.pop() {
            let node = self.pages.read_node(page_id)?;
            if node.is_leaf() {
                leaves.push(page_id);
            } else {
                stack.extend(node.children().collect::<Vec<_>>().into_iter().rev());
            }
        }
        Ok(leaves)
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            size: self.size,
            height: self.height(),
            leaf_capacity: self.capacities.leaf,
            directory_capacity: self.capacities.directory,
            distance_calculations: self.model.distance_calculations(),
            knn_queries: TreeStatistics::load(&self.stats.knn_queries),
            range_queries: TreeStatistics::load(&self.stats.range_queries),
            priority_queries: TreeStatistics::load(&self.stats.priority_queries),
            splits: TreeStatistics::load(&self.stats.splits),
            reinsertions: TreeStatistics::load(&self.stats.reinsertions),
            pages: self.pages.stats(),
        }
    }

    pub fn log_statistics(&self) {
        let stats = self.stats();
        info!(
            "Tree: {} objects, height {}, capacities {}/{}",
            stats.size, stats.height, stats.leaf_capacity, stats.directory_capacity
        );
        info!(
            "Tree operations: {} splits, {} reinsertions, {} distance calculations",
            stats.splits, stats.reinsertions, stats.distance_calculations
        );
        info!(
            "Tree queries: {} knn, {} range, {} priority",
            stats.knn_queries, stats.range_queries, stats.priority_queries
        );
        info!(
            "Pages: {} reads, {} writes, {} cache hits, {} cache misses, {} allocated, {} free",
            stats.pages.reads,
            stats.pages.writes,
            stats.pages.cache_hits,
            stats.pages.cache_misses,
            stats.pages.allocated_pages,
            stats.pages.free_pages
        );
    }
}

/// Splits `count` entries into `ceil(count / capacity)` groups whose sizes
/// differ by at most one.
fn group_sizes(count: usize, capacity: usize) -> Vec<usize> {
    let groups = count.div_ceil(capacity.max(1)).max(1);
    let base = count / groups;
    let extra = count % groups;
    (0..groups)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}
