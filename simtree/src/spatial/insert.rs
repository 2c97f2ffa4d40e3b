//! Subtree choice for spatial trees.

use serde::{Deserialize, Serialize};

use crate::bounding_box::HyperBoundingBox;
use crate::tree::tree_constants::DEFAULT_OVERLAP_CANDIDATES;
use crate::tree::tree_types::{IndexError, IndexResult};

/// Chooses the child a new entry descends into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum InsertionStrategy {
    /// Least volume enlargement, ties by smallest volume then lowest index
    LeastEnlargement,
    /// Least increase of the overlap with the siblings
    LeastOverlap,
    /// Least overlap among the `candidates` children with least
    /// enlargement
    ApproximativeLeastOverlap { candidates: usize },
    /// `directory` above the level of the leaves, `leaf` right above them
    Combined {
        directory: Box<InsertionStrategy>,
        leaf: Box<InsertionStrategy>,
    },
}

impl Default for InsertionStrategy {
    /// The R*-tree choice
    fn default() -> Self {
        InsertionStrategy::Combined {
            directory: Box::new(InsertionStrategy::LeastEnlargement),
            leaf: Box::new(InsertionStrategy::ApproximativeLeastOverlap {
                candidates: DEFAULT_OVERLAP_CANDIDATES,
            }),
        }
    }
}

impl InsertionStrategy {
    pub fn validate(&self) -> IndexResult<()> {
        match self {
            InsertionStrategy::ApproximativeLeastOverlap { candidates: 0 } => {
                Err(IndexError::Configuration(
                    "approximative least overlap needs at least one candidate".into(),
                ))
            }
            InsertionStrategy::Combined { directory, leaf } => {
                directory.validate()?;
                leaf.validate()
            }
            _ => Ok(()),
        }
    }

    /// Index of the child of a directory node at `depth` (root = 1) in a
    /// tree of `height` levels that should receive `candidate`.
    pub fn choose(
        &self,
        children: &[&HyperBoundingBox],
        candidate: &HyperBoundingBox,
        height: usize,
        depth: usize,
    ) -> IndexResult<usize> {
        if children.is_empty() {
            return Err(IndexError::InvalidArgument(
                "cannot choose a subtree of an empty node".into(),
            ));
        }
        match self {
            InsertionStrategy::LeastEnlargement => Ok(least_enlargement(children, candidate)),
            InsertionStrategy::LeastOverlap => {
                let all: Vec<usize> = (0..children.len()).collect();
                Ok(least_overlap(children, candidate, &all))
            }
            InsertionStrategy::ApproximativeLeastOverlap { candidates } => {
                let shortlist = least_enlargement_candidates(children, candidate, *candidates);
                Ok(least_overlap(children, candidate, &shortlist))
            }
            InsertionStrategy::Combined { directory, leaf } => {
                if depth + 1 >= height {
                    leaf.choose(children, candidate, height, depth)
                } else {
                    directory.choose(children, candidate, height, depth)
                }
            }
        }
    }
}

fn least_enlargement(children: &[&HyperBoundingBox], candidate: &HyperBoundingBox) -> usize {
    let mut best = 0;
    let mut best_cost = (f64::INFINITY, f64::INFINITY);
    for (i, child) in children.iter().enumerate() {
        let volume = child.volume();
        let enlarged = child.union(candidate).volume();
        let cost = (enlarged - volume, enlarged);
        if cost.0 < best_cost.0 || (cost.0 == best_cost.0 && cost.1 < best_cost.1) {
            best = i;
            best_cost = cost;
        }
    }
    best
}

/// The `count` children with least enlargement, in ascending order of it
fn least_enlargement_candidates(
    children: &[&HyperBoundingBox],
    candidate: &HyperBoundingBox,
    count: usize,
) -> Vec<usize> {
    let mut ranked: Vec<(f64, f64, usize)> = children
        .iter()
        .enumerate()
        .map(|(i, child)| {
            let volume = child.volume();
            (child.union(candidate).volume() - volume, volume, i)
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.total_cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    ranked.into_iter().take(count).map(|(_, _, i)| i).collect()
}

/// Among `shortlist`, the child whose enlargement by `candidate` adds the
/// least overlap with all siblings. Ties by enlargement, then volume.
fn least_overlap(
    children: &[&HyperBoundingBox],
    candidate: &HyperBoundingBox,
    shortlist: &[usize],
) -> usize {
    let mut best = shortlist.first().copied().unwrap_or(0);
    let mut best_cost = (f64::INFINITY, f64::INFINITY, f64::INFINITY);
    for &i in shortlist {
        let child = children[i];
        let enlarged = child.union(candidate);
        let overlap_increase: f64 = children
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| enlarged.overlap(other) - child.overlap(other))
            .sum();
        let volume = child.volume();
        let cost = (overlap_increase, enlarged.volume() - volume, volume);
        if cost < best_cost {
            best = i;
            best_cost = cost;
        }
    }
    best
}
