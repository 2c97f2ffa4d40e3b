//! Query engines: range, k-nearest-neighbor and priority search.
//!
//! All three share one branch-and-bound traversal: a min-heap of pending
//! subtrees keyed by the lower bound of the distance from the query to
//! anything inside them. A subtree is expanded only while its bound does
//! not exceed the current pruning distance of the engine.

mod knn;
mod priority;
mod range;
mod result;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub use priority::PrioritySearcher;
pub use result::{DistanceResult, KnnList};

use crate::tree::entry::{Entry, LeafEntry};
use crate::tree::region::{NodeOf, RegionModel};
use crate::tree::tree_types::{IndexResult, ObjectId, PageId};

/// Something waiting in the search heap
#[derive(Debug, Clone)]
pub(crate) enum Pending<L> {
    /// A node to expand, with the distance from the query to the routing
    /// object of the region pointing to it, if the model has one
    Node {
        page: PageId,
        routing_distance: Option<f64>,
    },
    /// A leaf entry whose bound is not its exact distance yet
    Unrefined(LeafEntry<L>),
    /// An object at its exact distance
    Object(ObjectId),
}

impl<L> Pending<L> {
    /// Objects before unrefined entries before nodes at equal bounds
    fn rank(&self) -> u8 {
        match self {
            Pending::Object(_) => 0,
            Pending::Unrefined(_) => 1,
            Pending::Node { .. } => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Candidate<L> {
    pub(crate) bound: f64,
    pub(crate) pending: Pending<L>,
}

impl<L> PartialEq for Candidate<L> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<L> Eq for Candidate<L> {}

impl<L> PartialOrd for Candidate<L> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<L> Ord for Candidate<L> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap
        other
            .bound
            .total_cmp(&self.bound)
            .then_with(|| other.pending.rank().cmp(&self.pending.rank()))
    }
}

/// Min-heap of pending subtrees and objects
#[derive(Debug)]
pub(crate) struct SearchHeap<L> {
    heap: BinaryHeap<Candidate<L>>,
}

impl<L> SearchHeap<L> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn push(&mut self, bound: f64, pending: Pending<L>) {
        self.heap.push(Candidate { bound, pending });
    }

    pub(crate) fn pop(&mut self) -> Option<Candidate<L>> {
        self.heap.pop()
    }

    pub(crate) fn peek_bound(&self) -> Option<f64> {
        self.heap.peek().map(|c| c.bound)
    }
}

/// Engine specific part of a traversal
pub(crate) trait Traversal<M: RegionModel> {
    /// Subtrees and objects with a larger bound are pruned
    fn limit(&self) -> f64;

    fn push_node(&mut self, bound: f64, page: PageId, routing_distance: Option<f64>);

    /// Handles a leaf entry that survived pruning. `parent_bound` is the
    /// lower bound known without computing a distance, if any.
    fn visit_leaf(
        &mut self,
        model: &M,
        query: &M::Object,
        leaf: &LeafEntry<M::LeafData>,
        parent_bound: Option<f64>,
    ) -> IndexResult<()>;
}

/// Pushes the surviving entries of `node` into `traversal`.
pub(crate) fn expand<M, T>(
    model: &M,
    query: &M::Object,
    node: &NodeOf<M>,
    routing_distance: Option<f64>,
    traversal: &mut T,
) -> IndexResult<()>
where
    M: RegionModel,
    T: Traversal<M>,
{
    for entry in &node.entries {
        let parent_bound = routing_distance.and_then(|rd| model.parent_bound(entry, rd));
        if parent_bound.is_some_and(|bound| bound > traversal.limit()) {
            continue;
        }
        match entry {
            Entry::Leaf(leaf) => traversal.visit_leaf(model, query, leaf, parent_bound)?,
            Entry::Directory(dir) => {
                let (bound, routing) = model.directory_bound(query, &dir.region)?;
                if bound <= traversal.limit() {
                    traversal.push_node(bound, dir.child, routing);
                }
            }
        }
    }
    Ok(())
}
