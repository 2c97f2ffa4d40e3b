//! Exact range search.

use log::trace;

use super::result::{sort_results, DistanceResult};
use super::{expand, Pending, SearchHeap, Traversal};
use crate::page::PageFile;
use crate::tree::entry::LeafEntry;
use crate::tree::region::{NodeOf, RegionModel};
use crate::tree::tree_types::{IndexError, IndexResult, ObjectId, PageId, TreeStatistics};
use crate::tree::IndexTree;

struct RangeSearch<L> {
    radius: f64,
    heap: SearchHeap<L>,
    results: Vec<DistanceResult>,
}

impl<M: RegionModel> Traversal<M> for RangeSearch<M::LeafData> {
    fn limit(&self) -> f64 {
        self.radius
    }

    fn push_node(&mut self, bound: f64, page: PageId, routing_distance: Option<f64>) {
        self.heap.push(
            bound,
            Pending::Node {
                page,
                routing_distance,
            },
        );
    }

    fn visit_leaf(
        &mut self,
        model: &M,
        query: &M::Object,
        leaf: &LeafEntry<M::LeafData>,
        _parent_bound: Option<f64>,
    ) -> IndexResult<()> {
        let distance = model.leaf_distance(query, leaf)?;
        if distance <= self.radius {
            self.results.push(DistanceResult::new(leaf.id, distance));
        }
        Ok(())
    }
}

impl<M, P> IndexTree<M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    /// All objects within `radius` of `query`, ascending by distance.
    ///
    /// An infinite radius returns every object. Fails for a negative or
    /// NaN radius.
    pub fn range(&self, query: &M::Object, radius: f64) -> IndexResult<Vec<DistanceResult>> {
        if radius.is_nan() || radius < 0.0 {
            return Err(IndexError::InvalidArgument(format!(
                "range query radius must be non-negative, got {}",
                radius
            )));
        }
        TreeStatistics::increment(&self.statistics().range_queries);

        let mut search = RangeSearch {
            radius,
            heap: SearchHeap::new(),
            results: Vec::new(),
        };
        search.heap.push(
            0.0,
            Pending::Node {
                page: self.root_page(),
                routing_distance: None,
            },
        );

        while let Some(candidate) = search.heap.pop() {
            if candidate.bound > radius {
                break;
            }
            if let Pending::Node {
                page,
                routing_distance,
            } = candidate.pending
            {
                let node = self.read_node(page)?;
                expand(self.model(), query, &node, routing_distance, &mut search)?;
            }
        }

        trace!("range query with radius {} found {} objects", radius, search.results.len());
        sort_results(&mut search.results);
        Ok(search.results)
    }

    /// Range query around the stored object `id`
    pub fn range_by_id(&self, id: ObjectId, radius: f64) -> IndexResult<Vec<DistanceResult>> {
        let query = self.model().object(id)?;
        self.range(&query, radius)
    }
}
