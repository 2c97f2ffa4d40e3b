//! Exact k-nearest-neighbor search.

use log::trace;

use super::result::{KnnCollector, KnnList};
use super::{expand, Pending, SearchHeap, Traversal};
use crate::page::PageFile;
use crate::tree::entry::LeafEntry;
use crate::tree::region::{NodeOf, RegionModel};
use crate::tree::tree_types::{IndexError, IndexResult, ObjectId, PageId, TreeStatistics};
use crate::tree::IndexTree;

struct KnnSearch<L> {
    heap: SearchHeap<L>,
    collector: KnnCollector,
}

impl<M: RegionModel> Traversal<M> for KnnSearch<M::LeafData> {
    fn limit(&self) -> f64 {
        self.collector.kth_distance()
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
        self.collector.insert(leaf.id, distance);
        Ok(())
    }
}

impl<M, P> IndexTree<M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    /// The `k` objects nearest to `query`, plus any objects tied with the
    /// k-th distance. Fails for `k == 0` and for `k` larger than the number
    /// of stored objects.
    pub fn knn(&self, query: &M::Object, k: usize) -> IndexResult<KnnList> {
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "k nearest neighbor query with k = 0".into(),
            ));
        }
        if k as u64 > self.size() {
            return Err(IndexError::InvalidArgument(format!(
                "{}-nn query on a tree of {} objects",
                k,
                self.size()
            )));
        }
        TreeStatistics::increment(&self.statistics().knn_queries);

        let mut search = KnnSearch {
            heap: SearchHeap::new(),
            collector: KnnCollector::new(k),
        };
        search.heap.push(
            0.0,
            Pending::Node {
                page: self.root_page(),
                routing_distance: None,
            },
        );

        while let Some(candidate) = search.heap.pop() {
            if candidate.bound > search.collector.kth_distance() {
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

        let knn = search.collector.finish();
        trace!("{}-nn query found {} objects", k, knn.size());
        Ok(knn)
    }

    /// k-NN query around the stored object `id`; the object itself is part
    /// of the result.
    pub fn knn_by_id(&self, id: ObjectId, k: usize) -> IndexResult<KnnList> {
        let query = self.model().object(id)?;
        self.knn(&query, k)
    }
}
