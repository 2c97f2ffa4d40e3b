//! Incremental best-first search.

use super::result::DistanceResult;
use super::{expand, Pending, SearchHeap, Traversal};
use crate::page::PageFile;
use crate::tree::entry::LeafEntry;
use crate::tree::region::{NodeOf, RegionModel};
use crate::tree::tree_types::{IndexError, IndexResult, ObjectId, PageId, TreeStatistics};
use crate::tree::IndexTree;

/// Lazily yields the objects of a tree by ascending distance to a query.
///
/// The searcher is positioned on the nearest object when created. Use
/// [`valid`](Self::valid), [`current`](Self::current) and
/// [`advance`](Self::advance), or iterate it. Dropping it cancels the
/// search.
///
/// In cheap mode, metric trees report the lower bound derived from the
/// stored parent distance instead of computing the exact distance of an
/// object; results are then ordered by that bound.
pub struct PrioritySearcher<'a, M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    tree: &'a IndexTree<M, P>,
    query: M::Object,
    frontier: Frontier<M::LeafData>,
    current: Option<DistanceResult>,
}

struct Frontier<L> {
    heap: SearchHeap<L>,
    cutoff: f64,
    cheap: bool,
}

impl<M: RegionModel> Traversal<M> for Frontier<M::LeafData> {
    fn limit(&self) -> f64 {
        self.cutoff
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
        parent_bound: Option<f64>,
    ) -> IndexResult<()> {
        match parent_bound {
            Some(bound) => self.heap.push(bound, Pending::Unrefined(leaf.clone())),
            None => {
                let distance = model.leaf_distance(query, leaf)?;
                if distance <= self.cutoff {
                    self.heap.push(distance, Pending::Object(leaf.id));
                }
            }
        }
        Ok(())
    }
}

impl<'a, M, P> PrioritySearcher<'a, M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    fn start(tree: &'a IndexTree<M, P>, query: M::Object, cheap: bool) -> IndexResult<Self> {
        TreeStatistics::increment(&tree.statistics().priority_queries);
        let mut frontier = Frontier {
            heap: SearchHeap::new(),
            cutoff: f64::INFINITY,
            cheap,
        };
        frontier.heap.push(
            0.0,
            Pending::Node {
                page: tree.root_page(),
                routing_distance: None,
            },
        );
        let mut searcher = Self {
            tree,
            query,
            frontier,
            current: None,
        };
        searcher.current = searcher.next_result()?;
        Ok(searcher)
    }

    /// True while the searcher is positioned on a result
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The result the searcher is positioned on.
    pub fn current(&self) -> IndexResult<DistanceResult> {
        self.current.ok_or(IndexError::SearchExhausted)
    }

    /// Moves to the next result. Fails if the search is already exhausted.
    pub fn advance(&mut self) -> IndexResult<()> {
        if self.current.is_none() {
            return Err(IndexError::SearchExhausted);
        }
        self.current = self.next_result()?;
        Ok(())
    }

    /// Stops the search at `max_distance`: farther objects are not
    /// returned. The cutoff can only shrink.
    pub fn decrease_cutoff(&mut self, max_distance: f64) {
        if max_distance < self.frontier.cutoff {
            self.frontier.cutoff = max_distance;
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.frontier.cutoff
    }

    pub fn is_cheap(&self) -> bool {
        self.frontier.cheap
    }

    /// Lower bound of the distance of every result not yet returned
    pub fn lower_bound(&self) -> Option<f64> {
        self.frontier.heap.peek_bound()
    }

    fn next_result(&mut self) -> IndexResult<Option<DistanceResult>> {
        let tree = self.tree;
        let model = tree.model();
        while let Some(candidate) = self.frontier.heap.pop() {
            if candidate.bound > self.frontier.cutoff {
                return Ok(None);
            }
            match candidate.pending {
                Pending::Object(id) => {
                    return Ok(Some(DistanceResult::new(id, candidate.bound)));
                }
                Pending::Unrefined(leaf) => {
                    if self.frontier.cheap {
                        return Ok(Some(DistanceResult::new(leaf.id, candidate.bound)));
                    }
                    let distance = model.leaf_distance(&self.query, &leaf)?;
                    if distance <= self.frontier.cutoff {
                        self.frontier.heap.push(distance, Pending::Object(leaf.id));
                    }
                }
                Pending::Node {
                    page,
                    routing_distance,
                } => {
                    let node = tree.read_node(page)?;
                    expand(
                        model,
                        &self.query,
                        &node,
                        routing_distance,
                        &mut self.frontier,
                    )?;
                }
            }
        }
        Ok(None)
    }
}

impl<M, P> Iterator for PrioritySearcher<'_, M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    type Item = IndexResult<DistanceResult>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        match self.next_result() {
            Ok(next) => {
                self.current = next;
                Some(Ok(current))
            }
            Err(e) => {
                self.current = None;
                Some(Err(e))
            }
        }
    }
}

impl<M, P> IndexTree<M, P>
where
    M: RegionModel,
    P: PageFile<NodeOf<M>>,
{
    /// Starts a best-first search yielding exact distances.
    pub fn priority_search(&self, query: M::Object) -> IndexResult<PrioritySearcher<'_, M, P>> {
        PrioritySearcher::start(self, query, false)
    }

    /// Starts a best-first search yielding conservative lower bounds where
    /// they are available without computing a distance.
    pub fn priority_search_cheap(
        &self,
        query: M::Object,
    ) -> IndexResult<PrioritySearcher<'_, M, P>> {
        PrioritySearcher::start(self, query, true)
    }

    /// Best-first search around the stored object `id`
    pub fn priority_search_by_id(
        &self,
        id: ObjectId,
    ) -> IndexResult<PrioritySearcher<'_, M, P>> {
        let query = self.model().object(id)?;
        self.priority_search(query)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::relation::MemoryRelation;
    use crate::tree::tree_types::IndexError;
    use crate::RStarTreeBuilder;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_searcher_walks_results_in_order() {
        init();
        let relation = Arc::new(MemoryRelation::new());
        let ids = relation.add_all((0..12).map(|i| vec![i as f64, 0.0]));
        let mut tree = RStarTreeBuilder::new(2)
            .capacity(4)
            .build_in_memory(relation)
            .unwrap();
        tree.insert_all(&ids).unwrap();

        let mut searcher = tree.priority_search(vec![0.0, 0.0]).unwrap();
        let mut seen = Vec::new();
        while searcher.valid() {
            seen.push(searcher.current().unwrap());
            searcher.advance().unwrap();
        }
        assert_eq!(seen.len(), 12);
        assert!(seen.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(seen[0].id, ids[0]);
        assert!(matches!(searcher.current(), Err(IndexError::SearchExhausted)));
        assert!(matches!(searcher.advance(), Err(IndexError::SearchExhausted)));
    }

    #[test]
    fn test_cutoff_ends_search() {
        init();
        let relation = Arc::new(MemoryRelation::new());
        let ids = relation.add_all((0..5).map(|i| vec![i as f64, 0.0]));
        let mut tree = RStarTreeBuilder::new(2).build_in_memory(relation).unwrap();
        tree.insert_all(&ids).unwrap();

        let mut searcher = tree.priority_search(vec![0.0, 0.0]).unwrap();
        searcher.decrease_cutoff(2.5);
        searcher.decrease_cutoff(10.0);
        assert_eq!(searcher.cutoff(), 2.5);
        assert!(!searcher.is_cheap());

        let distances: Vec<f64> = searcher.map(|r| r.unwrap().distance).collect();
        assert_eq!(distances, vec![0.0, 1.0, 2.0]);
        assert_eq!(tree.stats().priority_queries, 1);
    }

    #[test]
    fn test_search_on_empty_tree_is_exhausted() {
        init();
        let relation: Arc<MemoryRelation<Vec<f64>>> = Arc::new(MemoryRelation::new());
        let tree = RStarTreeBuilder::new(2).build_in_memory(relation).unwrap();
        let searcher = tree.priority_search(vec![0.0, 0.0]).unwrap();
        assert!(!searcher.valid());
        assert_eq!(searcher.lower_bound(), None);
    }
}
