//! Query result types.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::tree::tree_types::{IndexError, IndexResult, ObjectId};

/// An object id with its distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceResult {
    pub id: ObjectId,
    pub distance: f64,
}

impl DistanceResult {
    pub fn new(id: ObjectId, distance: f64) -> Self {
        Self { id, distance }
    }

    /// Ascending by distance, then by id
    pub fn cmp_by_distance(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

impl Eq for DistanceResult {}

impl PartialOrd for DistanceResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_by_distance(other)
    }
}

/// Sorts results ascending by distance, ties by id
pub(crate) fn sort_results(results: &mut [DistanceResult]) {
    results.sort_unstable_by(DistanceResult::cmp_by_distance);
}

/// Result of a k-nearest-neighbor query, sorted by distance.
///
/// Holds at least `k` results: objects tied with the k-th distance
/// are kept, so `size()` may exceed `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnList {
    k: usize,
    results: Vec<DistanceResult>,
}

impl KnnList {
    pub(crate) fn new(k: usize, mut results: Vec<DistanceResult>) -> Self {
        sort_results(&mut results);
        Self { k, results }
    }

    /// The requested number of neighbors
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of results, ties included
    pub fn size(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Distance of the k-th neighbor, infinite if fewer were found
    pub fn kth_distance(&self) -> f64 {
        self.k
            .checked_sub(1)
            .and_then(|i| self.results.get(i))
            .map_or(f64::INFINITY, |r| r.distance)
    }

    /// The first `k` results plus the results tied with the k-th.
    ///
    /// Fails if `k` is 0 or exceeds the number of results.
    pub fn sub_list(&self, k: usize) -> IndexResult<KnnList> {
        if k == 0 || k > self.results.len() {
            return Err(IndexError::InvalidArgument(format!(
                "sub list of {} requested from {} results",
                k,
                self.results.len()
            )));
        }
        let kth = self.results[k - 1].distance;
        let end = k + self.results[k..]
            .iter()
            .take_while(|r| r.distance <= kth)
            .count();
        Ok(Self {
            k,
            results: self.results[..end].to_vec(),
        })
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.results.iter().any(|r| r.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&DistanceResult> {
        self.results.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DistanceResult> {
        self.results.iter()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.results.iter().map(|r| r.id).collect()
    }

    pub fn into_vec(self) -> Vec<DistanceResult> {
        self.results
    }
}

impl IntoIterator for KnnList {
    type Item = DistanceResult;
    type IntoIter = std::vec::IntoIter<DistanceResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a KnnList {
    type Item = &'a DistanceResult;
    type IntoIter = std::slice::Iter<'a, DistanceResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Collects the k best results of a search, keeping ties at the k-th
/// distance.
#[derive(Debug)]
pub(crate) struct KnnCollector {
    k: usize,
    /// The k best, largest distance on top
    best: BinaryHeap<DistanceResult>,
    /// Results tied with the current k-th distance
    ties: Vec<DistanceResult>,
}

impl KnnCollector {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            best: BinaryHeap::with_capacity(k + 1),
            ties: Vec::new(),
        }
    }

    /// Current pruning distance
    pub(crate) fn kth_distance(&self) -> f64 {
        if self.best.len() < self.k {
            f64::INFINITY
        } else {
            self.best.peek().map_or(f64::INFINITY, |r| r.distance)
        }
    }

    pub(crate) fn insert(&mut self, id: ObjectId, distance: f64) {
        let candidate = DistanceResult::new(id, distance);
        if self.best.len() < self.k {
            self.best.push(candidate);
            return;
        }
        let kth = self.kth_distance();
        if distance > kth {
            return;
        }
        if distance == kth {
            self.ties.push(candidate);
            return;
        }

        self.best.push(candidate);
        if let Some(evicted) = self.best.pop() {
            if self.kth_distance() == evicted.distance {
                self.ties.push(evicted);
            } else {
                self.ties.clear();
            }
        }
    }

    pub(crate) fn finish(self) -> KnnList {
        let mut results = self.best.into_vec();
        results.extend(self.ties);
        KnnList::new(self.k, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(distances: &[f64]) -> KnnList {
        let results = distances
            .iter()
            .enumerate()
            .map(|(i, d)| DistanceResult::new(i as u64 + 1, *d))
            .collect();
        KnnList::new(distances.len(), results)
    }

    #[test]
    fn test_sub_list_keeps_ties() {
        let knn = list(&[0.5, 1.0, 2.0, 2.0, 3.0]);
        let sub = knn.sub_list(3).unwrap();
        assert_eq!(sub.size(), 4);
        assert_eq!(sub.k(), 3);
        assert_eq!(sub.kth_distance(), 2.0);
        assert!(sub.contains(4));
        assert!(!sub.contains(5));

        assert_eq!(knn.sub_list(1).unwrap().ids(), vec![1]);
    }

    #[test]
    fn test_sub_list_out_of_range() {
        let knn = list(&[1.0, 2.0]);
        assert!(matches!(knn.sub_list(3), Err(IndexError::InvalidArgument(_))));
        assert!(knn.sub_list(0).is_err());
    }

    #[test]
    fn test_results_sorted_by_distance_then_id() {
        let knn = KnnList::new(
            3,
            vec![
                DistanceResult::new(9, 2.0),
                DistanceResult::new(3, 1.0),
                DistanceResult::new(2, 2.0),
            ],
        );
        let ids: Vec<_> = knn.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 9]);
        assert_eq!(knn.kth_distance(), 2.0);
        assert_eq!(KnnList::new(5, vec![]).kth_distance(), f64::INFINITY);
    }

    #[test]
    fn test_collector_keeps_ties() {
        let mut collector = KnnCollector::new(2);
        collector.insert(1, 5.0);
        collector.insert(2, 3.0);
        assert_eq!(collector.kth_distance(), 5.0);
        collector.insert(3, 3.0);
        // 3.0 and 3.0 are the two best, 5.0 dropped
        assert_eq!(collector.kth_distance(), 3.0);
        collector.insert(4, 3.0);
        collector.insert(5, 4.0);

        let knn = collector.finish();
        assert_eq!(knn.ids(), vec![2, 3, 4]);
    }

    #[test]
    fn test_collector_drops_stale_ties() {
        let mut collector = KnnCollector::new(2);
        for (id, d) in [(1, 4.0), (2, 4.0), (3, 4.0), (4, 1.0), (5, 2.0)] {
            collector.insert(id, d);
        }
        let knn = collector.finish();
        assert_eq!(knn.ids(), vec![4, 5]);
        assert_eq!(knn.kth_distance(), 2.0);
    }
}
