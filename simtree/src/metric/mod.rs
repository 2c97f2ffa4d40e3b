//! The M-tree family: metric trees over arbitrary objects, bounded by a
//! routing object and a covering radius.
//!
//! Every entry stores its distance to the routing object of the node
//! holding it. Queries use it to skip entries through the triangle
//! inequality before computing any distance.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use simtree::distance::LevenshteinDistance;
//! use simtree::relation::MemoryRelation;
//! use simtree::MTreeBuilder;
//!
//! let relation = Arc::new(MemoryRelation::new());
//! let ids = relation.add_all(["tree", "trees", "street", "bee"].map(String::from));
//!
//! let mut tree = MTreeBuilder::<String>::new(LevenshteinDistance)
//!     .build_in_memory(relation)
//!     .unwrap();
//! tree.insert_all(&ids).unwrap();
//!
//! let similar = tree.range(&"free".to_string(), 1.0).unwrap();
//! assert_eq!(similar.len(), 1);
//! assert_eq!(similar[0].id, ids[0]);
//! ```

mod insert;
mod split;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

pub use split::{Distribution, Promotion};

use self::split::{DistanceMatrix, MetricSplit};
use crate::distance::Distance;
use crate::page::{DiskPageFile, MemoryPageFile};
use crate::relation::Relation;
use crate::tree::entry::{Entry, LeafEntry, Node};
use crate::tree::region::{RegionModel, SplitResult};
use crate::tree::settings::{OverflowTreatment, TreeSettings};
use crate::tree::tree_constants::RADIUS_TOLERANCE;
use crate::tree::tree_types::{DistanceCounter, IndexError, IndexResult, ObjectId};
use crate::tree::IndexTree;

/// Payload of a metric leaf entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricLeafData {
    /// Distance to the routing object of the node holding the entry
    pub parent_distance: f64,
}

/// Region of a metric directory entry: a ball around a routing object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingRegion {
    /// Relation id of the routing object
    pub routing_id: ObjectId,
    /// Every object below lies within this distance of the routing object
    pub covering_radius: f64,
    /// Distance to the routing object of the node holding the entry
    pub parent_distance: f64,
}

impl fmt::Display for RoutingRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ball around {} of radius {}",
            self.routing_id, self.covering_radius
        )
    }
}

/// Node of a metric tree
pub type MetricNode = Node<MetricLeafData, RoutingRegion>;

/// An M-tree over objects `O`, held in memory unless another page file is
/// given
pub type MTree<O, P = MemoryPageFile<MetricNode>> = IndexTree<MetricModel<O>, P>;

type MetricEntry = Entry<MetricLeafData, RoutingRegion>;

/// Relation id of the object an entry stands for
fn entry_id(entry: &MetricEntry) -> ObjectId {
    match entry {
        Entry::Leaf(leaf) => leaf.id,
        Entry::Directory(dir) => dir.region.routing_id,
    }
}

fn entry_radius(entry: &MetricEntry) -> f64 {
    match entry {
        Entry::Leaf(_) => 0.0,
        Entry::Directory(dir) => dir.region.covering_radius,
    }
}

fn parent_distance(entry: &MetricEntry) -> f64 {
    match entry {
        Entry::Leaf(leaf) => leaf.data.parent_distance,
        Entry::Directory(dir) => dir.region.parent_distance,
    }
}

fn set_parent_distance(entry: &mut MetricEntry, distance: f64) {
    match entry {
        Entry::Leaf(leaf) => leaf.data.parent_distance = distance,
        Entry::Directory(dir) => dir.region.parent_distance = distance,
    }
}

/// Whether `distance` stays within `radius`, up to rounding
fn within(distance: f64, radius: f64) -> bool {
    distance <= radius + RADIUS_TOLERANCE * radius.abs().max(1.0)
}

/// Region model of the M-tree family
pub struct MetricModel<O> {
    relation: Arc<dyn Relation<O>>,
    distance: Arc<dyn Distance<O>>,
    promotion: Promotion,
    distribution: Distribution,
    counter: DistanceCounter,
}

impl<O> MetricModel<O> {
    pub fn promotion(&self) -> Promotion {
        self.promotion
    }

    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    fn distance(&self, a: &O, b: &O) -> f64 {
        self.counter.record(1);
        self.distance.distance(a, b)
    }

    fn entry_object(&self, entry: &MetricEntry) -> IndexResult<O> {
        self.relation.get(entry_id(entry))
    }
}

impl<O> RegionModel for MetricModel<O>
where
    O: Clone + Send + Sync + 'static,
{
    type Object = O;
    type LeafData = MetricLeafData;
    type Region = RoutingRegion;

    fn object(&self, id: ObjectId) -> IndexResult<O> {
        self.relation.get(id)
    }

    fn leaf_entry(&self, id: ObjectId) -> IndexResult<LeafEntry<MetricLeafData>> {
        // Fails early for unknown ids
        self.relation.get(id)?;
        Ok(LeafEntry {
            id,
            data: MetricLeafData {
                parent_distance: 0.0,
            },
        })
    }

    fn example_entries(&self) -> (MetricEntry, MetricEntry) {
        (
            Entry::leaf(
                ObjectId::MAX,
                MetricLeafData {
                    parent_distance: 0.0,
                },
            ),
            Entry::directory(
                u64::MAX,
                RoutingRegion {
                    routing_id: ObjectId::MAX,
                    covering_radius: 0.0,
                    parent_distance: 0.0,
                },
            ),
        )
    }

    fn cover(
        &self,
        entries: &[MetricEntry],
        current: Option<&RoutingRegion>,
    ) -> IndexResult<RoutingRegion> {
        if let Some(current) = current {
            // Parent distances are relative to the current routing object
            let covering_radius = entries
                .iter()
                .map(|e| parent_distance(e) + entry_radius(e))
                .fold(0.0, f64::max);
            return Ok(RoutingRegion {
                covering_radius,
                ..*current
            });
        }

        let first = entries
            .first()
            .ok_or_else(|| IndexError::InvalidArgument("cannot bound an empty node".into()))?;
        let routing_id = entry_id(first);
        let routing = self.relation.get(routing_id)?;
        let mut covering_radius = entry_radius(first);
        for entry in &entries[1..] {
            let d = self.distance(&routing, &self.entry_object(entry)?);
            covering_radius = covering_radius.max(d + entry_radius(entry));
        }
        Ok(RoutingRegion {
            routing_id,
            covering_radius,
            parent_distance: 0.0,
        })
    }

    fn covers_object(&self, region: &RoutingRegion, object: &O) -> IndexResult<bool> {
        let routing = self.relation.get(region.routing_id)?;
        Ok(within(self.distance(&routing, object), region.covering_radius))
    }

    fn attach(&self, entry: &mut MetricEntry, parent: Option<&RoutingRegion>) -> IndexResult<()> {
        let distance = match parent {
            Some(region) if region.routing_id == entry_id(entry) => 0.0,
            Some(region) => {
                let routing = self.relation.get(region.routing_id)?;
                self.distance(&routing, &self.entry_object(entry)?)
            }
            None => 0.0,
        };
        set_parent_distance(entry, distance);
        Ok(())
    }

    fn choose_subtree(
        &self,
        entries: &[MetricEntry],
        candidate: &MetricEntry,
        _height: usize,
        _depth: usize,
    ) -> IndexResult<usize> {
        let object = self.entry_object(candidate)?;
        let children = entries
            .iter()
            .map(|e| match e {
                Entry::Directory(dir) => {
                    let routing = self.relation.get(dir.region.routing_id)?;
                    Ok((self.distance(&routing, &object), dir.region.covering_radius))
                }
                Entry::Leaf(leaf) => Err(IndexError::IntegrityViolation(format!(
                    "leaf entry {} in a directory node",
                    leaf.id
                ))),
            })
            .collect::<IndexResult<Vec<_>>>()?;
        insert::minimum_enlargement(&children, entry_radius(candidate)).ok_or_else(|| {
            IndexError::InvalidArgument("cannot choose a subtree of an empty node".into())
        })
    }

    fn split(
        &self,
        entries: Vec<MetricEntry>,
        parent: Option<&RoutingRegion>,
        min_fill: usize,
    ) -> IndexResult<SplitResult<MetricLeafData, RoutingRegion>> {
        if entries.len() < 2 {
            return Err(IndexError::InvalidArgument(format!(
                "cannot split a node of {} entries",
                entries.len()
            )));
        }
        let objects = entries
            .iter()
            .map(|e| self.entry_object(e))
            .collect::<IndexResult<Vec<_>>>()?;
        let radii: Vec<f64> = entries.iter().map(entry_radius).collect();
        let parent_distances: Vec<f64> = entries.iter().map(parent_distance).collect();
        let matrix = DistanceMatrix::new(objects.len(), |i, j| {
            self.distance(&objects[i], &objects[j])
        });

        let MetricSplit {
            first_seed,
            first,
            first_radius,
            second_seed,
            second,
            second_radius,
        } = split::split(
            &matrix,
            &radii,
            parent.map(|_| parent_distances.as_slice()),
            self.promotion,
            self.distribution,
            min_fill,
        );
        let first_region = RoutingRegion {
            routing_id: entry_id(&entries[first_seed]),
            covering_radius: first_radius,
            parent_distance: 0.0,
        };
        let second_region = RoutingRegion {
            routing_id: entry_id(&entries[second_seed]),
            covering_radius: second_radius,
            parent_distance: 0.0,
        };

        let mut slots: Vec<Option<MetricEntry>> = entries.into_iter().map(Some).collect();
        let mut take = |seed: usize, group: &[usize]| -> Vec<MetricEntry> {
            group
                .iter()
                .filter_map(|&k| {
                    let mut entry = slots[k].take()?;
                    set_parent_distance(&mut entry, matrix.get(seed, k));
                    Some(entry)
                })
                .collect()
        };
        let first = take(first_seed, &first);
        let second = take(second_seed, &second);

        Ok(SplitResult {
            first,
            first_region,
            second,
            second_region,
        })
    }

    fn center_distances(&self, entries: &[MetricEntry]) -> IndexResult<Vec<f64>> {
        Ok(entries.iter().map(parent_distance).collect())
    }

    fn validate_entry(
        &self,
        parent: Option<&RoutingRegion>,
        entry: &MetricEntry,
    ) -> IndexResult<()> {
        let region = match parent {
            Some(region) => region,
            None => return Ok(()),
        };
        let routing = self.relation.get(region.routing_id)?;
        let d = self.distance(&routing, &self.entry_object(entry)?);
        let stored = parent_distance(entry);
        if (d - stored).abs() > RADIUS_TOLERANCE * d.max(1.0) {
            return Err(IndexError::IntegrityViolation(format!(
                "entry {} stores parent distance {} but is at distance {} from {}",
                entry_id(entry),
                stored,
                d,
                region
            )));
        }
        if !within(d + entry_radius(entry), region.covering_radius) {
            return Err(IndexError::IntegrityViolation(format!(
                "entry {} of radius {} at distance {} is not covered by the {}",
                entry_id(entry),
                entry_radius(entry),
                d,
                region
            )));
        }
        Ok(())
    }

    fn directory_bound(
        &self,
        query: &O,
        region: &RoutingRegion,
    ) -> IndexResult<(f64, Option<f64>)> {
        let routing = self.relation.get(region.routing_id)?;
        let d = self.distance(query, &routing);
        Ok(((d - region.covering_radius).max(0.0), Some(d)))
    }

    fn parent_bound(&self, entry: &MetricEntry, routing_distance: f64) -> Option<f64> {
        Some(((routing_distance - parent_distance(entry)).abs() - entry_radius(entry)).max(0.0))
    }

    fn leaf_distance(&self, query: &O, leaf: &LeafEntry<MetricLeafData>) -> IndexResult<f64> {
        let object = self.relation.get(leaf.id)?;
        Ok(self.distance(query, &object))
    }

    fn distance_calculations(&self) -> u64 {
        self.counter.get()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for metric trees.
///
/// Bulk loading is not available for metric trees; a builder given
/// settings that enable it fails with a configuration error.
pub struct MTreeBuilder<O> {
    settings: TreeSettings,
    distance: Arc<dyn Distance<O>>,
    promotion: Promotion,
    distribution: Distribution,
}

impl<O> Clone for MTreeBuilder<O> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            distance: Arc::clone(&self.distance),
            promotion: self.promotion,
            distribution: self.distribution,
        }
    }
}

impl<O> MTreeBuilder<O>
where
    O: Clone + Send + Sync + 'static,
{
    /// A builder for trees over objects compared by `distance`, which must
    /// satisfy the triangle inequality.
    pub fn new<D: Distance<O> + 'static>(distance: D) -> Self {
        Self {
            settings: TreeSettings::default(),
            distance: Arc::new(distance),
            promotion: Promotion::default(),
            distribution: Distribution::default(),
        }
    }

    /// Replaces all common settings, e.g. ones loaded from a file
    #[inline]
    pub fn with_settings(mut self, settings: TreeSettings) -> Self {
        self.settings = settings;
        self
    }

    #[inline]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.settings.page_size = page_size;
        self
    }

    /// Fixes the node capacity instead of deriving it from the page size
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.settings.capacity = Some(capacity);
        self
    }

    #[inline]
    pub fn min_fill(mut self, min_fill: f64) -> Self {
        self.settings.min_fill = min_fill;
        self
    }

    #[inline]
    pub fn overflow_treatment(mut self, treatment: OverflowTreatment) -> Self {
        self.settings.overflow_treatment = treatment;
        self
    }

    #[inline]
    pub fn cache_pages(mut self, cache_pages: usize) -> Self {
        self.settings.cache_pages = cache_pages;
        self
    }

    #[inline]
    pub fn promotion(mut self, promotion: Promotion) -> Self {
        self.promotion = promotion;
        self
    }

    #[inline]
    pub fn distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    fn model(&self, relation: Arc<dyn Relation<O>>) -> IndexResult<MetricModel<O>> {
        self.settings.validate()?;
        if self.settings.bulk_load {
            return Err(IndexError::Configuration(
                "bulk loading is only supported by spatial trees".into(),
            ));
        }
        Ok(MetricModel {
            relation,
            distance: Arc::clone(&self.distance),
            promotion: self.promotion,
            distribution: self.distribution,
            counter: DistanceCounter::new(),
        })
    }

    /// Creates an empty tree held in memory.
    pub fn build_in_memory(&self, relation: Arc<dyn Relation<O>>) -> IndexResult<MTree<O>> {
        let model = self.model(relation)?;
        let pages = MemoryPageFile::new(self.settings.page_size);
        IndexTree::create(model, pages, self.settings.clone())
    }

    /// Creates an empty tree in a new page file at `path`.
    pub fn build(
        &self,
        relation: Arc<dyn Relation<O>>,
        path: impl AsRef<Path>,
    ) -> IndexResult<MTree<O, DiskPageFile<MetricNode>>> {
        let model = self.model(relation)?;
        let pages = DiskPageFile::create_with(
            path.as_ref(),
            self.settings.page_size,
            self.settings.cache_pages,
        )?;
        debug!("Building M-tree in {:?}", path.as_ref());
        IndexTree::create(model, pages, self.settings.clone())
    }

    /// Opens a tree created by [`build`](Self::build). The builder must be
    /// configured like the one that built it.
    pub fn open(
        &self,
        relation: Arc<dyn Relation<O>>,
        path: impl AsRef<Path>,
    ) -> IndexResult<MTree<O, DiskPageFile<MetricNode>>> {
        let model = self.model(relation)?;
        let pages = DiskPageFile::open_with_cache_size(path.as_ref(), self.settings.cache_pages)?;
        IndexTree::open(model, pages, self.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{EuclideanDistance, LevenshteinDistance};
    use crate::relation::MemoryRelation;
    use crate::tree::settings::ReinsertVariant;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(count: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| vec![rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)])
            .collect()
    }

    fn vector_tree(
        points: Vec<Vec<f64>>,
        builder: MTreeBuilder<Vec<f64>>,
    ) -> (MTree<Vec<f64>>, Vec<ObjectId>) {
        let relation = Arc::new(MemoryRelation::new());
        let ids = relation.add_all(points);
        let mut tree = builder.build_in_memory(relation).unwrap();
        tree.insert_all(&ids).unwrap();
        (tree, ids)
    }

    #[test]
    fn test_parent_distances_and_radii_hold() {
        let (tree, _) = vector_tree(
            random_points(500, 11),
            MTreeBuilder::new(EuclideanDistance).capacity(8),
        );
        let report = tree.integrity_check().unwrap();
        assert_eq!(report.entries, 500);
        assert!(report.height >= 3);
    }

    #[test]
    fn test_every_promotion_and_distribution() {
        let points = random_points(200, 12);
        for promotion in [
            Promotion::MinMaxRadius,
            Promotion::MaxLowerBoundDistance,
            Promotion::FarthestPoints,
        ] {
            for distribution in [Distribution::GeneralizedHyperplane, Distribution::Balanced] {
                let (tree, _) = vector_tree(
                    points.clone(),
                    MTreeBuilder::new(EuclideanDistance)
                        .capacity(6)
                        .promotion(promotion)
                        .distribution(distribution)
                        .overflow_treatment(OverflowTreatment::Split),
                );
                assert_eq!(
                    tree.integrity_check().unwrap().entries,
                    200,
                    "{:?} {:?}",
                    promotion,
                    distribution
                );
            }
        }
    }

    #[test]
    fn test_knn_matches_brute_force() {
        let points = random_points(400, 13);
        let (tree, _) = vector_tree(
            points.clone(),
            MTreeBuilder::new(EuclideanDistance)
                .capacity(10)
                .overflow_treatment(OverflowTreatment::LimitedReinsert {
                    fraction: 0.3,
                    variant: ReinsertVariant::Far,
                }),
        );
        let query = vec![30.0, 60.0];
        let mut expected: Vec<f64> = points
            .iter()
            .map(|p| EuclideanDistance.distance(p, &query))
            .collect();
        expected.sort_by(|a, b| a.total_cmp(b));

        let knn = tree.knn(&query, 7).unwrap();
        for (result, distance) in knn.iter().zip(&expected[..7]) {
            assert!((result.distance - distance).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pruning_saves_distance_computations() {
        let (tree, _) = vector_tree(
            random_points(1000, 14),
            MTreeBuilder::new(EuclideanDistance).capacity(10),
        );
        let before = tree.stats().distance_calculations;
        let results = tree.range(&vec![50.0, 50.0], 5.0).unwrap();
        let spent = tree.stats().distance_calculations - before;
        assert!(results.iter().all(|r| r.distance <= 5.0));
        assert!(spent < 1000, "range query computed {} distances", spent);
    }

    #[test]
    fn test_cheap_priority_search_yields_lower_bounds() {
        let points = random_points(300, 15);
        let (tree, _) = vector_tree(
            points.clone(),
            MTreeBuilder::new(EuclideanDistance).capacity(8),
        );
        let query = vec![10.0, 10.0];
        let mut previous = 0.0;
        let mut count = 0;
        for result in tree.priority_search_cheap(query.clone()).unwrap() {
            let result = result.unwrap();
            let exact = EuclideanDistance.distance(&points[(result.id - 1) as usize], &query);
            assert!(result.distance <= exact + 1e-9);
            assert!(result.distance >= previous);
            previous = result.distance;
            count += 1;
        }
        assert_eq!(count, 300);
    }

    #[test]
    fn test_levenshtein_tree() {
        let words = [
            "kitten", "sitting", "mitten", "bitten", "written", "kitchen", "chicken", "thicken",
            "sitter", "fitting", "knitting", "smitten", "listen", "glisten", "christen",
        ];
        let relation = Arc::new(MemoryRelation::new());
        let ids = relation.add_all(words.iter().map(|w| w.to_string()));
        let mut tree = MTreeBuilder::<String>::new(LevenshteinDistance)
            .capacity(4)
            .build_in_memory(relation)
            .unwrap();
        tree.insert_all(&ids).unwrap();
        tree.integrity_check().unwrap();

        let query = "kitten".to_string();
        let results = tree.range(&query, 1.0).unwrap();
        let mut found: Vec<&str> = results.iter().map(|r| words[(r.id - 1) as usize]).collect();
        found.sort_unstable();
        assert_eq!(found, vec!["bitten", "kitten", "mitten"]);

        let knn = tree.knn(&query, 1).unwrap();
        assert_eq!(knn.ids(), vec![ids[0]]);
    }

    #[test]
    fn test_bulk_load_is_rejected() {
        let relation: Arc<MemoryRelation<Vec<f64>>> = Arc::new(MemoryRelation::new());
        let settings = TreeSettings {
            bulk_load: true,
            ..TreeSettings::default()
        };
        let result = MTreeBuilder::<Vec<f64>>::new(EuclideanDistance)
            .with_settings(settings)
            .build_in_memory(relation);
        assert!(matches!(result, Err(IndexError::Configuration(_))));
    }

    #[test]
    fn test_delete_shrinks_radii() {
        let points = random_points(150, 16);
        let (mut tree, ids) =
            vector_tree(points, MTreeBuilder::new(EuclideanDistance).capacity(6));
        for id in ids.iter().step_by(2) {
            tree.delete(*id).unwrap();
            tree.integrity_check().unwrap();
        }
        assert_eq!(tree.size(), 75);
        assert!(matches!(tree.delete(ids[0]), Err(IndexError::ObjectNotFound(_))));
    }

    #[test]
    fn test_disk_tree_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.simt");
        let relation = Arc::new(MemoryRelation::new());
        let ids = relation.add_all((0..200).map(|i| format!("word{}", i * 7)));
        let builder = MTreeBuilder::<String>::new(LevenshteinDistance).capacity(8);

        let expected = {
            let mut tree = builder.build(relation.clone(), &path).unwrap();
            tree.insert_all(&ids).unwrap();
            tree.flush().unwrap();
            tree.range(&"word77".to_string(), 1.0).unwrap()
        };

        let tree = builder.open(relation, &path).unwrap();
        assert_eq!(tree.size(), 200);
        tree.integrity_check().unwrap();
        assert_eq!(tree.range(&"word77".to_string(), 1.0).unwrap(), expected);
    }
}
