//! The R*-tree family: spatial trees over numeric vectors bounded by
//! minimum bounding rectangles.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use simtree::relation::MemoryRelation;
//! use simtree::RStarTreeBuilder;
//!
//! let relation = Arc::new(MemoryRelation::new());
//! let ids = relation.add_all(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![5.0, 5.0]]);
//!
//! let mut tree = RStarTreeBuilder::new(2).build_in_memory(relation).unwrap();
//! tree.insert_all(&ids).unwrap();
//!
//! let nearest = tree.knn(&vec![0.9, 0.9], 1).unwrap();
//! assert_eq!(nearest.ids(), vec![ids[1]]);
//! ```

mod bulk_split;
mod insert;
mod split;

use std::path::Path;
use std::sync::Arc;

use log::debug;

pub use bulk_split::BulkSplitStrategy;
pub use insert::InsertionStrategy;
pub use split::SplitStrategy;

use crate::bounding_box::HyperBoundingBox;
use crate::distance::{EuclideanDistance, SpatialDistance};
use crate::page::{DiskPageFile, MemoryPageFile};
use crate::relation::Relation;
use crate::tree::entry::{Entry, LeafEntry, Node};
use crate::tree::region::{EntryOf, RegionModel, SplitResult};
use crate::tree::settings::{OverflowTreatment, TreeSettings};
use crate::tree::tree_types::{DistanceCounter, IndexError, IndexResult, ObjectId};
use crate::tree::IndexTree;

/// Node of a spatial tree
pub type SpatialNode = Node<Vec<f64>, HyperBoundingBox>;

/// An R*-tree, held in memory unless another page file is given
pub type RStarTree<P = MemoryPageFile<SpatialNode>> = IndexTree<SpatialModel, P>;

/// Region model of the R*-tree family
pub struct SpatialModel {
    relation: Arc<dyn Relation<Vec<f64>>>,
    distance: Arc<dyn SpatialDistance>,
    dimensionality: usize,
    insertion: InsertionStrategy,
    split: SplitStrategy,
    bulk_split: BulkSplitStrategy,
    counter: DistanceCounter,
}

impl SpatialModel {
    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    pub fn insertion_strategy(&self) -> &InsertionStrategy {
        &self.insertion
    }

    pub fn split_strategy(&self) -> SplitStrategy {
        self.split
    }

    pub fn bulk_split_strategy(&self) -> BulkSplitStrategy {
        self.bulk_split
    }

    fn check_dimensionality(&self, vector: &[f64]) -> IndexResult<()> {
        if vector.len() != self.dimensionality {
            return Err(IndexError::InvalidArgument(format!(
                "expected a vector of dimensionality {}, got {}",
                self.dimensionality,
                vector.len()
            )));
        }
        Ok(())
    }

    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        self.counter.record(1);
        self.distance.distance(a, b)
    }
}

/// Box of an entry: the point of a leaf entry or the region of a directory
/// entry
fn entry_box(entry: &EntryOf<SpatialModel>) -> HyperBoundingBox {
    match entry {
        Entry::Leaf(leaf) => HyperBoundingBox::from_point(&leaf.data),
        Entry::Directory(dir) => dir.region.clone(),
    }
}

/// Moves `entries` into the groups given by index.
fn take_groups<T>(entries: Vec<T>, groups: &[Vec<usize>]) -> Vec<Vec<T>> {
    let mut slots: Vec<Option<T>> = entries.into_iter().map(Some).collect();
    groups
        .iter()
        .map(|group| group.iter().filter_map(|&i| slots[i].take()).collect())
        .collect()
}

fn union_of(boxes: &[HyperBoundingBox], group: &[usize]) -> IndexResult<HyperBoundingBox> {
    HyperBoundingBox::union_all(group.iter().map(|&i| &boxes[i]))
        .ok_or_else(|| IndexError::InvalidArgument("cannot bound an empty group".into()))
}

impl RegionModel for SpatialModel {
    type Object = Vec<f64>;
    type LeafData = Vec<f64>;
    type Region = HyperBoundingBox;

    fn object(&self, id: ObjectId) -> IndexResult<Vec<f64>> {
        self.relation.get(id)
    }

    fn leaf_entry(&self, id: ObjectId) -> IndexResult<LeafEntry<Vec<f64>>> {
        let data = self.relation.get(id)?;
        self.check_dimensionality(&data)?;
        Ok(LeafEntry { id, data })
    }

    fn example_entries(&self) -> (EntryOf<Self>, EntryOf<Self>) {
        let point = vec![0.0; self.dimensionality];
        let region = HyperBoundingBox::from_point(&point);
        (
            Entry::leaf(ObjectId::MAX, point),
            Entry::directory(u64::MAX, region),
        )
    }

    fn cover(
        &self,
        entries: &[EntryOf<Self>],
        _current: Option<&HyperBoundingBox>,
    ) -> IndexResult<HyperBoundingBox> {
        let boxes: Vec<HyperBoundingBox> = entries.iter().map(entry_box).collect();
        HyperBoundingBox::union_all(boxes.iter())
            .ok_or_else(|| IndexError::InvalidArgument("cannot bound an empty node".into()))
    }

    fn covers_object(&self, region: &HyperBoundingBox, object: &Vec<f64>) -> IndexResult<bool> {
        Ok(region.contains_point(object))
    }

    fn attach(
        &self,
        _entry: &mut EntryOf<Self>,
        _parent: Option<&HyperBoundingBox>,
    ) -> IndexResult<()> {
        Ok(())
    }

    fn choose_subtree(
        &self,
        entries: &[EntryOf<Self>],
        candidate: &EntryOf<Self>,
        height: usize,
        depth: usize,
    ) -> IndexResult<usize> {
        let children = entries
            .iter()
            .map(|e| match e {
                Entry::Directory(dir) => Ok(&dir.region),
                Entry::Leaf(leaf) => Err(IndexError::IntegrityViolation(format!(
                    "leaf entry {} in a directory node",
                    leaf.id
                ))),
            })
            .collect::<IndexResult<Vec<_>>>()?;
        self.insertion
            .choose(&children, &entry_box(candidate), height, depth)
    }

    fn split(
        &self,
        entries: Vec<EntryOf<Self>>,
        _parent: Option<&HyperBoundingBox>,
        min_fill: usize,
    ) -> IndexResult<SplitResult<Vec<f64>, HyperBoundingBox>> {
        if entries.len() < 2 {
            return Err(IndexError::InvalidArgument(format!(
                "cannot split a node of {} entries",
                entries.len()
            )));
        }
        let boxes: Vec<HyperBoundingBox> = entries.iter().map(entry_box).collect();
        let (first, second) = self.split.partition(&boxes, min_fill);
        let first_region = union_of(&boxes, &first)?;
        let second_region = union_of(&boxes, &second)?;

        let mut groups = take_groups(entries, &[first, second]).into_iter();
        Ok(SplitResult {
            first: groups.next().unwrap_or_default(),
            first_region,
            second: groups.next().unwrap_or_default(),
            second_region,
        })
    }

    fn center_distances(&self, entries: &[EntryOf<Self>]) -> IndexResult<Vec<f64>> {
        let boxes: Vec<HyperBoundingBox> = entries.iter().map(entry_box).collect();
        let center = match HyperBoundingBox::union_all(boxes.iter()) {
            Some(bounds) => bounds.center(),
            None => return Ok(Vec::new()),
        };
        Ok(boxes
            .iter()
            .map(|b| self.distance(&b.center(), &center))
            .collect())
    }

    fn bulk_partition(
        &self,
        entries: Vec<EntryOf<Self>>,
        group_sizes: &[usize],
    ) -> IndexResult<Vec<Vec<EntryOf<Self>>>> {
        let centers: Vec<Vec<f64>> = entries.iter().map(|e| entry_box(e).center()).collect();
        let groups = self.bulk_split.partition(&centers, group_sizes);
        Ok(take_groups(entries, &groups))
    }

    fn validate_entry(
        &self,
        parent: Option<&HyperBoundingBox>,
        entry: &EntryOf<Self>,
    ) -> IndexResult<()> {
        let bounds = entry_box(entry);
        if bounds.dimensionality() != self.dimensionality {
            return Err(IndexError::IntegrityViolation(format!(
                "entry of dimensionality {} in a tree of dimensionality {}",
                bounds.dimensionality(),
                self.dimensionality
            )));
        }
        match parent {
            Some(region) if !region.contains(&bounds) => {
                Err(IndexError::IntegrityViolation(format!(
                    "{} is not contained in its parent region {}",
                    bounds, region
                )))
            }
            _ => Ok(()),
        }
    }

    fn directory_bound(
        &self,
        query: &Vec<f64>,
        region: &HyperBoundingBox,
    ) -> IndexResult<(f64, Option<f64>)> {
        self.check_dimensionality(query)?;
        self.counter.record(1);
        Ok((self.distance.min_dist(query, region), None))
    }

    fn leaf_distance(&self, query: &Vec<f64>, leaf: &LeafEntry<Vec<f64>>) -> IndexResult<f64> {
        self.check_dimensionality(query)?;
        Ok(self.distance(query, &leaf.data))
    }

    fn distance_calculations(&self) -> u64 {
        self.counter.get()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for spatial trees.
///
/// `build_in_memory`, `build` and `open` validate the configuration and
/// fail with a configuration error before any page is written.
#[derive(Clone)]
pub struct RStarTreeBuilder {
    dimensionality: usize,
    settings: TreeSettings,
    distance: Arc<dyn SpatialDistance>,
    insertion: InsertionStrategy,
    split: SplitStrategy,
    bulk_split: BulkSplitStrategy,
}

impl RStarTreeBuilder {
    /// A builder for trees over vectors of `dimensionality` coordinates,
    /// using the Euclidean distance and the R*-tree strategies.
    pub fn new(dimensionality: usize) -> Self {
        Self {
            dimensionality,
            settings: TreeSettings::default(),
            distance: Arc::new(EuclideanDistance),
            insertion: InsertionStrategy::default(),
            split: SplitStrategy::default(),
            bulk_split: BulkSplitStrategy::default(),
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
    pub fn distance<D: SpatialDistance + 'static>(mut self, distance: D) -> Self {
        self.distance = Arc::new(distance);
        self
    }

    #[inline]
    pub fn insertion_strategy(mut self, strategy: InsertionStrategy) -> Self {
        self.insertion = strategy;
        self
    }

    #[inline]
    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.split = strategy;
        self
    }

    /// Bulk loads the first batch passed to `insert_all` with `strategy`
    #[inline]
    pub fn bulk_load(mut self, strategy: BulkSplitStrategy) -> Self {
        self.settings.bulk_load = true;
        self.bulk_split = strategy;
        self
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    fn model(&self, relation: Arc<dyn Relation<Vec<f64>>>) -> IndexResult<SpatialModel> {
        if self.dimensionality == 0 {
            return Err(IndexError::Configuration(
                "spatial trees need at least one dimension".into(),
            ));
        }
        self.settings.validate()?;
        self.insertion.validate()?;
        Ok(SpatialModel {
            relation,
            distance: Arc::clone(&self.distance),
            dimensionality: self.dimensionality,
            insertion: self.insertion.clone(),
            split: self.split,
            bulk_split: self.bulk_split,
            counter: DistanceCounter::new(),
        })
    }

    /// Creates an empty tree held in memory.
    pub fn build_in_memory(&self, relation: Arc<dyn Relation<Vec<f64>>>) -> IndexResult<RStarTree> {
        let model = self.model(relation)?;
        let pages = MemoryPageFile::new(self.settings.page_size);
        IndexTree::create(model, pages, self.settings.clone())
    }

    /// Creates an empty tree in a new page file at `path`.
    pub fn build(
        &self,
        relation: Arc<dyn Relation<Vec<f64>>>,
        path: impl AsRef<Path>,
    ) -> IndexResult<RStarTree<DiskPageFile<SpatialNode>>> {
        let model = self.model(relation)?;
        let pages = DiskPageFile::create_with(
            path.as_ref(),
            self.settings.page_size,
            self.settings.cache_pages,
        )?;
        debug!("Building {}-dimensional R*-tree in {:?}", self.dimensionality, path.as_ref());
        IndexTree::create(model, pages, self.settings.clone())
    }

    /// Opens a tree created by [`build`](Self::build). The builder must be
    /// configured like the one that built it.
    pub fn open(
        &self,
        relation: Arc<dyn Relation<Vec<f64>>>,
        path: impl AsRef<Path>,
    ) -> IndexResult<RStarTree<DiskPageFile<SpatialNode>>> {
        let model = self.model(relation)?;
        let pages = DiskPageFile::open_with_cache_size(path.as_ref(), self.settings.cache_pages)?;
        IndexTree::open(model, pages, self.settings.clone())
    }
}
