//! The bounding-region abstraction the tree core is written against.
//!
//! A [`RegionModel`] bundles everything that differs between the spatial
//! (minimum bounding rectangle) and the metric (routing object plus covering
//! radius) tree families: region arithmetic, the insertion and split
//! strategies, and the distance bounds used by the query engines.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::entry::{Entry, LeafEntry, Node};
use super::tree_types::{IndexError, IndexResult, ObjectId};

/// Entry type of a model
pub type EntryOf<M> = Entry<<M as RegionModel>::LeafData, <M as RegionModel>::Region>;

/// Node type of a model
pub type NodeOf<M> = Node<<M as RegionModel>::LeafData, <M as RegionModel>::Region>;

/// Two groups produced by a split, with the region of each group.
#[derive(Debug, Clone)]
pub struct SplitResult<L, R> {
    pub first: Vec<Entry<L, R>>,
    pub first_region: R,
    pub second: Vec<Entry<L, R>>,
    pub second_region: R,
}

pub trait RegionModel: Send + Sync {
    /// Query and stored object type
    type Object: Clone + Send + Sync;
    /// Payload of leaf entries
    type LeafData: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;
    /// Bounding region of directory entries
    type Region: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Looks the object up in the relation.
    fn object(&self, id: ObjectId) -> IndexResult<Self::Object>;

    /// Builds the leaf entry of a stored object.
    fn leaf_entry(&self, id: ObjectId) -> IndexResult<LeafEntry<Self::LeafData>>;

    /// A leaf and a directory entry of maximal serialized size, used to
    /// derive node capacities from the page size.
    fn example_entries(&self) -> (EntryOf<Self>, EntryOf<Self>);

    /// Region enclosing `entries`. `current` is the region being refreshed,
    /// if any; metric regions keep its routing object.
    fn cover(
        &self,
        entries: &[EntryOf<Self>],
        current: Option<&Self::Region>,
    ) -> IndexResult<Self::Region>;

    /// Whether an object may be stored below `region`. Prunes the path
    /// search of deletions.
    fn covers_object(&self, region: &Self::Region, object: &Self::Object) -> IndexResult<bool>;

    /// Prepares `entry` for storage below `parent` (`None` for the root).
    fn attach(&self, entry: &mut EntryOf<Self>, parent: Option<&Self::Region>)
        -> IndexResult<()>;

    /// Index of the child of a directory node a new entry descends into.
    /// `depth` is the depth of the directory node, the root being 1.
    fn choose_subtree(
        &self,
        entries: &[EntryOf<Self>],
        candidate: &EntryOf<Self>,
        height: usize,
        depth: usize,
    ) -> IndexResult<usize>;

    /// Splits an overflowing node into two groups of at least `min_fill`
    /// entries each.
    fn split(
        &self,
        entries: Vec<EntryOf<Self>>,
        parent: Option<&Self::Region>,
        min_fill: usize,
    ) -> IndexResult<SplitResult<Self::LeafData, Self::Region>>;

    /// Distance of every entry to the center of the node holding them.
    fn center_distances(&self, entries: &[EntryOf<Self>]) -> IndexResult<Vec<f64>>;

    /// Groups entries for bulk loading. `group_sizes` sums to the number of
    /// entries.
    fn bulk_partition(
        &self,
        _entries: Vec<EntryOf<Self>>,
        _group_sizes: &[usize],
    ) -> IndexResult<Vec<Vec<EntryOf<Self>>>> {
        Err(IndexError::Configuration(
            "bulk loading is not supported by this tree".into(),
        ))
    }

    /// Checks that `entry` is enclosed by `parent`, or is a valid root
    /// entry when `parent` is `None`.
    fn validate_entry(
        &self,
        parent: Option<&Self::Region>,
        entry: &EntryOf<Self>,
    ) -> IndexResult<()>;

    /// Lower bound of the distance from `query` to anything below
    /// `region`, and the distance to the region's routing object if the
    /// model has one.
    fn directory_bound(
        &self,
        query: &Self::Object,
        region: &Self::Region,
    ) -> IndexResult<(f64, Option<f64>)>;

    /// Lower bound derived from the distance between the query and the
    /// routing object of the node holding `entry`, without computing a
    /// distance.
    fn parent_bound(&self, _entry: &EntryOf<Self>, _routing_distance: f64) -> Option<f64> {
        None
    }

    /// Exact distance from `query` to a stored object.
    fn leaf_distance(
        &self,
        query: &Self::Object,
        leaf: &LeafEntry<Self::LeafData>,
    ) -> IndexResult<f64>;

    /// Number of distance computations performed so far.
    fn distance_calculations(&self) -> u64;
}
