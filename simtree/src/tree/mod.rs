//! Generic balanced tree core.
//!
//! The tree is an arena of nodes addressed by page id. Paths from the root
//! ([`IndexTreePath`]) replace parent pointers, and the per-insert
//! [`ReinsertionState`] is owned by the caller of one top-level insert.

pub mod entry;
pub mod integrity;
pub mod path;
pub mod region;
pub mod settings;
pub mod tree_constants;
mod tree_impl;
pub mod tree_types;

pub use entry::{DirectoryEntry, Entry, LeafEntry, Node};
pub use integrity::IntegrityReport;
pub use path::{IndexTreePath, PathStep, ReinsertionState};
pub use region::{EntryOf, NodeOf, RegionModel, SplitResult};
pub use settings::{Capacities, OverflowTreatment, ReinsertVariant, TreeSettings};
pub use tree_impl::IndexTree;
pub use tree_types::{
    DistanceCounter, IndexError, IndexResult, ObjectId, PageFileStats, PageId, TreeStats,
};
