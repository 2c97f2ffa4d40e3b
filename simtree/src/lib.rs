//! # simtree - Paged Index Trees for Similarity Search
//!
//! This crate provides balanced, page-oriented index trees that accelerate
//! range, k-nearest-neighbor and best-first similarity queries, over numeric
//! vectors or over arbitrary objects with a metric.
//!
//! ## Features
//!
//! - **One Tree Core**: insertion, forced reinsertion, splits, deletion with
//!   underflow repair and bulk loading, written once over a region model
//! - **R\*-Tree Family**: minimum bounding rectangles, least overlap
//!   insertion, topological and Guttman splits, sort-based bulk loading
//! - **M-Tree Family**: routing objects with covering radii, parent distance
//!   pruning, several promotion and distribution strategies
//! - **Exact Queries**: range and k-NN with ties at the k-th distance
//! - **Incremental Search**: lazy best-first iteration with a cut-off
//! - **Pluggable Pages**: in-memory arena or a disk file with an LRU cache
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use simtree::relation::MemoryRelation;
//! use simtree::RStarTreeBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let relation = Arc::new(MemoryRelation::new());
//! let ids = relation.add_all((0..100).map(|i| vec![i as f64, (i % 10) as f64]));
//!
//! let mut tree = RStarTreeBuilder::new(2).capacity(8).build_in_memory(relation)?;
//! tree.insert_all(&ids)?;
//!
//! let knn = tree.knn(&vec![50.0, 0.0], 3)?;
//! assert_eq!(knn.get(0).map(|r| r.id), Some(ids[50]));
//!
//! for result in tree.priority_search(vec![0.0, 0.0])?.take(5) {
//!     let result = result?;
//!     println!("{} at {}", result.id, result.distance);
//! }
//! tree.integrity_check()?;
//! # Ok(())
//! # }
//! ```

pub mod bounding_box;
pub mod distance;
pub mod hilbert;
pub mod metric;
pub mod page;
pub mod query;
pub mod relation;
pub mod spatial;
pub mod tree;

// Re-export tree types
pub use tree::{
    IndexError, IndexResult, IndexTree, IntegrityReport, ObjectId, OverflowTreatment, PageId,
    ReinsertVariant, TreeSettings, TreeStats,
};

// Re-export the two tree families
pub use metric::{Distribution, MTree, MTreeBuilder, MetricModel, Promotion};
pub use spatial::{
    BulkSplitStrategy, InsertionStrategy, RStarTree, RStarTreeBuilder, SpatialModel,
    SplitStrategy,
};

// Re-export collaborators
pub use bounding_box::HyperBoundingBox;
pub use distance::{Distance, SpatialDistance};
pub use page::{DiskPageFile, MemoryPageFile, PageFile};
pub use query::{DistanceResult, KnnList, PrioritySearcher};
pub use relation::{MemoryRelation, Relation};
