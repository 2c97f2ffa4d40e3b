//! Core types shared by the tree, the page files and the query engines.
//!
//! This module defines:
//! - Error types and result types
//! - Identifier aliases
//! - Statistics structures

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid construction options, reported when the tree is built.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Raised by `integrity_check` only.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Object {0} not found")]
    ObjectNotFound(ObjectId),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Search is exhausted")]
    SearchExhausted,

    #[error("Page file is closed")]
    Closed,
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Identifier of an object stored in a relation
pub type ObjectId = u64;

/// Page ID - unique identifier for a node/page
pub type PageId = u64;

// ============================================================================
// Statistics
// ============================================================================

/// Counters of the page file collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFileStats {
    pub reads: u64,
    pub writes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_pages: u64,
    pub allocated_pages: u64,
    pub free_pages: u64,
}

/// Snapshot of tree level statistics
#[derive(Debug, Clone, Default)]
pub struct TreeStats {
    pub size: u64,
    pub height: u32,
    pub leaf_capacity: usize,
    pub directory_capacity: usize,
    pub distance_calculations: u64,
    pub knn_queries: u64,
    pub range_queries: u64,
    pub priority_queries: u64,
    pub splits: u64,
    pub reinsertions: u64,
    pub pages: PageFileStats,
}

/// Internal statistics tracking
#[derive(Debug, Default)]
pub(crate) struct TreeStatistics {
    pub(crate) knn_queries: AtomicU64,
    pub(crate) range_queries: AtomicU64,
    pub(crate) priority_queries: AtomicU64,
    pub(crate) splits: AtomicU64,
    pub(crate) reinsertions: AtomicU64,
}

impl TreeStatistics {
    pub(crate) fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Counts calls of the distance function collaborator.
#[derive(Debug, Default)]
pub struct DistanceCounter {
    calls: AtomicU64,
}

impl DistanceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, calls: u64) {
        self.calls.fetch_add(calls, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}
