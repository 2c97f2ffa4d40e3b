//! Constants for the paged index trees.

/// Default page size (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size accepted by the page files
pub const MIN_PAGE_SIZE: usize = 128;

/// Default minimum fill fraction of non-root nodes
pub const DEFAULT_MIN_FILL: f64 = 0.4;

/// Default fraction of entries removed by forced reinsertion
pub const DEFAULT_REINSERT_FRACTION: f64 = 0.3;

/// Default candidate count of the approximative least overlap insertion
pub const DEFAULT_OVERLAP_CANDIDATES: usize = 32;

/// Capacities at or below this are rejected
pub const MIN_CAPACITY: usize = 2;

/// Capacities below this log a warning
pub const SMALL_CAPACITY: usize = 10;

/// Bytes of the checksum written in front of every node page
pub const PAGE_CHECKSUM_BYTES: usize = 4;

/// Default cache size in number of pages (4MB with 4KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x53494D54; // "SIMT"

/// File format version
pub const VERSION: u32 = 1;

/// Relative slack allowed when comparing covering radii
pub const RADIUS_TOLERANCE: f64 = 1e-9;
