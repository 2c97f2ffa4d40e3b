//! Page persistence collaborators.
//!
//! A tree stores its nodes through the [`PageFile`] trait. Two
//! implementations are provided:
//! - [`MemoryPageFile`] keeps nodes in a hash map
//! - [`DiskPageFile`] keeps one node per page of a file, with an LRU
//!   write-back cache, CRC checked pages and a persisted free list

pub mod page_types;
pub mod page_cache;
pub mod page_storage;
mod memory_page_file;
mod disk_page_file;

pub use disk_page_file::DiskPageFile;
pub use memory_page_file::MemoryPageFile;
pub use page_types::{FileHeader, FreePage, PageFile, PageWithChecksum, TreeMeta};
