//! Page file collaborator interface and on-disk page types.

use serde::{Deserialize, Serialize};

use crate::tree::tree_constants::{MAGIC, VERSION};
use crate::tree::tree_types::{IndexError, IndexResult, PageFileStats, PageId};

/// Persistence collaborator of a tree: stores nodes by page id.
///
/// Implementations use interior mutability so that readers can share a
/// tree across threads; writers are serialized by the tree itself.
pub trait PageFile<N>: Send + Sync {
    /// Page size in bytes
    fn page_size(&self) -> usize;

    fn read_node(&self, page_id: PageId) -> IndexResult<N>;

    fn write_node(&self, page_id: PageId, node: N) -> IndexResult<()>;

    fn allocate_id(&self) -> IndexResult<PageId>;

    fn free_id(&self, page_id: PageId) -> IndexResult<()>;

    /// Tree metadata stored by a previous session, if any
    fn load_meta(&self) -> IndexResult<Option<TreeMeta>>;

    fn store_meta(&self, meta: &TreeMeta) -> IndexResult<()>;

    fn flush(&self) -> IndexResult<()>;

    fn stats(&self) -> PageFileStats;
}

/// Tree level metadata kept by the page file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMeta {
    pub root_page: PageId,
    pub root_level: u32,
    pub entry_count: u64,
    pub leaf_capacity: u32,
    pub directory_capacity: u32,
}

// ============================================================================
// Free List Page
// ============================================================================

/// A free page in the free list chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreePage {
    /// Next free page in the chain (0 = end of chain)
    pub next_free: PageId,
}

// ============================================================================
// Page with Checksum
// ============================================================================

/// A page wrapped with CRC32 checksum for corruption detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithChecksum<N> {
    /// CRC32 checksum of the node data
    pub checksum: u32,
    /// The actual node data
    pub node: N,
}

impl<N: Serialize> PageWithChecksum<N> {
    pub fn new(node: N) -> IndexResult<Self> {
        let checksum = Self::calculate_checksum(&node)?;
        Ok(Self { checksum, node })
    }

    /// Calculate CRC32 checksum of node data
    pub fn calculate_checksum(node: &N) -> IndexResult<u32> {
        let serialized = bincode::serde::encode_to_vec(node, bincode::config::legacy())
            .map_err(|e| IndexError::Serialization(e.to_string()))?;
        Ok(crc32(&serialized))
    }

    /// Verify checksum and consume self to return node
    pub fn into_node(self) -> IndexResult<N> {
        let expected = Self::calculate_checksum(&self.node)?;
        if self.checksum != expected {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Page checksum mismatch - possible corruption (expected: {:x}, got: {:x})",
                    expected, self.checksum
                ),
            )));
        }
        Ok(self.node)
    }
}

/// CRC32-MPEG2
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0x04C11DB7;
    let mut crc: u32 = 0xFFFFFFFF;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}

// ============================================================================
// File Header
// ============================================================================

/// File header stored in page 0 of a disk page file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub next_page_id: PageId,
    pub free_list_head: PageId,
    pub free_page_count: u64,
    pub meta: Option<TreeMeta>,
}

impl FileHeader {
    pub fn new(page_size: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: page_size as u32,
            next_page_id: 1,
            free_list_head: 0,
            free_page_count: 0,
            meta: None,
        }
    }

    pub fn validate(&self) -> IndexResult<()> {
        if self.magic != MAGIC {
            return Err(IndexError::InvalidArgument(
                "Invalid file format (bad magic)".into(),
            ));
        }
        if self.version != VERSION {
            return Err(IndexError::InvalidArgument(format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        Ok(())
    }
}
