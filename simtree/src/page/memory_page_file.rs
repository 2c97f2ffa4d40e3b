//! In-memory page file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::page_types::{PageFile, TreeMeta};
use crate::tree::tree_constants::DEFAULT_PAGE_SIZE;
use crate::tree::tree_types::{IndexError, IndexResult, PageFileStats, PageId};

/// Page file keeping every node in a hash map. Freed ids are reused.
pub struct MemoryPageFile<N> {
    pages: RwLock<HashMap<PageId, N>>,
    free_ids: Mutex<Vec<PageId>>,
    next_id: AtomicU64,
    meta: RwLock<Option<TreeMeta>>,
    page_size: usize,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl<N> MemoryPageFile<N> {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            free_ids: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            meta: RwLock::new(None),
            page_size,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of pages currently holding a node
    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }
}

impl<N> Default for MemoryPageFile<N> {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl<N: Clone + Send + Sync> PageFile<N> for MemoryPageFile<N> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_node(&self, page_id: PageId) -> IndexResult<N> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.pages
            .read()
            .get(&page_id)
            .cloned()
            .ok_or(IndexError::PageNotFound(page_id))
    }

    fn write_node(&self, page_id: PageId, node: N) -> IndexResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.pages.write().insert(page_id, node);
        Ok(())
    }

    fn allocate_id(&self) -> IndexResult<PageId> {
        if let Some(page_id) = self.free_ids.lock().pop() {
            return Ok(page_id);
        }
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn free_id(&self, page_id: PageId) -> IndexResult<()> {
        if self.pages.write().remove(&page_id).is_none() {
            return Err(IndexError::PageNotFound(page_id));
        }
        self.free_ids.lock().push(page_id);
        Ok(())
    }

    fn load_meta(&self) -> IndexResult<Option<TreeMeta>> {
        Ok(*self.meta.read())
    }

    fn store_meta(&self, meta: &TreeMeta) -> IndexResult<()> {
        *self.meta.write() = Some(*meta);
        Ok(())
    }

    fn flush(&self) -> IndexResult<()> {
        Ok(())
    }

    fn stats(&self) -> PageFileStats {
        let pages = self.pages.read().len() as u64;
        PageFileStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            cache_hits: 0,
            cache_misses: 0,
            cached_pages: pages,
            allocated_pages: pages,
            free_pages: self.free_ids.lock().len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_page_file_read_write() {
        let pages: MemoryPageFile<String> = MemoryPageFile::default();
        let id = pages.allocate_id().unwrap();
        assert_eq!(id, 1);
        pages.write_node(id, "root".to_string()).unwrap();
        assert_eq!(pages.read_node(id).unwrap(), "root");
        assert!(matches!(
            pages.read_node(42),
            Err(IndexError::PageNotFound(42))
        ));

        let stats = pages.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 2);
    }

    #[test]
    fn test_memory_page_file_reuses_freed_ids() {
        let pages: MemoryPageFile<u32> = MemoryPageFile::new(1024);
        let a = pages.allocate_id().unwrap();
        let b = pages.allocate_id().unwrap();
        pages.write_node(a, 1).unwrap();
        pages.write_node(b, 2).unwrap();

        pages.free_id(a).unwrap();
        assert_eq!(pages.page_count(), 1);
        assert_eq!(pages.stats().free_pages, 1);
        assert_eq!(pages.allocate_id().unwrap(), a);
        assert!(pages.free_id(99).is_err());
    }

    #[test]
    fn test_memory_page_file_meta() {
        let pages: MemoryPageFile<u32> = MemoryPageFile::default();
        assert!(pages.load_meta().unwrap().is_none());
        let meta = TreeMeta {
            root_page: 1,
            root_level: 0,
            entry_count: 0,
            leaf_capacity: 8,
            directory_capacity: 8,
        };
        pages.store_meta(&meta).unwrap();
        assert_eq!(pages.load_meta().unwrap(), Some(meta));
    }
}
