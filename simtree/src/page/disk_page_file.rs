//! Disk page file with an LRU write-back cache and a persisted free list.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::page_cache::PageCache;
use super::page_storage::Storage;
use super::page_types::{FileHeader, FreePage, PageFile, TreeMeta};
use crate::tree::tree_constants::{DEFAULT_CACHE_PAGES, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::tree::tree_types::{IndexError, IndexResult, PageFileStats, PageId};

/// Page file storing one node per fixed-size page of a single file.
///
/// Nodes are loaded lazily; opening a file only reads its header.
pub struct DiskPageFile<N: Serialize> {
    inner: Arc<DiskPageFileInner<N>>,
}

struct DiskPageFileInner<N: Serialize> {
    storage: Storage,
    cache: RwLock<PageCache<N>>,
    header: RwLock<FileHeader>,
    stats: PageStatistics,
    closed: RwLock<bool>,
    _node: PhantomData<fn() -> N>,
}

/// Internal statistics tracking
struct PageStatistics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

impl PageStatistics {
    fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            disk_reads: AtomicU64::new(0),
            disk_writes: AtomicU64::new(0),
        }
    }
}

impl<N: Serialize> Clone for DiskPageFile<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N> DiskPageFile<N>
where
    N: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Create an empty page file with the default page size.
    pub fn create(path: impl AsRef<Path>) -> IndexResult<Self> {
        Self::create_with(path, DEFAULT_PAGE_SIZE, DEFAULT_CACHE_PAGES)
    }

    /// Create with custom page size and cache size (number of pages)
    pub fn create_with(
        path: impl AsRef<Path>,
        page_size: usize,
        cache_pages: usize,
    ) -> IndexResult<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(IndexError::Configuration(format!(
                "page size {} is below the minimum of {} bytes",
                page_size, MIN_PAGE_SIZE
            )));
        }
        let storage = Storage::create(path.as_ref(), page_size)?;
        let header = FileHeader::new(page_size);
        storage.write_header(&header)?;
        storage.sync()?;
        debug!(
            "Created page file {:?} with {} byte pages",
            path.as_ref(),
            page_size
        );

        Ok(Self::from_parts(storage, header, cache_pages))
    }

    /// Open an existing page file. Only the header is read.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        Self::open_with_cache_size(path, DEFAULT_CACHE_PAGES)
    }

    pub fn open_with_cache_size(path: impl AsRef<Path>, cache_pages: usize) -> IndexResult<Self> {
        let (storage, header) = Storage::open(path.as_ref())?;
        debug!(
            "Opened page file {:?}: {} pages, {} free",
            path.as_ref(),
            header.next_page_id.saturating_sub(1),
            header.free_page_count
        );
        Ok(Self::from_parts(storage, header, cache_pages))
    }

    fn from_parts(storage: Storage, header: FileHeader, cache_pages: usize) -> Self {
        Self {
            inner: Arc::new(DiskPageFileInner {
                storage,
                cache: RwLock::new(PageCache::new(cache_pages)),
                header: RwLock::new(header),
                stats: PageStatistics::new(),
                closed: RwLock::new(false),
                _node: PhantomData,
            }),
        }
    }

    fn check_closed(&self) -> IndexResult<()> {
        if *self.inner.closed.read() {
            Err(IndexError::Closed)
        } else {
            Ok(())
        }
    }

    /// Flush and refuse further access
    pub fn close(&self) -> IndexResult<()> {
        if *self.inner.closed.read() {
            return Ok(());
        }
        self.flush()?;
        *self.inner.closed.write() = true;
        Ok(())
    }

    /// Add a node to cache, writing evicted dirty pages to disk.
    fn cache_node(&self, page_id: PageId, node: N, dirty: bool) -> IndexResult<()> {
        let mut cache = self.inner.cache.write();

        while !cache.contains(page_id) && cache.needs_eviction() {
            match cache.evict_oldest() {
                Some((evict_id, evict_node, evict_dirty)) => {
                    if evict_dirty {
                        self.inner.storage.write_page(evict_id, &evict_node)?;
                        self.inner.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }

        cache.insert(page_id, node, dirty);
        Ok(())
    }
}

impl<N> PageFile<N> for DiskPageFile<N>
where
    N: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn page_size(&self) -> usize {
        self.inner.storage.page_size()
    }

    fn read_node(&self, page_id: PageId) -> IndexResult<N> {
        self.check_closed()?;
        {
            let mut cache = self.inner.cache.write();
            if let Some(node) = cache.get(page_id) {
                self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(node.clone());
            }
        }

        if page_id == 0 || page_id >= self.inner.header.read().next_page_id {
            return Err(IndexError::PageNotFound(page_id));
        }

        self.inner.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.inner.stats.disk_reads.fetch_add(1, Ordering::Relaxed);
        let node: N = self.inner.storage.read_page(page_id)?;
        self.cache_node(page_id, node.clone(), false)?;
        Ok(node)
    }

    fn write_node(&self, page_id: PageId, node: N) -> IndexResult<()> {
        self.check_closed()?;
        self.cache_node(page_id, node, true)
    }

    /// Pops the free list chain, or appends a new page.
    fn allocate_id(&self) -> IndexResult<PageId> {
        self.check_closed()?;
        let mut header = self.inner.header.write();
        if header.free_list_head != 0 {
            let page_id = header.free_list_head;
            let free_page = self.inner.storage.read_free_page(page_id)?;
            header.free_list_head = free_page.next_free;
            header.free_page_count = header.free_page_count.saturating_sub(1);
            return Ok(page_id);
        }

        let page_id = header.next_page_id;
        header.next_page_id = header.next_page_id.saturating_add(1);
        Ok(page_id)
    }

    /// Links the page into the free list chain.
    fn free_id(&self, page_id: PageId) -> IndexResult<()> {
        self.check_closed()?;
        let mut header = self.inner.header.write();
        if page_id == 0 || page_id >= header.next_page_id {
            return Err(IndexError::PageNotFound(page_id));
        }

        self.inner.cache.write().remove(page_id);
        let free_page = FreePage {
            next_free: header.free_list_head,
        };
        self.inner.storage.write_free_page(page_id, &free_page)?;
        header.free_list_head = page_id;
        header.free_page_count = header.free_page_count.saturating_add(1);
        Ok(())
    }

    fn load_meta(&self) -> IndexResult<Option<TreeMeta>> {
        self.check_closed()?;
        Ok(self.inner.header.read().meta)
    }

    /// Updates the header in memory; it is written by `flush`.
    fn store_meta(&self, meta: &TreeMeta) -> IndexResult<()> {
        self.check_closed()?;
        self.inner.header.write().meta = Some(*meta);
        Ok(())
    }

    /// Flush all dirty pages and the header to disk
    fn flush(&self) -> IndexResult<()> {
        self.check_closed()?;
        let mut cache = self.inner.cache.write();
        for page_id in cache.dirty_pages() {
            if let Some(node) = cache.dirty_node(page_id) {
                self.inner.storage.write_page(page_id, node)?;
                self.inner.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
            }
            cache.mark_clean(page_id);
        }
        drop(cache);

        self.inner.storage.write_header(&self.inner.header.read())?;
        self.inner.storage.sync()?;
        Ok(())
    }

    fn stats(&self) -> PageFileStats {
        let header = self.inner.header.read();
        let stats = &self.inner.stats;
        PageFileStats {
            reads: stats.disk_reads.load(Ordering::Relaxed),
            writes: stats.disk_writes.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: stats.cache_misses.load(Ordering::Relaxed),
            cached_pages: self.inner.cache.read().len() as u64,
            allocated_pages: header
                .next_page_id
                .saturating_sub(1)
                .saturating_sub(header.free_page_count),
            free_pages: header.free_page_count,
        }
    }
}

impl<N: Serialize> Drop for DiskPageFileInner<N> {
    fn drop(&mut self) {
        // Best effort flush of pages still dirty when the last handle goes away
        if *self.closed.read() {
            return;
        }
        let cache = self.cache.get_mut();
        for page_id in cache.dirty_pages() {
            if let Some(node) = cache.dirty_node(page_id) {
                let _ = self.storage.write_page(page_id, node);
            }
        }
        let _ = self.storage.write_header(&self.header.read());
        let _ = self.storage.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.simt");

        {
            let pages: DiskPageFile<Vec<u64>> = DiskPageFile::create_with(&path, 256, 4).unwrap();
            let a = pages.allocate_id().unwrap();
            let b = pages.allocate_id().unwrap();
            pages.write_node(a, vec![1, 2]).unwrap();
            pages.write_node(b, vec![3]).unwrap();
            pages
                .store_meta(&TreeMeta {
                    root_page: a,
                    root_level: 0,
                    entry_count: 3,
                    leaf_capacity: 5,
                    directory_capacity: 5,
                })
                .unwrap();
            pages.close().unwrap();
            assert!(matches!(pages.read_node(a), Err(IndexError::Closed)));
        }

        let pages: DiskPageFile<Vec<u64>> = DiskPageFile::open(&path).unwrap();
        assert_eq!(pages.page_size(), 256);
        let stats = pages.stats();
        assert_eq!(stats.cached_pages, 0, "Should not preload any pages");

        let meta = pages.load_meta().unwrap().unwrap();
        assert_eq!(meta.entry_count, 3);
        assert_eq!(pages.read_node(meta.root_page).unwrap(), vec![1, 2]);
        assert_eq!(pages.read_node(2).unwrap(), vec![3]);

        let stats = pages.stats();
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.reads, 2);
        let _ = pages.read_node(2).unwrap();
        assert_eq!(pages.stats().cache_hits, 1);
    }

    #[test]
    fn test_eviction_writes_dirty_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.simt");
        let pages: DiskPageFile<u64> = DiskPageFile::create_with(&path, 128, 2).unwrap();

        for value in 0..10u64 {
            let id = pages.allocate_id().unwrap();
            pages.write_node(id, value * 10).unwrap();
        }
        let stats = pages.stats();
        assert!(stats.cached_pages <= 2, "Cache should be bounded");
        assert!(stats.writes >= 8, "Evicted pages are written");

        for id in 1..=10u64 {
            assert_eq!(pages.read_node(id).unwrap(), (id - 1) * 10);
        }
    }

    #[test]
    fn test_free_list_chain_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.simt");
        {
            let pages: DiskPageFile<u64> = DiskPageFile::create_with(&path, 128, 8).unwrap();
            for value in 0..4u64 {
                let id = pages.allocate_id().unwrap();
                pages.write_node(id, value).unwrap();
            }
            pages.free_id(2).unwrap();
            pages.free_id(3).unwrap();
            assert_eq!(pages.stats().free_pages, 2);
            pages.flush().unwrap();
        }

        let pages: DiskPageFile<u64> = DiskPageFile::open(&path).unwrap();
        assert_eq!(pages.stats().free_pages, 2);
        assert_eq!(pages.allocate_id().unwrap(), 3);
        assert_eq!(pages.allocate_id().unwrap(), 2);
        assert_eq!(pages.allocate_id().unwrap(), 5);
        assert_eq!(pages.stats().free_pages, 0);
    }

    #[test]
    fn test_unknown_pages_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.simt");
        let pages: DiskPageFile<u64> = DiskPageFile::create(&path).unwrap();
        assert!(matches!(pages.read_node(0), Err(IndexError::PageNotFound(0))));
        assert!(matches!(pages.read_node(5), Err(IndexError::PageNotFound(5))));
        assert!(pages.free_id(5).is_err());
    }

    #[test]
    fn test_page_size_too_small() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.simt");
        assert!(matches!(
            DiskPageFile::<u64>::create_with(&path, 16, 8),
            Err(IndexError::Configuration(_))
        ));
    }
}
