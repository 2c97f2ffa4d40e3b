//! LRU cache for node pages of a disk page file.
//!
//! Pages are only loaded from disk when first accessed. Dirty pages stay in
//! the cache until they are evicted or flushed.

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::tree::tree_types::PageId;

/// A cached page with its data and dirty flag
pub struct CachedPage<N> {
    pub node: N,
    pub dirty: bool,
}

/// LRU cache of pages
pub struct PageCache<N> {
    pages: HashMap<PageId, CachedPage<N>>,
    /// LRU order (front = oldest, back = newest)
    lru_order: VecDeque<PageId>,
    max_pages: usize,
}

impl<N> PageCache<N> {
    pub fn new(max_pages: usize) -> Self {
        Self {
            pages: HashMap::new(),
            lru_order: VecDeque::new(),
            max_pages: max_pages.max(1),
        }
    }

    fn touch(&mut self, page_id: PageId) {
        self.lru_order.retain(|&id| id != page_id);
        self.lru_order.push_back(page_id);
    }

    /// Get a page from cache, updating LRU order.
    /// Returns None if the page must be loaded from disk.
    pub fn get(&mut self, page_id: PageId) -> Option<&N> {
        if !self.pages.contains_key(&page_id) {
            return None;
        }
        self.touch(page_id);
        self.pages.get(&page_id).map(|cached| &cached.node)
    }

    /// Insert a page (after loading from disk or writing)
    pub fn insert(&mut self, page_id: PageId, node: N, dirty: bool) {
        self.touch(page_id);
        let dirty = dirty
            || self
                .pages
                .get(&page_id)
                .map(|cached| cached.dirty)
                .unwrap_or(false);
        self.pages.insert(page_id, CachedPage { node, dirty });
    }

    /// True if another page cannot be added without eviction
    pub fn needs_eviction(&self) -> bool {
        self.pages.len() >= self.max_pages
    }

    /// Removes the least recently used page (page_id, node, dirty flag)
    pub fn evict_oldest(&mut self) -> Option<(PageId, N, bool)> {
        while let Some(page_id) = self.lru_order.pop_front() {
            if let Some(cached) = self.pages.remove(&page_id) {
                return Some((page_id, cached.node, cached.dirty));
            }
        }
        None
    }

    pub fn dirty_pages(&self) -> Vec<PageId> {
        self.pages
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Dirty page content, for flushing
    pub fn dirty_node(&self, page_id: PageId) -> Option<&N> {
        self.pages
            .get(&page_id)
            .filter(|cached| cached.dirty)
            .map(|cached| &cached.node)
    }

    pub fn mark_clean(&mut self, page_id: PageId) {
        if let Some(cached) = self.pages.get_mut(&page_id) {
            cached.dirty = false;
        }
    }

    /// Drops a page without writing it back
    pub fn remove(&mut self, page_id: PageId) -> Option<(N, bool)> {
        self.lru_order.retain(|&id| id != page_id);
        self.pages.remove(&page_id).map(|c| (c.node, c.dirty))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        self.pages.get(&page_id).map(|c| c.dirty).unwrap_or(false)
    }
}
