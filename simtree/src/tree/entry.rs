//! Entries and nodes, the unit of page storage.

use serde::{Deserialize, Serialize};

use super::tree_types::{ObjectId, PageId};

// ============================================================================
// Entry Types
// ============================================================================

/// An entry in a leaf node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry<L> {
    pub id: ObjectId,
    pub data: L,
}

/// A child reference in a directory node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry<R> {
    pub child: PageId,
    pub region: R,
}

/// Entry stored in a node: either an object or a child reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry<L, R> {
    Leaf(LeafEntry<L>),
    Directory(DirectoryEntry<R>),
}

impl<L, R> Entry<L, R> {
    pub fn leaf(id: ObjectId, data: L) -> Self {
        Entry::Leaf(LeafEntry { id, data })
    }

    pub fn directory(child: PageId, region: R) -> Self {
        Entry::Directory(DirectoryEntry { child, region })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Entry::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafEntry<L>> {
        match self {
            Entry::Leaf(leaf) => Some(leaf),
            Entry::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryEntry<R>> {
        match self {
            Entry::Directory(dir) => Some(dir),
            Entry::Leaf(_) => None,
        }
    }
}

// ============================================================================
// Node Type
// ============================================================================

/// Node of the tree.
///
/// Leaves are at level 0 and hold leaf entries only; a directory node at
/// level `l` holds directory entries whose children are at level `l - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<L, R> {
    pub level: u32,
    pub entries: Vec<Entry<L, R>>,
}

impl<L, R> Node<L, R> {
    pub fn new(level: u32, entries: Vec<Entry<L, R>>) -> Self {
        Self { level, entries }
    }

    pub fn empty_leaf() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Child pages referenced by a directory node
    pub fn children(&self) -> impl Iterator<Item = PageId> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.as_directory().map(|d| d.child))
    }
}
