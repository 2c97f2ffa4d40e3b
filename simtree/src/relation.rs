//! Relation collaborator: maps object ids to objects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::tree::tree_types::{IndexError, IndexResult, ObjectId};

/// Object lookup used to build leaf entries and to refine distances.
///
/// Metric trees keep object ids of routing objects in their directory
/// entries, so a relation must keep returning an object as long as any
/// tree built over it may still reference the id.
pub trait Relation<O>: Send + Sync {
    fn get(&self, id: ObjectId) -> IndexResult<O>;
}

/// A relation held in memory. Ids are assigned from 1 upwards.
pub struct MemoryRelation<O> {
    objects: RwLock<HashMap<ObjectId, O>>,
    next_id: AtomicU64,
}

impl<O> Default for MemoryRelation<O> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<O> MemoryRelation<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object under a fresh id
    pub fn add(&self, object: O) -> ObjectId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.objects.write().insert(id, object);
        id
    }

    /// Stores all objects, returning their ids in order
    pub fn add_all(&self, objects: impl IntoIterator<Item = O>) -> Vec<ObjectId> {
        objects.into_iter().map(|o| self.add(o)).collect()
    }

    /// Stores an object under an explicit id, replacing any previous one
    pub fn insert(&self, id: ObjectId, object: O) -> Option<O> {
        self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
        self.objects.write().insert(id, object)
    }

    pub fn remove(&self, id: ObjectId) -> Option<O> {
        self.objects.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// All ids in ascending order
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.objects.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<O: Clone + Send + Sync> Relation<O> for MemoryRelation<O> {
    fn get(&self, id: ObjectId) -> IndexResult<O> {
        self.objects
            .read()
            .get(&id)
            .cloned()
            .ok_or(IndexError::ObjectNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let relation = MemoryRelation::new();
        let a = relation.add(vec![1.0, 2.0]);
        let b = relation.add(vec![3.0, 4.0]);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(relation.get(b).unwrap(), vec![3.0, 4.0]);
        assert!(matches!(relation.get(9), Err(IndexError::ObjectNotFound(9))));
        assert_eq!(relation.len(), 2);
    }

    #[test]
    fn test_explicit_ids_advance_counter() {
        let relation = MemoryRelation::new();
        assert!(relation.insert(10, "ten".to_string()).is_none());
        assert_eq!(relation.add("eleven".to_string()), 11);
        assert_eq!(relation.ids(), vec![10, 11]);
        assert_eq!(relation.remove(10).as_deref(), Some("ten"));
        assert!(relation.get(10).is_err());
    }
}
