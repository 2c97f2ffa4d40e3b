//! Root-to-node paths and per-insert reinsertion state.

use super::tree_types::PageId;

/// One step of a path: a node and the index of an entry inside it.
///
/// For every step but the last, `entry_index` is the directory entry
/// leading to the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub node_id: PageId,
    pub entry_index: usize,
}

/// Ordered steps from the root down to a node. Replaces parent pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTreePath {
    steps: Vec<PathStep>,
}

impl IndexTreePath {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn push(&mut self, node_id: PageId, entry_index: usize) {
        self.steps.push(PathStep {
            node_id,
            entry_index,
        });
    }

    pub fn pop(&mut self) -> Option<PathStep> {
        self.steps.pop()
    }

    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// Step of the parent of the last node
    pub fn parent(&self) -> Option<&PathStep> {
        self.steps.len().checked_sub(2).map(|i| &self.steps[i])
    }

    pub fn set_last_index(&mut self, entry_index: usize) {
        if let Some(step) = self.steps.last_mut() {
            step.entry_index = entry_index;
        }
    }

    /// Depth of the last node, the root being at depth 1
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// True if the last node is the root
    pub fn is_root(&self) -> bool {
        self.steps.len() == 1
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }
}

/// Levels at which forced reinsertion already happened during one
/// top-level insert. Indexed by level, leaves being level 0.
#[derive(Debug, Clone, Default)]
pub struct ReinsertionState {
    attempted: Vec<bool>,
}

impl ReinsertionState {
    pub fn new() -> Self {
        Self {
            attempted: Vec::new(),
        }
    }

    /// Marks `level` and returns true if it was not marked before.
    pub fn try_mark(&mut self, level: u32) -> bool {
        let level = level as usize;
        if self.attempted.len() <= level {
            self.attempted.resize(level + 1, false);
        }
        !std::mem::replace(&mut self.attempted[level], true)
    }

    pub fn is_marked(&self, level: u32) -> bool {
        self.attempted.get(level as usize).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_navigation() {
        let mut path = IndexTreePath::new();
        path.push(1, 2);
        assert!(path.is_root());
        assert!(path.parent().is_none());

        path.push(5, 0);
        assert_eq!(path.depth(), 2);
        assert_eq!(path.parent().map(|s| s.node_id), Some(1));

        path.set_last_index(3);
        assert_eq!(path.last().map(|s| s.entry_index), Some(3));

        assert_eq!(path.pop().map(|s| s.node_id), Some(5));
        assert!(path.is_root());
    }

    #[test]
    fn test_reinsertion_state_marks_once() {
        let mut state = ReinsertionState::new();
        assert!(!state.is_marked(2));
        assert!(state.try_mark(2));
        assert!(!state.try_mark(2));
        assert!(state.is_marked(2));
        assert!(!state.is_marked(0));
        assert!(state.try_mark(0));
    }
}
