//! M-tree integration tests.

mod mtree_test;
mod string_mtree_test;
