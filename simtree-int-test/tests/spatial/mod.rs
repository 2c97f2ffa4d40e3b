//! R*-tree integration tests.
//!
//! These tests drive whole trees through insertion, deletion and every
//! query kind and compare the answers with a linear scan.

mod bulk_load_test;
mod concurrent_query_test;
mod rstar_tree_test;
