use simtree::distance::EuclideanDistance;
use simtree::{
    IndexError, MemoryRelation, OverflowTreatment, RStarTreeBuilder, ReinsertVariant,
    SplitStrategy,
};
use simtree_int_test::test_util::{
    assert_same_results, brute_force_knn, brute_force_range, cleanup,
    create_clustered_context, create_test_context, create_test_context_with, run_test, shuffled,
};
use std::sync::Arc;

#[test]
fn test_single_split_of_full_root() {
    run_test(
        || create_test_context_with(0, 2, 1),
        |ctx| {
            let relation = Arc::new(MemoryRelation::new());
            let ids = relation.add_all(vec![
                vec![1.0, 1.0],
                vec![1.5, 1.2],
                vec![1.2, 1.8],
                vec![1.9, 1.4],
                vec![90.0, 95.0],
            ]);
            let mut tree = RStarTreeBuilder::new(2)
                .capacity(4)
                .build(relation, ctx.file("split.simt"))?;

            tree.insert_all(&ids[..4])?;
            assert_eq!(tree.height(), 1);
            assert_eq!(tree.stats().splits, 0);

            tree.insert(ids[4])?;
            assert_eq!(tree.stats().splits, 1);
            assert_eq!(tree.height(), 2);

            let report = tree.integrity_check()?;
            assert_eq!(report.entries, 5);
            assert_eq!(report.leaf_nodes, 2);
            assert_eq!(report.directory_nodes, 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_knn_for_more_neighbors_than_stored_fails() {
    run_test(
        || create_test_context_with(5, 2, 3),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2).build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;
            assert_eq!(tree.size(), 5);

            let query = vec![500.0, 500.0];
            assert!(matches!(
                tree.knn(&query, 10),
                Err(IndexError::InvalidArgument(_))
            ));
            assert!(matches!(
                tree.knn_by_id(ctx.ids()[0], 6),
                Err(IndexError::InvalidArgument(_))
            ));
            assert_eq!(tree.knn(&query, 5)?.size(), 5);

            tree.delete(ctx.ids()[4])?;
            assert!(matches!(
                tree.knn(&query, 5),
                Err(IndexError::InvalidArgument(_))
            ));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_knn_matches_linear_scan() {
    run_test(
        || create_test_context(),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2).build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;
            assert_eq!(tree.size(), 600);

            let query = vec![500.0, 500.0];
            let knn = tree.knn(&query, 10)?;
            let expected = brute_force_knn(
                ctx.relation().as_ref(),
                ctx.ids(),
                &EuclideanDistance,
                &query,
                10,
            )?;
            assert_eq!(knn.size(), 10);
            assert_same_results(&knn.into_vec(), &expected);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_limited_reinsertion_keeps_minimum_fill() {
    run_test(
        || create_test_context_with(1000, 2, 7),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2)
                .capacity(12)
                .overflow_treatment(OverflowTreatment::LimitedReinsert {
                    fraction: 0.3,
                    variant: ReinsertVariant::Close,
                })
                .build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            // fails on any node below the minimum fill
            let report = tree.integrity_check()?;
            assert_eq!(report.entries, 1000);

            let stats = tree.stats();
            assert!(stats.reinsertions > 0);
            assert!(stats.reinsertions <= stats.height as u64 * 1000);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_everything_in_random_order() {
    run_test(
        || create_test_context_with(300, 2, 11),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2)
                .capacity(8)
                .build(ctx.relation(), ctx.file("delete.simt"))?;
            tree.insert_all(ctx.ids())?;

            for (deleted, id) in shuffled(ctx.ids(), 3).into_iter().enumerate() {
                tree.delete(id)?;
                assert!(!tree.contains_object(id)?);
                let report = tree.integrity_check()?;
                assert_eq!(report.entries, (ctx.ids().len() - deleted - 1) as u64);
            }

            assert!(tree.is_empty());
            assert_eq!(tree.height(), 0);
            assert!(tree.read_node(tree.root_page())?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_unbounded_range_returns_everything() {
    run_test(
        || create_test_context(),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2).build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            let all = tree.range(&vec![0.0, 0.0], f64::INFINITY)?;
            assert_eq!(all.len(), ctx.ids().len());
            assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_range_is_prefix_of_full_knn() {
    run_test(
        || create_test_context(),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2).build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            let query = vec![250.0, 750.0];
            let everything = tree.knn(&query, ctx.ids().len())?;
            for radius in [0.0, 10.0, 75.0, 300.0] {
                let range = tree.range(&query, radius)?;
                let expected = brute_force_range(
                    ctx.relation().as_ref(),
                    ctx.ids(),
                    &EuclideanDistance,
                    &query,
                    radius,
                )?;
                assert_same_results(&range, &expected);
                assert!(range.iter().all(|r| everything.contains(r.id)));
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_queries_are_repeatable() {
    run_test(
        || create_clustered_context(8, 50, 5),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2)
                .capacity(10)
                .build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            let query = ctx.point(ctx.ids()[17])?;
            assert_eq!(tree.knn(&query, 25)?, tree.knn(&query, 25)?);
            assert_eq!(tree.range(&query, 8.0)?, tree.range(&query, 8.0)?);
            // the query object is its own nearest neighbor
            let nearest = tree.knn_by_id(ctx.ids()[17], 1)?;
            assert_eq!(nearest.get(0).map(|r| r.distance), Some(0.0));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_priority_search_visits_all_in_order() {
    run_test(
        || create_test_context(),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2)
                .split_strategy(SplitStrategy::Quadratic)
                .build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            let query = vec![123.0, 456.0];
            let results = tree
                .priority_search(query.clone())?
                .collect::<Result<Vec<_>, _>>()?;
            let expected = brute_force_range(
                ctx.relation().as_ref(),
                ctx.ids(),
                &EuclideanDistance,
                &query,
                f64::INFINITY,
            )?;
            assert_same_results(&results, &expected);
            assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_priority_search_cutoff() {
    run_test(
        || create_test_context(),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2).build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            let query = vec![600.0, 300.0];
            let mut searcher = tree.priority_search(query.clone())?;
            assert!(searcher.valid());
            let first = searcher.current()?;
            searcher.advance()?;
            searcher.decrease_cutoff(50.0);
            // a larger cutoff is ignored
            searcher.decrease_cutoff(500.0);
            assert_eq!(searcher.cutoff(), 50.0);

            let mut found = vec![first];
            for result in searcher {
                found.push(result?);
            }
            let within = brute_force_range(
                ctx.relation().as_ref(),
                ctx.ids(),
                &EuclideanDistance,
                &query,
                50.0,
            )?;
            // the second result was positioned before the cutoff shrank
            assert!(found.iter().skip(2).all(|r| r.distance <= 50.0));
            assert!(within.iter().all(|w| found.iter().any(|r| r.id == w.id)));
            assert!(found.len() <= within.len() + 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_disk_tree_survives_reopen() {
    run_test(
        || create_test_context_with(400, 3, 13),
        |ctx| {
            let builder = RStarTreeBuilder::new(3).page_size(1024).cache_pages(16);
            let query = vec![100.0, 900.0, 500.0];
            let before = {
                let mut tree = builder.build(ctx.relation(), ctx.file("reopen.simt"))?;
                tree.insert_all(ctx.ids())?;
                tree.flush()?;
                tree.knn(&query, 15)?
            };

            let mut tree = builder.open(ctx.relation(), ctx.file("reopen.simt"))?;
            assert_eq!(tree.size(), 400);
            tree.integrity_check()?;
            assert_eq!(tree.knn(&query, 15)?, before);

            tree.delete(ctx.ids()[0])?;
            tree.integrity_check()?;
            assert_eq!(tree.size(), 399);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
