use simtree::distance::EuclideanDistance;
use simtree::{BulkSplitStrategy, IndexError, RStarTreeBuilder};
use simtree_int_test::test_util::{
    assert_same_results, brute_force_knn, cleanup, create_clustered_context,
    create_test_context_with, run_test, shuffled,
};

#[test]
fn test_bulk_loaded_trees_answer_like_linear_scan() {
    run_test(
        || create_test_context_with(2000, 2, 21),
        |ctx| {
            let query = vec![333.0, 666.0];
            let expected = brute_force_knn(
                ctx.relation().as_ref(),
                ctx.ids(),
                &EuclideanDistance,
                &query,
                20,
            )?;

            for strategy in [
                BulkSplitStrategy::SortTileRecursive,
                BulkSplitStrategy::OneDimSort,
                BulkSplitStrategy::MaxExtension,
                BulkSplitStrategy::Hilbert,
                BulkSplitStrategy::ZCurve,
            ] {
                let mut tree = RStarTreeBuilder::new(2)
                    .capacity(16)
                    .bulk_load(strategy)
                    .build_in_memory(ctx.relation())?;
                tree.insert_all(ctx.ids())?;

                let report = tree.integrity_check()?;
                assert_eq!(report.entries, 2000, "{:?}", strategy);
                assert_eq!(tree.stats().splits, 0, "{:?}", strategy);
                assert_same_results(&tree.knn(&query, 20)?.into_vec(), &expected);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_bulk_loaded_disk_tree_accepts_updates() {
    run_test(
        || create_clustered_context(10, 60, 8),
        |ctx| {
            let (initial, later) = ctx.ids().split_at(400);
            let builder = RStarTreeBuilder::new(2)
                .capacity(12)
                .bulk_load(BulkSplitStrategy::Hilbert);
            let mut tree = builder.build(ctx.relation(), ctx.file("bulk.simt"))?;
            tree.insert_all(initial)?;
            // later batches use regular insertion
            tree.insert_all(later)?;
            tree.integrity_check()?;
            assert_eq!(tree.size(), 600);

            for id in shuffled(initial, 9).into_iter().take(200) {
                tree.delete(id)?;
            }
            tree.integrity_check()?;
            assert_eq!(tree.size(), 400);

            let query = ctx.point(later[0])?;
            let remaining: Vec<_> = ctx
                .ids()
                .iter()
                .copied()
                .filter(|&id| tree.contains_object(id).unwrap_or(false))
                .collect();
            assert_eq!(remaining.len(), 400);
            let expected = brute_force_knn(
                ctx.relation().as_ref(),
                &remaining,
                &EuclideanDistance,
                &query,
                12,
            )?;
            assert_same_results(&tree.knn(&query, 12)?.into_vec(), &expected);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_bulk_load_of_non_empty_tree_is_rejected() {
    run_test(
        || create_test_context_with(100, 2, 4),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2)
                .capacity(8)
                .build_in_memory(ctx.relation())?;
            tree.insert(ctx.ids()[0])?;
            let result = tree.bulk_load(&ctx.ids()[1..]);
            assert!(matches!(result, Err(IndexError::InvalidArgument(_))));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
