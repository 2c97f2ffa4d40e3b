use simtree::distance::{EuclideanDistance, ManhattanDistance};
use simtree::{
    Distance, Distribution, IndexError, MTreeBuilder, OverflowTreatment, Promotion, ReinsertVariant,
};
use simtree_int_test::test_util::{
    assert_same_results, brute_force_knn, brute_force_range, cleanup,
    create_clustered_context, create_test_context, create_test_context_with, run_test, shuffled,
};

#[test]
fn test_mtree_knn_matches_linear_scan() {
    run_test(
        || create_test_context(),
        |ctx| {
            let query = vec![500.0, 500.0];
            let expected = brute_force_knn(
                ctx.relation().as_ref(),
                ctx.ids(),
                &EuclideanDistance,
                &query,
                10,
            )?;

            for promotion in [
                Promotion::MinMaxRadius,
                Promotion::MaxLowerBoundDistance,
                Promotion::FarthestPoints,
            ] {
                for distribution in [Distribution::GeneralizedHyperplane, Distribution::Balanced] {
                    let mut tree = MTreeBuilder::<Vec<f64>>::new(EuclideanDistance)
                        .capacity(10)
                        .promotion(promotion)
                        .distribution(distribution)
                        .build_in_memory(ctx.relation())?;
                    tree.insert_all(ctx.ids())?;
                    tree.integrity_check()?;

                    let knn = tree.knn(&query, 10)?;
                    assert_same_results(&knn.into_vec(), &expected);
                }
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_mtree_knn_for_more_neighbors_than_stored_fails() {
    run_test(
        || create_test_context_with(5, 2, 3),
        |ctx| {
            let mut tree =
                MTreeBuilder::<Vec<f64>>::new(EuclideanDistance).build_in_memory(ctx.relation())?;
            assert!(matches!(
                tree.knn(&vec![0.0, 0.0], 1),
                Err(IndexError::InvalidArgument(_))
            ));

            tree.insert_all(ctx.ids())?;
            let query = vec![500.0, 500.0];
            assert!(matches!(
                tree.knn(&query, 10),
                Err(IndexError::InvalidArgument(_))
            ));
            assert_eq!(tree.knn(&query, 5)?.size(), 5);
            assert_eq!(tree.stats().knn_queries, 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_mtree_range_with_manhattan_distance() {
    run_test(
        || create_clustered_context(6, 80, 17),
        |ctx| {
            let mut tree = MTreeBuilder::<Vec<f64>>::new(ManhattanDistance)
                .capacity(12)
                .overflow_treatment(OverflowTreatment::LimitedReinsert {
                    fraction: 0.3,
                    variant: ReinsertVariant::Close,
                })
                .build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            let query = ctx.point(ctx.ids()[100])?;
            for radius in [0.0, 3.0, 12.0, 400.0] {
                let expected = brute_force_range(
                    ctx.relation().as_ref(),
                    ctx.ids(),
                    &ManhattanDistance,
                    &query,
                    radius,
                )?;
                assert_same_results(&tree.range(&query, radius)?, &expected);
            }
            let all = tree.range(&query, f64::INFINITY)?;
            assert_eq!(all.len(), ctx.ids().len());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_mtree_delete_everything_in_random_order() {
    run_test(
        || create_test_context_with(250, 2, 19),
        |ctx| {
            let mut tree = MTreeBuilder::<Vec<f64>>::new(EuclideanDistance)
                .capacity(8)
                .build(ctx.relation(), ctx.file("mtree-delete.simt"))?;
            tree.insert_all(ctx.ids())?;

            let order = shuffled(ctx.ids(), 23);
            for (deleted, id) in order.iter().enumerate() {
                tree.delete(*id)?;
                let report = tree.integrity_check()?;
                assert_eq!(report.entries, (order.len() - deleted - 1) as u64);

                // queries stay exact while routing objects leave the tree
                if deleted % 50 == 0 {
                    let remaining = &order[deleted + 1..];
                    let query = vec![400.0, 400.0];
                    let expected = brute_force_knn(
                        ctx.relation().as_ref(),
                        remaining,
                        &EuclideanDistance,
                        &query,
                        5,
                    )?;
                    assert_same_results(&tree.knn(&query, 5)?.into_vec(), &expected);
                }
            }

            assert_eq!(tree.height(), 0);
            assert!(tree.read_node(tree.root_page())?.is_empty());
            assert!(matches!(
                tree.delete(order[0]),
                Err(IndexError::ObjectNotFound(_))
            ));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_mtree_priority_search() {
    run_test(
        || create_test_context_with(800, 4, 29),
        |ctx| {
            let mut tree = MTreeBuilder::<Vec<f64>>::new(EuclideanDistance)
                .page_size(1024)
                .build_in_memory(ctx.relation())?;
            tree.insert_all(ctx.ids())?;

            let query = ctx.point(ctx.ids()[5])?;
            let exact = tree
                .priority_search(query.clone())?
                .take(50)
                .collect::<Result<Vec<_>, _>>()?;
            let expected = brute_force_knn(
                ctx.relation().as_ref(),
                ctx.ids(),
                &EuclideanDistance,
                &query,
                50,
            )?;
            assert_same_results(&exact, &expected);

            // lower bounds never exceed the exact distance and come sorted
            let mut cheap = tree.priority_search_cheap(query.clone())?;
            assert!(cheap.is_cheap());
            let mut previous = 0.0;
            let mut seen = 0;
            while cheap.valid() {
                let bound = cheap.current()?;
                let object = ctx.point(bound.id)?;
                let actual = EuclideanDistance.distance(&query, &object);
                assert!(bound.distance <= actual + 1e-9);
                assert!(bound.distance >= previous);
                previous = bound.distance;
                seen += 1;
                cheap.advance()?;
            }
            assert_eq!(seen, ctx.ids().len());
            assert!(matches!(cheap.advance(), Err(IndexError::SearchExhausted)));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_mtree_disk_reopen() {
    run_test(
        || create_test_context_with(500, 3, 37),
        |ctx| {
            let builder = MTreeBuilder::<Vec<f64>>::new(EuclideanDistance)
                .capacity(16)
                .promotion(Promotion::MaxLowerBoundDistance);
            let query = vec![10.0, 20.0, 30.0];
            let before = {
                let mut tree = builder.build(ctx.relation(), ctx.file("mtree.simt"))?;
                tree.insert_all(ctx.ids())?;
                tree.flush()?;
                tree.range(&query, 250.0)?
            };

            let tree = builder.open(ctx.relation(), ctx.file("mtree.simt"))?;
            tree.integrity_check()?;
            assert_eq!(tree.size(), 500);
            assert_eq!(tree.range(&query, 250.0)?, before);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
