use simtree::distance::LevenshteinDistance;
use simtree::{MTreeBuilder, MemoryRelation, Promotion};
use simtree_int_test::test_util::{
    assert_same_results, brute_force_knn, brute_force_range, cleanup, create_test_context_with,
    random_words, run_test,
};
use std::sync::Arc;

#[test]
fn test_string_tree_answers_edit_distance_queries() {
    run_test(
        || create_test_context_with(0, 1, 0),
        |ctx| {
            let relation = Arc::new(MemoryRelation::new());
            let ids = relation.add_all(random_words(700, 47));
            let mut tree = MTreeBuilder::<String>::new(LevenshteinDistance)
                .page_size(2048)
                .promotion(Promotion::FarthestPoints)
                .build(relation.clone(), ctx.file("words.simt"))?;
            tree.insert_all(&ids)?;
            tree.integrity_check()?;

            for query in ["abc", "hgfedcba", "aaaa"] {
                let query = query.to_string();
                for radius in [0.0, 1.0, 2.0] {
                    let expected = brute_force_range(
                        relation.as_ref(),
                        &ids,
                        &LevenshteinDistance,
                        &query,
                        radius,
                    )?;
                    assert_same_results(&tree.range(&query, radius)?, &expected);
                }

                // integer distances tie a lot, the k-th ties are all kept
                let knn = tree.knn(&query, 7)?;
                let expected =
                    brute_force_knn(relation.as_ref(), &ids, &LevenshteinDistance, &query, 7)?;
                assert!(knn.size() >= 7);
                assert_same_results(&knn.into_vec(), &expected);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_string_tree_survives_deletes_of_routing_objects() {
    run_test(
        || create_test_context_with(0, 1, 0),
        |ctx| {
            let relation = Arc::new(MemoryRelation::new());
            let ids = relation.add_all(random_words(300, 53));
            let mut tree = MTreeBuilder::<String>::new(LevenshteinDistance)
                .capacity(6)
                .build_in_memory(relation.clone())?;
            tree.insert_all(&ids)?;

            let (deleted, kept) = ids.split_at(150);
            for id in deleted {
                tree.delete(*id)?;
            }
            tree.integrity_check()?;
            assert_eq!(tree.size(), 150);

            let query = "badcafe".to_string();
            let expected =
                brute_force_range(relation.as_ref(), kept, &LevenshteinDistance, &query, 3.0)?;
            assert_same_results(&tree.range(&query, 3.0)?, &expected);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
