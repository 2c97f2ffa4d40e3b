use simtree::distance::EuclideanDistance;
use simtree::RStarTreeBuilder;
use simtree_int_test::test_util::{
    assert_same_results, brute_force_knn, cleanup, create_test_context_with, random_points,
    run_test,
};
use std::sync::Barrier;
use std::thread;

#[test]
fn test_concurrent_readers_share_a_tree() {
    run_test(
        || create_test_context_with(3000, 2, 31),
        |ctx| {
            let mut tree = RStarTreeBuilder::new(2)
                .cache_pages(8)
                .build(ctx.relation(), ctx.file("shared.simt"))?;
            tree.insert_all(ctx.ids())?;
            tree.flush()?;

            let num_threads = 4;
            let queries = random_points(num_threads * 5, 2, 77);
            let barrier = Barrier::new(num_threads);
            let tree = &tree;

            let answers = thread::scope(|scope| {
                let handles: Vec<_> = queries
                    .chunks(5)
                    .map(|chunk| {
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            chunk
                                .iter()
                                .map(|q| tree.knn(q, 8).map(|knn| (q.clone(), knn)))
                                .collect::<Result<Vec<_>, _>>()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("reader thread panicked"))
                    .collect::<Vec<_>>()
            });

            for answer in answers {
                for (query, knn) in answer? {
                    let expected = brute_force_knn(
                        ctx.relation().as_ref(),
                        ctx.ids(),
                        &EuclideanDistance,
                        &query,
                        8,
                    )?;
                    assert_same_results(&knn.into_vec(), &expected);
                }
            }
            assert_eq!(tree.stats().knn_queries, (num_threads * 5) as u64);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
