use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use simtree::distance::Distance;
use simtree::{DistanceResult, IndexResult, MemoryRelation, ObjectId, Relation};
use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs, thread};
use uuid::Uuid;

/// Tolerance used when comparing tree distances with a linear scan
pub const DISTANCE_TOLERANCE: f64 = 1e-9;

/// Seed of the shared synthetic dataset
pub const DATASET_SEED: u64 = 42;

/// Runs a test between a setup and a teardown step.
/// Disk based tests may hit transient file system errors, so a failed run is
/// retried before the test is reported as failed.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> IndexResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> IndexResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> IndexResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 2;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        let message = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_backtrace = Some(bt);
                e
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_backtrace = Some(Backtrace::capture().to_string());
                format!("Panic: {}", err_msg)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", message);
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(message);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A synthetic vector dataset plus a scratch directory for page files
#[derive(Clone)]
pub struct TestContext {
    path: PathBuf,
    relation: Arc<MemoryRelation<Vec<f64>>>,
    ids: Vec<ObjectId>,
}

impl TestContext {
    pub fn new(path: PathBuf, relation: Arc<MemoryRelation<Vec<f64>>>, ids: Vec<ObjectId>) -> Self {
        Self {
            path,
            relation,
            ids,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A page file location inside the scratch directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn relation(&self) -> Arc<MemoryRelation<Vec<f64>>> {
        self.relation.clone()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn point(&self, id: ObjectId) -> IndexResult<Vec<f64>> {
        self.relation.get(id)
    }
}

pub fn random_path() -> PathBuf {
    env::temp_dir().join(format!("simtree_{}", Uuid::new_v4()))
}

/// Context over the shared 600 point two-dimensional dataset
pub fn create_test_context() -> IndexResult<TestContext> {
    create_test_context_with(600, 2, DATASET_SEED)
}

pub fn create_test_context_with(size: usize, dimensionality: usize, seed: u64) -> IndexResult<TestContext> {
    let path = random_path();
    fs::create_dir_all(&path)?;

    let relation = Arc::new(MemoryRelation::new());
    let ids = relation.add_all(random_points(size, dimensionality, seed));
    Ok(TestContext::new(path, relation, ids))
}

/// Context over points gathered in a few dense clusters
pub fn create_clustered_context(clusters: usize, per_cluster: usize, seed: u64) -> IndexResult<TestContext> {
    let path = random_path();
    fs::create_dir_all(&path)?;

    let relation = Arc::new(MemoryRelation::new());
    let ids = relation.add_all(clustered_points(clusters, per_cluster, 2, seed));
    Ok(TestContext::new(path, relation, ids))
}

pub fn cleanup(ctx: TestContext) -> IndexResult<()> {
    let max_retries = 5;
    for retry in 0..max_retries {
        if !ctx.path().exists() {
            return Ok(());
        }
        match fs::remove_dir_all(ctx.path()) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if retry == max_retries - 1 => {
                // Temp files are left to the OS
                eprintln!(
                    "Warning: Failed to remove test directory {:?} after {} attempts: {:?}",
                    ctx.path(),
                    max_retries,
                    e
                );
            }
            Err(_) => thread::sleep(Duration::from_millis(50 * (retry as u64 + 1))),
        }
    }
    Ok(())
}

/// Uniform points in `[0, 1000)` per dimension
pub fn random_points(count: usize, dimensionality: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            (0..dimensionality)
                .map(|_| rng.random_range(0.0..1000.0))
                .collect()
        })
        .collect()
}

pub fn clustered_points(clusters: usize, per_cluster: usize, dimensionality: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(clusters * per_cluster);
    for _ in 0..clusters {
        let center: Vec<f64> = (0..dimensionality)
            .map(|_| rng.random_range(0.0..1000.0))
            .collect();
        for _ in 0..per_cluster {
            points.push(
                center
                    .iter()
                    .map(|c| c + rng.random_range(-5.0..5.0))
                    .collect(),
            );
        }
    }
    points
}

pub fn random_words(count: usize, seed: u64) -> Vec<String> {
    const ALPHABET: &[u8] = b"abcdefgh";
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.random_range(3..9);
            (0..len)
                .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
                .collect()
        })
        .collect()
}

pub fn shuffled(ids: &[ObjectId], seed: u64) -> Vec<ObjectId> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids = ids.to_vec();
    ids.shuffle(&mut rng);
    ids
}

/// All objects within `radius` of `query` by linear scan, sorted by distance
pub fn brute_force_range<O, R, D>(
    relation: &R,
    ids: &[ObjectId],
    distance: &D,
    query: &O,
    radius: f64,
) -> IndexResult<Vec<DistanceResult>>
where
    R: Relation<O> + ?Sized,
    D: Distance<O> + ?Sized,
{
    let mut results = scan(relation, ids, distance, query)?;
    results.retain(|r| r.distance <= radius);
    Ok(results)
}

/// The `k` nearest objects by linear scan, objects tied with the k-th
/// distance included
pub fn brute_force_knn<O, R, D>(
    relation: &R,
    ids: &[ObjectId],
    distance: &D,
    query: &O,
    k: usize,
) -> IndexResult<Vec<DistanceResult>>
where
    R: Relation<O> + ?Sized,
    D: Distance<O> + ?Sized,
{
    let mut results = scan(relation, ids, distance, query)?;
    if k == 0 {
        return Ok(Vec::new());
    }
    if let Some(kth) = results.get(k - 1).map(|r| r.distance) {
        results.retain(|r| r.distance <= kth);
    }
    Ok(results)
}

fn scan<O, R, D>(relation: &R, ids: &[ObjectId], distance: &D, query: &O) -> IndexResult<Vec<DistanceResult>>
where
    R: Relation<O> + ?Sized,
    D: Distance<O> + ?Sized,
{
    let mut results = Vec::with_capacity(ids.len());
    for &id in ids {
        let object = relation.get(id)?;
        results.push(DistanceResult::new(id, distance.distance(query, &object)));
    }
    results.sort_by(DistanceResult::cmp_by_distance);
    Ok(results)
}

/// Asserts both result lists hold the same distances in the same order
pub fn assert_same_distances(actual: &[DistanceResult], expected: &[DistanceResult]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "result count differs: {:?} vs {:?}",
        actual,
        expected
    );
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a.distance - e.distance).abs() <= DISTANCE_TOLERANCE,
            "distance {} differs from expected {}",
            a.distance,
            e.distance
        );
    }
}

/// Asserts both result lists hold the same objects at the same distances
pub fn assert_same_results(actual: &[DistanceResult], expected: &[DistanceResult]) {
    assert_same_distances(actual, expected);
    let mut actual_ids: Vec<ObjectId> = actual.iter().map(|r| r.id).collect();
    let mut expected_ids: Vec<ObjectId> = expected.iter().map(|r| r.id).collect();
    actual_ids.sort_unstable();
    expected_ids.sort_unstable();
    assert_eq!(actual_ids, expected_ids);
}
