//! Distance function collaborators.
//!
//! Metric trees only need [`Distance`]. Spatial trees need a
//! [`SpatialDistance`], which can also bound the distance from a query
//! vector to anything inside a bounding box.

use crate::bounding_box::HyperBoundingBox;

/// A pure distance function between two objects.
///
/// Metric trees require the triangle inequality for correct pruning.
pub trait Distance<O: ?Sized>: Send + Sync {
    fn distance(&self, a: &O, b: &O) -> f64;
}

/// A distance over numeric vectors with a lower bound for boxes.
pub trait SpatialDistance: Distance<Vec<f64>> {
    /// Smallest possible distance from `query` to any point in `mbr`.
    /// Zero when the query lies inside the box.
    fn min_dist(&self, query: &[f64], mbr: &HyperBoundingBox) -> f64;
}

/// Per-dimension gap between a value and an interval, 0 inside
fn gap(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo - v
    } else if v > hi {
        v - hi
    } else {
        0.0
    }
}

fn mbr_gaps<'a>(query: &'a [f64], mbr: &'a HyperBoundingBox) -> impl Iterator<Item = f64> + 'a {
    query
        .iter()
        .zip(mbr.min().iter().zip(mbr.max()))
        .map(|(v, (lo, hi))| gap(*v, *lo, *hi))
}

/// L2 distance
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl Distance<Vec<f64>> for EuclideanDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        SquaredEuclideanDistance.distance(a, b).sqrt()
    }
}

impl SpatialDistance for EuclideanDistance {
    fn min_dist(&self, query: &[f64], mbr: &HyperBoundingBox) -> f64 {
        SquaredEuclideanDistance.min_dist(query, mbr).sqrt()
    }
}

/// Squared L2 distance. Not a metric, usable in spatial trees only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredEuclideanDistance;

impl Distance<Vec<f64>> for SquaredEuclideanDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }
}

impl SpatialDistance for SquaredEuclideanDistance {
    fn min_dist(&self, query: &[f64], mbr: &HyperBoundingBox) -> f64 {
        mbr_gaps(query, mbr).map(|g| g * g).sum()
    }
}

/// L1 distance
#[derive(Debug, Clone, Copy, Default)]
pub struct ManhattanDistance;

impl Distance<Vec<f64>> for ManhattanDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
    }
}

impl SpatialDistance for ManhattanDistance {
    fn min_dist(&self, query: &[f64], mbr: &HyperBoundingBox) -> f64 {
        mbr_gaps(query, mbr).sum()
    }
}

/// L-infinity (Chebyshev) distance
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximumDistance;

impl Distance<Vec<f64>> for MaximumDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }
}

impl SpatialDistance for MaximumDistance {
    fn min_dist(&self, query: &[f64], mbr: &HyperBoundingBox) -> f64 {
        mbr_gaps(query, mbr).fold(0.0, f64::max)
    }
}

/// L_p distance for `p >= 1`
#[derive(Debug, Clone, Copy)]
pub struct MinkowskiDistance {
    p: f64,
}

impl MinkowskiDistance {
    pub fn new(p: f64) -> Self {
        Self { p }
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    fn norm(&self, diffs: impl Iterator<Item = f64>) -> f64 {
        diffs.map(|d| d.abs().powf(self.p)).sum::<f64>().powf(1.0 / self.p)
    }
}

impl Distance<Vec<f64>> for MinkowskiDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        self.norm(a.iter().zip(b).map(|(x, y)| x - y))
    }
}

impl SpatialDistance for MinkowskiDistance {
    fn min_dist(&self, query: &[f64], mbr: &HyperBoundingBox) -> f64 {
        self.norm(mbr_gaps(query, mbr))
    }
}

/// `1 - cos(a, b)`. Not a metric, usable in spatial trees only.
///
/// Two zero vectors have distance 0, a zero vector and any other vector
/// have distance 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineDistance;

impl Distance<Vec<f64>> for CosineDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f64 = a.iter().map(|x| x * x).sum();
        let nb: f64 = b.iter().map(|x| x * x).sum();
        if na == 0.0 || nb == 0.0 {
            return if na == nb { 0.0 } else { 1.0 };
        }
        (1.0 - dot / (na * nb).sqrt()).clamp(0.0, 2.0)
    }
}

impl SpatialDistance for CosineDistance {
    fn min_dist(&self, query: &[f64], mbr: &HyperBoundingBox) -> f64 {
        let nq: f64 = query.iter().map(|x| x * x).sum();
        if nq == 0.0 {
            return 0.0;
        }
        // Largest dot product, smallest and largest squared norm in the box
        let mut dot = 0.0;
        let mut lmin = 0.0;
        let mut lmax = 0.0;
        for (v, (lo, hi)) in query.iter().zip(mbr.min().iter().zip(mbr.max())) {
            dot += (v * lo).max(v * hi);
            let g = gap(0.0, *lo, *hi);
            lmin += g * g;
            let far = lo.abs().max(hi.abs());
            lmax += far * far;
        }
        let max_cos = if dot >= 0.0 {
            if lmin == 0.0 {
                1.0
            } else {
                (dot / (nq * lmin).sqrt()).min(1.0)
            }
        } else if lmax == 0.0 {
            0.0
        } else {
            dot / (nq * lmax).sqrt()
        };
        (1.0 - max_cos).max(0.0)
    }
}

/// Edit distance between strings, counted in characters
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinDistance;

impl Distance<String> for LevenshteinDistance {
    fn distance(&self, a: &String, b: &String) -> f64 {
        levenshtein(a, b) as f64
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
