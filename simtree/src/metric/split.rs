//! Node splitting for metric trees: promotion of two routing objects, then
//! distribution of the entries between them.
//!
//! All pairwise distances of the overflowing node are computed once into a
//! [`DistanceMatrix`]; promotion and distribution only read from it.

use serde::{Deserialize, Serialize};

/// How the two new routing objects are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Promotion {
    /// The pair whose distribution minimizes the larger covering radius
    #[default]
    #[serde(rename = "mm-rad")]
    MinMaxRadius,
    /// Keep the entry nearest to the current routing object and promote the
    /// one farthest from it. Falls back to the farthest points at the root.
    #[serde(rename = "mlb-dist")]
    MaxLowerBoundDistance,
    /// The two mutually farthest entries
    FarthestPoints,
}

/// How entries are assigned to the promoted routing objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Distribution {
    /// Each entry goes to its nearer routing object; groups below the
    /// minimum fill take the nearest entries of the other group
    #[default]
    GeneralizedHyperplane,
    /// The routing objects alternately take their nearest remaining entry
    Balanced,
}

/// Symmetric matrix of the distances between the entries of a node
#[derive(Debug, Clone)]
pub(crate) struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Calls `distance` once per unordered pair.
    pub(crate) fn new(size: usize, mut distance: impl FnMut(usize, usize) -> f64) -> Self {
        let mut values = vec![0.0; size * size];
        for i in 0..size {
            for j in i + 1..size {
                let d = distance(i, j);
                values[i * size + j] = d;
                values[j * size + i] = d;
            }
        }
        Self { size, values }
    }

    pub(crate) fn len(&self) -> usize {
        self.size
    }

    pub(crate) fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }
}

/// Outcome of a split: for each group its routing entry, its members
/// (including the routing entry) and its covering radius.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MetricSplit {
    pub(crate) first_seed: usize,
    pub(crate) first: Vec<usize>,
    pub(crate) first_radius: f64,
    pub(crate) second_seed: usize,
    pub(crate) second: Vec<usize>,
    pub(crate) second_radius: f64,
}

impl MetricSplit {
    fn cost(&self) -> (f64, f64) {
        (
            self.first_radius.max(self.second_radius),
            self.first_radius + self.second_radius,
        )
    }
}

/// Splits the entries of `matrix`. `radii` holds the covering radius of
/// every entry (0 for objects), `parent_distances` their distance to the
/// current routing object unless the node is the root. Needs at least two
/// entries.
pub(crate) fn split(
    matrix: &DistanceMatrix,
    radii: &[f64],
    parent_distances: Option<&[f64]>,
    promotion: Promotion,
    distribution: Distribution,
    min_fill: usize,
) -> MetricSplit {
    let n = matrix.len();
    let min_fill = min_fill.clamp(1, (n / 2).max(1));

    match promotion {
        Promotion::MinMaxRadius => {
            let mut best = distribute(matrix, radii, (0, 1), distribution, min_fill);
            for i in 0..n {
                for j in i + 1..n {
                    let candidate = distribute(matrix, radii, (i, j), distribution, min_fill);
                    if candidate.cost() < best.cost() {
                        best = candidate;
                    }
                }
            }
            best
        }
        Promotion::MaxLowerBoundDistance => {
            let seeds = match parent_distances {
                Some(distances) => nearest_and_farthest(distances),
                None => farthest_points(matrix),
            };
            distribute(matrix, radii, seeds, distribution, min_fill)
        }
        Promotion::FarthestPoints => {
            distribute(matrix, radii, farthest_points(matrix), distribution, min_fill)
        }
    }
}

fn farthest_points(matrix: &DistanceMatrix) -> (usize, usize) {
    let mut seeds = (0, 1);
    let mut farthest = f64::NEG_INFINITY;
    for i in 0..matrix.len() {
        for j in i + 1..matrix.len() {
            if matrix.get(i, j) > farthest {
                farthest = matrix.get(i, j);
                seeds = (i, j);
            }
        }
    }
    seeds
}

fn nearest_and_farthest(parent_distances: &[f64]) -> (usize, usize) {
    let mut nearest = 0;
    for (i, d) in parent_distances.iter().enumerate() {
        if *d < parent_distances[nearest] {
            nearest = i;
        }
    }
    let mut farthest = if nearest == 0 { 1 } else { 0 };
    for (i, d) in parent_distances.iter().enumerate() {
        if i != nearest && *d > parent_distances[farthest] {
            farthest = i;
        }
    }
    (nearest, farthest)
}

fn distribute(
    matrix: &DistanceMatrix,
    radii: &[f64],
    seeds: (usize, usize),
    distribution: Distribution,
    min_fill: usize,
) -> MetricSplit {
    let (a, b) = seeds;
    let (first, second) = match distribution {
        Distribution::GeneralizedHyperplane => hyperplane(matrix, seeds, min_fill),
        Distribution::Balanced => balanced(matrix, seeds),
    };
    let radius = |seed: usize, group: &[usize]| {
        group
            .iter()
            .map(|&k| matrix.get(seed, k) + radii[k])
            .fold(0.0, f64::max)
    };
    MetricSplit {
        first_seed: a,
        first_radius: radius(a, &first),
        first,
        second_seed: b,
        second_radius: radius(b, &second),
        second,
    }
}

fn hyperplane(
    matrix: &DistanceMatrix,
    (a, b): (usize, usize),
    min_fill: usize,
) -> (Vec<usize>, Vec<usize>) {
    let mut first = vec![a];
    let mut second = vec![b];
    for k in (0..matrix.len()).filter(|k| *k != a && *k != b) {
        let (to_a, to_b) = (matrix.get(a, k), matrix.get(b, k));
        if to_a < to_b || (to_a == to_b && first.len() <= second.len()) {
            first.push(k);
        } else {
            second.push(k);
        }
    }
    rebalance(matrix, a, &mut first, b, &mut second, min_fill);
    rebalance(matrix, b, &mut second, a, &mut first, min_fill);
    (first, second)
}

/// Moves the entries of `other` nearest to `seed` into `group` until it
/// holds `min_fill` entries.
fn rebalance(
    matrix: &DistanceMatrix,
    seed: usize,
    group: &mut Vec<usize>,
    other_seed: usize,
    other: &mut Vec<usize>,
    min_fill: usize,
) {
    while group.len() < min_fill {
        let nearest = other
            .iter()
            .enumerate()
            .filter(|(_, k)| **k != other_seed)
            .min_by(|(_, x), (_, y)| matrix.get(seed, **x).total_cmp(&matrix.get(seed, **y)))
            .map(|(position, _)| position);
        match nearest {
            Some(position) => group.push(other.remove(position)),
            None => break,
        }
    }
}

fn balanced(matrix: &DistanceMatrix, (a, b): (usize, usize)) -> (Vec<usize>, Vec<usize>) {
    let mut groups = [vec![a], vec![b]];
    let seeds = [a, b];
    let mut remaining: Vec<usize> = (0..matrix.len()).filter(|k| *k != a && *k != b).collect();
    let mut turn = 0;
    while !remaining.is_empty() {
        let seed = seeds[turn];
        let mut position = 0;
        for (p, &k) in remaining.iter().enumerate() {
            if matrix.get(seed, k) < matrix.get(seed, remaining[position]) {
                position = p;
            }
        }
        groups[turn].push(remaining.remove(position));
        turn = 1 - turn;
    }
    let [first, second] = groups;
    (first, second)
}
