//! Node splitting for spatial trees.
//!
//! Every strategy works on the bounding boxes of the `C + 1` entries of an
//! overflowing node and returns the indices of the two groups, each holding
//! at least the minimum fill.

use serde::{Deserialize, Serialize};

use crate::bounding_box::HyperBoundingBox;

/// How an overflowing node is partitioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitStrategy {
    /// R*-tree split: axis of least margin, then distribution of least
    /// overlap
    #[default]
    Topological,
    /// Guttman's quadratic split
    Quadratic,
    /// Guttman's linear split
    Linear,
}

/// Index groups of a split
pub(crate) type Partition = (Vec<usize>, Vec<usize>);

impl SplitStrategy {
    pub(crate) fn partition(&self, boxes: &[HyperBoundingBox], min_fill: usize) -> Partition {
        let min_fill = min_fill.clamp(1, (boxes.len() / 2).max(1));
        match self {
            SplitStrategy::Topological => topological_split(boxes, min_fill),
            SplitStrategy::Quadratic => {
                let seeds = quadratic_seeds(boxes);
                distribute(boxes, seeds, min_fill, true)
            }
            SplitStrategy::Linear => {
                let seeds = linear_seeds(boxes);
                distribute(boxes, seeds, min_fill, false)
            }
        }
    }
}

// ============================================================================
// Topological split
// ============================================================================

fn topological_split(boxes: &[HyperBoundingBox], min_fill: usize) -> Partition {
    let n = boxes.len();
    let dims = boxes.first().map_or(0, |b| b.dimensionality());

    // Choose the axis with least total margin over all distributions
    let mut best_axis_orders: Option<[Vec<usize>; 2]> = None;
    let mut best_margin = f64::INFINITY;
    for dim in 0..dims {
        let mut by_min: Vec<usize> = (0..n).collect();
        by_min.sort_by(|&a, &b| {
            boxes[a].min()[dim]
                .total_cmp(&boxes[b].min()[dim])
                .then(boxes[a].max()[dim].total_cmp(&boxes[b].max()[dim]))
        });
        let mut by_max: Vec<usize> = (0..n).collect();
        by_max.sort_by(|&a, &b| {
            boxes[a].max()[dim]
                .total_cmp(&boxes[b].max()[dim])
                .then(boxes[a].min()[dim].total_cmp(&boxes[b].min()[dim]))
        });

        let mut margin = 0.0;
        for order in [&by_min, &by_max] {
            let (prefix, suffix) = sweep(boxes, order);
            for k in min_fill..=n - min_fill {
                margin += prefix[k - 1].margin() + suffix[k].margin();
            }
        }
        if margin < best_margin {
            best_margin = margin;
            best_axis_orders = Some([by_min, by_max]);
        }
    }

    let orders = match best_axis_orders {
        Some(orders) => orders,
        None => return halves(n),
    };

    // Along that axis, the distribution with least overlap, then least area
    let mut best: Option<(usize, usize)> = None;
    let mut best_cost = (f64::INFINITY, f64::INFINITY);
    for (o, order) in orders.iter().enumerate() {
        let (prefix, suffix) = sweep(boxes, order);
        for k in min_fill..=n - min_fill {
            let cost = (
                prefix[k - 1].overlap(&suffix[k]),
                prefix[k - 1].volume() + suffix[k].volume(),
            );
            if cost < best_cost {
                best_cost = cost;
                best = Some((o, k));
            }
        }
    }

    match best {
        Some((o, k)) => (orders[o][..k].to_vec(), orders[o][k..].to_vec()),
        None => halves(n),
    }
}

/// Unions of every prefix and every suffix of `order`:
/// `prefix[i]` covers `order[..=i]`, `suffix[i]` covers `order[i..]`.
fn sweep(
    boxes: &[HyperBoundingBox],
    order: &[usize],
) -> (Vec<HyperBoundingBox>, Vec<HyperBoundingBox>) {
    let mut prefix: Vec<HyperBoundingBox> = Vec::with_capacity(order.len());
    for &i in order {
        let next = match prefix.last() {
            Some(last) => last.union(&boxes[i]),
            None => boxes[i].clone(),
        };
        prefix.push(next);
    }
    let mut suffix: Vec<HyperBoundingBox> = Vec::with_capacity(order.len());
    for &i in order.iter().rev() {
        let next = match suffix.last() {
            Some(last) => last.union(&boxes[i]),
            None => boxes[i].clone(),
        };
        suffix.push(next);
    }
    suffix.reverse();
    (prefix, suffix)
}

fn halves(n: usize) -> Partition {
    ((0..n / 2).collect(), (n / 2..n).collect())
}

// ============================================================================
// Guttman splits
// ============================================================================

/// The pair wasting the most area when put into one box
fn quadratic_seeds(boxes: &[HyperBoundingBox]) -> (usize, usize) {
    let mut seeds = (0, 1);
    let mut worst = f64::NEG_INFINITY;
    for i in 0..boxes.len() {
        for j in i + 1..boxes.len() {
            let waste =
                boxes[i].union(&boxes[j]).volume() - boxes[i].volume() - boxes[j].volume();
            if waste > worst {
                worst = waste;
                seeds = (i, j);
            }
        }
    }
    seeds
}

/// The pair with the greatest normalized separation along any dimension
fn linear_seeds(boxes: &[HyperBoundingBox]) -> (usize, usize) {
    let n = boxes.len();
    let dims = boxes.first().map_or(0, |b| b.dimensionality());
    let mut seeds = (0, 1);
    let mut best = f64::NEG_INFINITY;

    for dim in 0..dims {
        // Highest low side and lowest high side
        let mut highest_low = 0;
        let mut lowest_high = 0;
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for i in 0..n {
            if boxes[i].min()[dim] > boxes[highest_low].min()[dim] {
                highest_low = i;
            }
            if boxes[i].max()[dim] < boxes[lowest_high].max()[dim] {
                lowest_high = i;
            }
            lo = lo.min(boxes[i].min()[dim]);
            hi = hi.max(boxes[i].max()[dim]);
        }
        if highest_low == lowest_high {
            lowest_high = if highest_low == 0 { 1 } else { 0 };
        }
        let width = hi - lo;
        let separation = boxes[highest_low].min()[dim] - boxes[lowest_high].max()[dim];
        let normalized = if width > 0.0 { separation / width } else { 0.0 };
        if normalized > best {
            best = normalized;
            seeds = (lowest_high.min(highest_low), lowest_high.max(highest_low));
        }
    }
    seeds
}

/// Assigns the remaining entries to the two seed groups.
///
/// The quadratic variant always picks the entry with the strongest
/// preference next; the linear variant takes entries in order.
fn distribute(
    boxes: &[HyperBoundingBox],
    seeds: (usize, usize),
    min_fill: usize,
    pick_next: bool,
) -> Partition {
    let n = boxes.len();
    let mut first = vec![seeds.0];
    let mut second = vec![seeds.1];
    let mut first_box = boxes[seeds.0].clone();
    let mut second_box = boxes[seeds.1].clone();
    let mut remaining: Vec<usize> = (0..n).filter(|i| *i != seeds.0 && *i != seeds.1).collect();

    while !remaining.is_empty() {
        // A group that needs all remaining entries to reach the minimum gets them
        if first.len() + remaining.len() <= min_fill {
            first.append(&mut remaining);
            break;
        }
        if second.len() + remaining.len() <= min_fill {
            second.append(&mut remaining);
            break;
        }

        let position = if pick_next {
            let mut position = 0;
            let mut strongest = f64::NEG_INFINITY;
            for (p, &i) in remaining.iter().enumerate() {
                let preference =
                    (first_box.enlargement(&boxes[i]) - second_box.enlargement(&boxes[i])).abs();
                if preference > strongest {
                    strongest = preference;
                    position = p;
                }
            }
            position
        } else {
            0
        };
        let i = remaining.remove(position);

        let grow_first = first_box.enlargement(&boxes[i]);
        let grow_second = second_box.enlargement(&boxes[i]);
        let to_first = if grow_first != grow_second {
            grow_first < grow_second
        } else if first_box.volume() != second_box.volume() {
            first_box.volume() < second_box.volume()
        } else {
            first.len() <= second.len()
        };
        if to_first {
            first.push(i);
            first_box.extend(&boxes[i]);
        } else {
            second.push(i);
            second_box.extend(&boxes[i]);
        }
    }
    (first, second)
}
