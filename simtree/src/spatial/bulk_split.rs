//! Partitioning of entries for bulk loading.
//!
//! Every strategy orders the entries by the centers of their boxes and cuts
//! the order into consecutive groups of the requested sizes.

use serde::{Deserialize, Serialize};

use crate::bounding_box::HyperBoundingBox;
use crate::hilbert::{hilbert_index_bounded, z_order_index};

/// Hilbert curve order used to sort centers
const HILBERT_ORDER: u32 = 16;

/// How the bulk loader groups the entries of one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkSplitStrategy {
    /// Sort-Tile-Recursive: slabs along the first dimension, tiled
    /// recursively along the following ones
    #[default]
    SortTileRecursive,
    /// Sort along the first dimension only
    OneDimSort,
    /// Halve recursively along the dimension of maximal extension
    MaxExtension,
    /// Sort along the Hilbert curve of the first two dimensions
    Hilbert,
    /// Sort along the Z-order curve of all dimensions
    ZCurve,
}

impl BulkSplitStrategy {
    /// Index groups of `centers` with the given sizes, in order.
    pub(crate) fn partition(
        &self,
        centers: &[Vec<f64>],
        group_sizes: &[usize],
    ) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..centers.len()).collect();
        let dims = centers.first().map_or(0, |c| c.len());

        match self {
            BulkSplitStrategy::SortTileRecursive => {
                sort_tile_recursive(centers, &mut order, group_sizes, 0, dims)
            }
            BulkSplitStrategy::OneDimSort => order.sort_by(|&a, &b| compare(centers, a, b, 0)),
            BulkSplitStrategy::MaxExtension => max_extension(centers, &mut order, group_sizes),
            BulkSplitStrategy::Hilbert | BulkSplitStrategy::ZCurve => {
                let points: Vec<HyperBoundingBox> =
                    centers.iter().map(|c| HyperBoundingBox::from_point(c)).collect();
                if let Some(bounds) = HyperBoundingBox::union_all(points.iter()) {
                    let keys: Vec<u64> = centers
                        .iter()
                        .map(|c| match self {
                            BulkSplitStrategy::Hilbert => {
                                hilbert_index_bounded(c, &bounds, HILBERT_ORDER)
                            }
                            _ => z_order_index(c, &bounds),
                        })
                        .collect();
                    order.sort_by_key(|&i| (keys[i], i));
                }
            }
        }

        let mut groups = Vec::with_capacity(group_sizes.len());
        let mut offset = 0;
        for size in group_sizes {
            let end = (offset + size).min(order.len());
            groups.push(order[offset..end].to_vec());
            offset = end;
        }
        groups
    }
}

/// Orders by coordinate `dim`, then by the following coordinates
fn compare(centers: &[Vec<f64>], a: usize, b: usize, dim: usize) -> std::cmp::Ordering {
    let dims = centers[a].len();
    (dim..dims)
        .chain(0..dim)
        .map(|d| centers[a][d].total_cmp(&centers[b][d]))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

fn sort_tile_recursive(
    centers: &[Vec<f64>],
    order: &mut [usize],
    group_sizes: &[usize],
    dim: usize,
    dims: usize,
) {
    if group_sizes.len() <= 1 || dim >= dims {
        return;
    }
    order.sort_by(|&a, &b| compare(centers, a, b, dim));

    // Slabs of whole groups, ceil(g^(1/d)) of them along this dimension
    let remaining_dims = (dims - dim) as f64;
    let slabs = (group_sizes.len() as f64)
        .powf(1.0 / remaining_dims)
        .ceil()
        .max(1.0) as usize;
    let groups_per_slab = group_sizes.len().div_ceil(slabs);

    let mut offset = 0;
    for slab in group_sizes.chunks(groups_per_slab) {
        let count: usize = slab.iter().sum();
        let end = (offset + count).min(order.len());
        sort_tile_recursive(centers, &mut order[offset..end], slab, dim + 1, dims);
        offset = end;
    }
}

fn max_extension(centers: &[Vec<f64>], order: &mut [usize], group_sizes: &[usize]) {
    if group_sizes.len() <= 1 || order.is_empty() {
        return;
    }
    let dims = centers[order[0]].len();
    let mut best_dim = 0;
    let mut best_extension = f64::NEG_INFINITY;
    for dim in 0..dims {
        let (lo, hi) = order.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            (lo.min(centers[i][dim]), hi.max(centers[i][dim]))
        });
        if hi - lo > best_extension {
            best_extension = hi - lo;
            best_dim = dim;
        }
    }
    order.sort_by(|&a, &b| compare(centers, a, b, best_dim));

    let mid = group_sizes.len() / 2;
    let count: usize = group_sizes[..mid].iter().sum::<usize>().min(order.len());
    let (low, high) = order.split_at_mut(count);
    max_extension(centers, low, &group_sizes[..mid]);
    max_extension(centers, high, &group_sizes[mid..]);
}
