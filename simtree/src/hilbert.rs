//! Space-filling curve utilities for bulk loading.
//!
//! The Hilbert curve maps 2D coordinates to a 1D index while preserving
//! spatial locality: points close in space stay close along the curve.
//! The Z-order (Morton) curve interleaves coordinate bits and works for any
//! dimensionality, at the price of weaker locality.

use crate::bounding_box::HyperBoundingBox;

/// Maximum order for Hilbert curve encoding (determines precision)
const MAX_HILBERT_ORDER: u32 = 32;

/// Encodes 2D coordinates to a Hilbert curve index.
///
/// # Arguments
/// * `x` - X coordinate (normalized to [0, 1])
/// * `y` - Y coordinate (normalized to [0, 1])
/// * `order` - Hilbert curve order (1-32, higher = more precision)
///
/// # Example
/// ```rust
/// use simtree::hilbert::hilbert_index;
///
/// let index = hilbert_index(0.5, 0.5, 16);
/// assert!(index < (1u64 << 32)); // At order 16, max index is 2^32-1
/// ```
pub fn hilbert_index(x: f64, y: f64, order: u32) -> u64 {
    debug_assert!((0.0..=1.0).contains(&x), "x must be in [0,1]");
    debug_assert!((0.0..=1.0).contains(&y), "y must be in [0,1]");
    debug_assert!(order > 0 && order <= MAX_HILBERT_ORDER, "order must be 1-32");

    let n = 1u64 << order;
    let xi = quantize(x, n);
    let yi = quantize(y, n);
    xy2d(n, xi, yi)
}

/// Hilbert index of the first two coordinates of `point`, normalized by
/// `bounds`. One-dimensional points use a constant second coordinate.
pub fn hilbert_index_bounded(point: &[f64], bounds: &HyperBoundingBox, order: u32) -> u64 {
    let x = normalize(point, bounds, 0);
    let y = if point.len() > 1 {
        normalize(point, bounds, 1)
    } else {
        0.5
    };
    hilbert_index(x, y, order)
}

/// Z-order index of `point` normalized by `bounds`, spreading 64 bits over
/// all dimensions.
pub fn z_order_index(point: &[f64], bounds: &HyperBoundingBox) -> u64 {
    let dims = point.len().max(1);
    let bits = (64 / dims).clamp(1, 32) as u32;
    let n = 1u64 << bits;
    let cells: Vec<u64> = (0..point.len())
        .map(|d| quantize(normalize(point, bounds, d), n))
        .collect();

    let mut index = 0u64;
    for bit in (0..bits).rev() {
        for cell in &cells {
            index = (index << 1) | ((cell >> bit) & 1);
        }
    }
    index
}

fn normalize(point: &[f64], bounds: &HyperBoundingBox, dim: usize) -> f64 {
    let range = bounds.extent(dim);
    if range > 0.0 {
        ((point[dim] - bounds.min()[dim]) / range).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn quantize(v: f64, n: u64) -> u64 {
    ((v * (n as f64 - 0.5)) as u64).min(n - 1)
}

/// Converts (x, y) coordinates on the Hilbert curve to a 1D distance.
fn xy2d(n: u64, x: u64, y: u64) -> u64 {
    let mut d = 0u64;
    let mut x = x;
    let mut y = y;
    let mut s = n / 2;

    while s > 0 {
        let rx = ((x & s) > 0) as u64;
        let ry = ((y & s) > 0) as u64;
        d += s * s * ((3 * rx) ^ ry);
        rotate(s, &mut x, &mut y, rx, ry);
        s /= 2;
    }

    d
}

/// Rotates and reflects the coordinate system appropriately for Hilbert curve.
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n.wrapping_sub(1).wrapping_sub(*x);
            *y = n.wrapping_sub(1).wrapping_sub(*y);
        }
        std::mem::swap(x, y);
    }
}
