//! Subtree choice for metric trees.

/// Minimum enlargement choice.
///
/// `children` holds for every child the distance from the new entry to the
/// child's routing object and the child's covering radius; `radius` is the
/// covering radius of the new entry (0 for objects).
///
/// A child already enclosing the entry wins, the one with the smallest
/// covering radius first, then the nearest. Otherwise the child needing
/// the least radius increase wins. Remaining ties go to the lowest index.
/// The radius itself is not changed here.
pub(crate) fn minimum_enlargement(children: &[(f64, f64)], radius: f64) -> Option<usize> {
    let mut enclosing: Option<(usize, f64, f64)> = None;
    let mut enlarging: Option<(usize, f64)> = None;

    for (i, &(distance, covering_radius)) in children.iter().enumerate() {
        let needed = distance + radius;
        if needed <= covering_radius {
            let better = match enclosing {
                Some((_, best_radius, best_distance)) => {
                    (covering_radius, distance) < (best_radius, best_distance)
                }
                None => true,
            };
            if better {
                enclosing = Some((i, covering_radius, distance));
            }
        } else {
            let increase = needed - covering_radius;
            if enlarging.map_or(true, |(_, best)| increase < best) {
                enlarging = Some((i, increase));
            }
        }
    }

    enclosing
        .map(|(i, _, _)| i)
        .or(enlarging.map(|(i, _)| i))
}
