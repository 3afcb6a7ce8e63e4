use crate::transform::{Mapping, Point};

/// Index pair `(source, target)` of a correspondence.
pub type Pair = (usize, usize);

/// Greedy mutual nearest-neighbour matching of `prior(source)` against
/// `target` within `radius`.
///
/// All candidate pairs are ordered by distance (ties by index) and accepted
/// greedily, so every point is used at most once and the outcome does not
/// depend on input order beyond the indices themselves.
pub fn match_nearest(source: &[Point], target: &[Point], prior: &Mapping, radius: f64) -> Vec<Pair> {
    let mapped: Vec<Point> = source.iter().map(|p| prior.apply(*p)).collect();

    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for (i, p) in mapped.iter().enumerate() {
        for (j, q) in target.iter().enumerate() {
            let d = p.distance(q);
            if d <= radius {
                candidates.push((d, i, j));
            }
        }
    }
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut used_src = vec![false; source.len()];
    let mut used_dst = vec![false; target.len()];
    let mut pairs = Vec::new();
    for (_, i, j) in candidates {
        if !used_src[i] && !used_dst[j] {
            used_src[i] = true;
            used_dst[j] = true;
            pairs.push((i, j));
        }
    }
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Affine;

    #[test]
    fn test_matches_through_prior() {
        let target = vec![Point::new(10.0, 10.0), Point::new(40.0, 25.0)];
        let source = vec![Point::new(35.2, 20.1), Point::new(5.1, 4.9)];
        let prior = Mapping::Affine(Affine::translation(5.0, 5.0));
        assert_eq!(match_nearest(&source, &target, &prior, 1.0), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_each_target_used_once() {
        let target = vec![Point::new(0.0, 0.0)];
        let source = vec![Point::new(0.1, 0.0), Point::new(0.2, 0.0)];
        let pairs = match_nearest(&source, &target, &Mapping::identity(), 1.0);
        assert_eq!(pairs, vec![(0, 0)]);
    }

    #[test]
    fn test_outside_radius_unmatched() {
        let target = vec![Point::new(0.0, 0.0)];
        let source = vec![Point::new(5.0, 0.0)];
        assert!(match_nearest(&source, &target, &Mapping::identity(), 3.0).is_empty());
    }
}
