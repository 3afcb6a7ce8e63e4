//! Correspondence search from similarity-invariant triangle shapes.
//!
//! Every triangle of bright points is described by its two side ratios
//! (shortest/longest, middle/longest), which survive translation, rotation
//! and uniform scaling. Similar triangles in the two point sets vote for the
//! vertex pairs they imply; pairs with the most votes become correspondences.

use std::collections::BTreeMap;

use tracing::trace;

use crate::consts::TRIANGLE_MAX_ELONGATION;
use crate::transform::Point;

use super::config::TriangleMatchConfig;
use super::matching::Pair;

/// Minimum area relative to the squared longest side.
const MIN_RELATIVE_AREA: f64 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Orientation {
    Clockwise,
    CounterClockwise,
}

#[derive(Clone, Debug)]
struct Triangle {
    /// Vertices ordered opposite the shortest, middle and longest side.
    vertices: [usize; 3],
    ratios: (f64, f64),
    orientation: Orientation,
}

impl Triangle {
    fn new(indices: [usize; 3], points: &[Point], tolerance: f64) -> Option<Self> {
        let [i, j, k] = indices;
        let (p0, p1, p2) = (points[i], points[j], points[k]);

        let mut sides = [
            (p0.distance(&p1), k),
            (p1.distance(&p2), i),
            (p2.distance(&p0), j),
        ];
        sides.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let [(short, v0), (mid, v1), (long, v2)] = sides;

        if short <= 0.0 || long / short > TRIANGLE_MAX_ELONGATION {
            return None;
        }
        // Near-equal sides make the vertex order ambiguous.
        if (mid - short) / long < tolerance || (long - mid) / long < tolerance {
            return None;
        }

        let (a, b, c) = (points[v0], points[v1], points[v2]);
        let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        if cross.abs() / 2.0 < MIN_RELATIVE_AREA * long * long {
            return None;
        }

        Some(Self {
            vertices: [v0, v1, v2],
            ratios: (short / long, mid / long),
            orientation: if cross > 0.0 {
                Orientation::CounterClockwise
            } else {
                Orientation::Clockwise
            },
        })
    }

    fn is_similar(&self, other: &Triangle, config: &TriangleMatchConfig) -> bool {
        (self.ratios.0 - other.ratios.0).abs() <= config.ratio_tolerance
            && (self.ratios.1 - other.ratios.1).abs() <= config.ratio_tolerance
            && (!config.check_orientation || self.orientation == other.orientation)
    }
}

fn build_triangles(points: &[Point], config: &TriangleMatchConfig) -> Vec<Triangle> {
    let n = points.len().min(config.max_points);
    let mut triangles = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                if let Some(t) = Triangle::new([i, j, k], points, config.ratio_tolerance) {
                    triangles.push(t);
                }
            }
        }
    }
    triangles
}

/// Find point correspondences between `source` and `target` without any
/// prior knowledge of their relative placement.
///
/// Both slices are expected brightest first; only the leading
/// `config.max_points` of each take part. The result is deterministic for a
/// given input and sorted by source index.
pub fn match_triangles(source: &[Point], target: &[Point], config: &TriangleMatchConfig) -> Vec<Pair> {
    let src_tris = build_triangles(source, config);
    let dst_tris = build_triangles(target, config);

    let mut votes: BTreeMap<Pair, usize> = BTreeMap::new();
    for s in &src_tris {
        for d in &dst_tris {
            if s.is_similar(d, config) {
                for (&si, &di) in s.vertices.iter().zip(d.vertices.iter()) {
                    *votes.entry((si, di)).or_insert(0) += 1;
                }
            }
        }
    }

    trace!(
        source_triangles = src_tris.len(),
        target_triangles = dst_tris.len(),
        voted_pairs = votes.len(),
        "Triangle voting"
    );

    let mut ranked: Vec<(usize, usize, usize)> = votes
        .into_iter()
        .filter(|&(_, v)| v >= config.min_votes.max(1))
        .map(|((s, d), v)| (v, s, d))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut used_src = vec![false; source.len()];
    let mut used_dst = vec![false; target.len()];
    let mut pairs = Vec::new();
    for (_, s, d) in ranked {
        if !used_src[s] && !used_dst[d] {
            used_src[s] = true;
            used_dst[d] = true;
            pairs.push((s, d));
        }
    }
    pairs.sort_unstable();
    pairs
}
