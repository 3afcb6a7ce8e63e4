//! Least-squares fitting of mappings to point correspondences.
//!
//! Both point sets are centred and isotropically scaled before solving
//! (mean distance from the centroid becomes sqrt(2)), which keeps the
//! normal equations well conditioned for detector-sized coordinates.

use crate::consts::{EPSILON, SINGULAR_PIVOT};

use super::{quadratic_basis, Affine, Mapping, Normalization, Point, Quadratic, TransformModel};

/// Fit `model` mapping `src[i]` onto `dst[i]`.
///
/// Returns `None` when the configuration is degenerate for the model
/// (coincident points, collinear points for affine, singular normal
/// equations for quadratic) or when there are too few pairs.
pub fn fit_mapping(model: TransformModel, src: &[Point], dst: &[Point]) -> Option<Mapping> {
    if src.len() != dst.len() || src.len() < model.min_points() {
        return None;
    }
    match model {
        TransformModel::Similarity => fit_similarity(src, dst).map(Mapping::Affine),
        TransformModel::Affine => fit_affine(src, dst).map(Mapping::Affine),
        TransformModel::Quadratic => fit_quadratic(src, dst).map(Mapping::Quadratic),
    }
}

/// Hartley-style normalisation of a point set. `None` if all points coincide.
pub fn normalization_for(points: &[Point]) -> Option<Normalization> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if !mean_dist.is_finite() || mean_dist < EPSILON * (1.0 + cx.abs().max(cy.abs())) {
        return None;
    }
    Some(Normalization {
        cx,
        cy,
        scale: std::f64::consts::SQRT_2 / mean_dist,
    })
}

/// Map a mapping fitted in normalised space back to pixel space:
/// `dst⁻¹ ∘ fitted ∘ src`.
fn denormalize(fitted: &Affine, src: &Normalization, dst: &Normalization) -> Option<Affine> {
    let dst_inv = dst.as_affine().inverse()?;
    Some(dst_inv.compose(&fitted.compose(&src.as_affine())))
}

fn normalized_pairs(src: &[Point], dst: &[Point]) -> Option<(Normalization, Normalization, Vec<(Point, Point)>)> {
    let ns = normalization_for(src)?;
    let nd = normalization_for(dst)?;
    let pairs = src
        .iter()
        .zip(dst.iter())
        .map(|(s, d)| (ns.normalize(*s), nd.normalize(*d)))
        .collect();
    Some((ns, nd, pairs))
}

/// Rotation + uniform scale + translation (closed form on centred points).
fn fit_similarity(src: &[Point], dst: &[Point]) -> Option<Affine> {
    let (ns, nd, pairs) = normalized_pairs(src, dst)?;

    // Both sets are centred, so translation vanishes in normalised space.
    let mut sxx = 0.0;
    let mut num_a = 0.0;
    let mut num_b = 0.0;
    for (s, d) in &pairs {
        sxx += s.x * s.x + s.y * s.y;
        num_a += s.x * d.x + s.y * d.y;
        num_b += s.x * d.y - s.y * d.x;
    }
    if sxx < EPSILON {
        return None;
    }
    let a = num_a / sxx;
    let b = num_b / sxx;
    if (a * a + b * b).sqrt() < EPSILON {
        return None;
    }
    denormalize(&Affine::new([a, -b, 0.0, b, a, 0.0]), &ns, &nd)
}

/// General affine via per-axis normal equations.
fn fit_affine(src: &[Point], dst: &[Point]) -> Option<Affine> {
    let (ns, nd, pairs) = normalized_pairs(src, dst)?;

    let mut suu = 0.0;
    let mut suv = 0.0;
    let mut svv = 0.0;
    for (s, _) in &pairs {
        suu += s.x * s.x;
        suv += s.x * s.y;
        svv += s.y * s.y;
    }
    // Collinear sources leave the 2x2 scatter matrix rank-deficient.
    let trace = suu + svv;
    let det = suu * svv - suv * suv;
    if trace < EPSILON || det / (trace * trace) < SINGULAR_PIVOT {
        return None;
    }

    let mut ata = vec![vec![0.0; 3]; 3];
    let mut atx = vec![0.0; 3];
    let mut aty = vec![0.0; 3];
    for (s, d) in &pairs {
        let row = [s.x, s.y, 1.0];
        for i in 0..3 {
            for j in 0..3 {
                ata[i][j] += row[i] * row[j];
            }
            atx[i] += row[i] * d.x;
            aty[i] += row[i] * d.y;
        }
    }
    let px = solve_linear(ata.clone(), atx)?;
    let py = solve_linear(ata, aty)?;
    let fitted = Affine::new([px[0], px[1], px[2], py[0], py[1], py[2]]);
    denormalize(&fitted, &ns, &nd)
}

/// Second-order polynomial via 6x6 normal equations per axis.
fn fit_quadratic(src: &[Point], dst: &[Point]) -> Option<Quadratic> {
    let (ns, nd, pairs) = normalized_pairs(src, dst)?;

    let mut ata = vec![vec![0.0; 6]; 6];
    let mut atx = vec![0.0; 6];
    let mut aty = vec![0.0; 6];
    for (s, d) in &pairs {
        let row = quadratic_basis(s.x, s.y);
        for i in 0..6 {
            for j in 0..6 {
                ata[i][j] += row[i] * row[j];
            }
            atx[i] += row[i] * d.x;
            aty[i] += row[i] * d.y;
        }
    }
    let cx = solve_linear(ata.clone(), atx)?;
    let cy = solve_linear(ata, aty)?;
    let mut q = Quadratic {
        src: ns,
        dst: nd,
        cx: [0.0; 6],
        cy: [0.0; 6],
    };
    q.cx.copy_from_slice(&cx);
    q.cy.copy_from_slice(&cy);
    Some(q)
}

/// Gaussian elimination with partial pivoting. `None` if a pivot falls
/// below `SINGULAR_PIVOT` relative to the largest matrix entry.
pub(crate) fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot_row][col].abs() < SINGULAR_PIVOT * scale {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in row + 1..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Distance between each mapped source point and its destination.
pub fn residuals(mapping: &Mapping, src: &[Point], dst: &[Point]) -> Vec<f64> {
    src.iter()
        .zip(dst.iter())
        .map(|(s, d)| mapping.apply(*s).distance(d))
        .collect()
}

pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}
