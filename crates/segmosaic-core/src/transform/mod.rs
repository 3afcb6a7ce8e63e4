//! Geometric mappings between pixel coordinate frames.
//!
//! A [`Mapping`] is the bare geometry (affine matrix or second-order
//! polynomial); a [`Transform`] is a fitted mapping from one frame's pixel
//! grid onto another's, together with its fit-quality bookkeeping.

pub mod fit;

use serde::{Deserialize, Serialize};

use crate::consts::{NEWTON_MAX_ITERATIONS, TRANSFORM_TOLERANCE};

/// A point in pixel coordinates: `x` is the column, `y` the row.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Transform model fitted during registration, in order of increasing freedom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformModel {
    /// Rotation + uniform scale + translation (4 DOF).
    #[default]
    Similarity,
    /// Full affine (6 DOF).
    Affine,
    /// Second-order polynomial in x and y (12 DOF).
    #[serde(alias = "higher")]
    Quadratic,
}

impl TransformModel {
    /// Minimum number of point pairs needed to fit this model.
    pub fn min_points(&self) -> usize {
        match self {
            Self::Similarity => 2,
            Self::Affine => 3,
            Self::Quadratic => 6,
        }
    }

    pub fn degrees_of_freedom(&self) -> usize {
        match self {
            Self::Similarity => 4,
            Self::Affine => 6,
            Self::Quadratic => 12,
        }
    }
}

impl std::fmt::Display for TransformModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Similarity => write!(f, "Similarity"),
            Self::Affine => write!(f, "Affine"),
            Self::Quadratic => write!(f, "Quadratic"),
        }
    }
}

/// 2x3 affine matrix `[a, b, tx, c, d, ty]`:
///
/// ```text
/// x' = a*x + b*y + tx
/// y' = c*x + d*y + ty
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub m: [f64; 6],
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    pub fn new(m: [f64; 6]) -> Self {
        Self { m }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            m: [1.0, 0.0, dx, 0.0, 1.0, dy],
        }
    }

    /// Rotation by `angle` radians and uniform `scale` about the origin,
    /// followed by a translation.
    pub fn similarity(scale: f64, angle: f64, dx: f64, dy: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            m: [scale * cos, -scale * sin, dx, scale * sin, scale * cos, dy],
        }
    }

    /// Isotropic scale about the origin.
    pub fn scaling(scale: f64) -> Self {
        Self {
            m: [scale, 0.0, 0.0, 0.0, scale, 0.0],
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        let [a, b, tx, c, d, ty] = self.m;
        Point::new(a * p.x + b * p.y + tx, c * p.x + d * p.y + ty)
    }

    pub fn determinant(&self) -> f64 {
        self.m[0] * self.m[4] - self.m[1] * self.m[3]
    }

    /// Exact inverse, or `None` for a singular matrix.
    pub fn inverse(&self) -> Option<Affine> {
        let [a, b, tx, c, d, ty] = self.m;
        let det = self.determinant();
        let norm = a.abs().max(b.abs()).max(c.abs()).max(d.abs());
        if !det.is_finite() || det.abs() <= f64::EPSILON * norm * norm {
            return None;
        }
        let ia = d / det;
        let ib = -b / det;
        let ic = -c / det;
        let id = a / det;
        Some(Affine::new([
            ia,
            ib,
            -(ia * tx + ib * ty),
            ic,
            id,
            -(ic * tx + id * ty),
        ]))
    }

    /// `self ∘ other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &Affine) -> Affine {
        let [a1, b1, t1, c1, d1, u1] = self.m;
        let [a2, b2, t2, c2, d2, u2] = other.m;
        Affine::new([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            a1 * t2 + b1 * u2 + t1,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            c1 * t2 + d1 * u2 + u1,
        ])
    }

    pub fn translation_components(&self) -> (f64, f64) {
        (self.m[2], self.m[5])
    }

    /// Rotation angle (radians) of the linear part.
    pub fn rotation(&self) -> f64 {
        self.m[3].atan2(self.m[0])
    }

    /// Mean linear scale factor, `sqrt(|det|)`.
    pub fn scale(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    pub fn approx_eq(&self, other: &Affine, tol: f64) -> bool {
        self.m
            .iter()
            .zip(other.m.iter())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

/// Centring and isotropic scaling applied to points before a fit.
///
/// `normalize(p) = (p - center) * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalization {
    pub cx: f64,
    pub cy: f64,
    pub scale: f64,
}

impl Normalization {
    pub fn identity() -> Self {
        Self {
            cx: 0.0,
            cy: 0.0,
            scale: 1.0,
        }
    }

    pub fn normalize(&self, p: Point) -> Point {
        Point::new((p.x - self.cx) * self.scale, (p.y - self.cy) * self.scale)
    }

    pub fn denormalize(&self, p: Point) -> Point {
        Point::new(p.x / self.scale + self.cx, p.y / self.scale + self.cy)
    }

    pub fn as_affine(&self) -> Affine {
        Affine::new([
            self.scale,
            0.0,
            -self.cx * self.scale,
            0.0,
            self.scale,
            -self.cy * self.scale,
        ])
    }
}

/// Second-order polynomial mapping, evaluated in normalised coordinates:
///
/// ```text
/// (u, v)   = src.normalize(x, y)
/// basis    = [1, u, v, u², u·v, v²]
/// (x', y') = dst.denormalize(cx·basis, cy·basis)
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quadratic {
    pub src: Normalization,
    pub dst: Normalization,
    pub cx: [f64; 6],
    pub cy: [f64; 6],
}

impl Quadratic {
    pub fn apply(&self, p: Point) -> Point {
        let n = self.src.normalize(p);
        let basis = quadratic_basis(n.x, n.y);
        let u: f64 = self.cx.iter().zip(basis.iter()).map(|(c, b)| c * b).sum();
        let v: f64 = self.cy.iter().zip(basis.iter()).map(|(c, b)| c * b).sum();
        self.dst.denormalize(Point::new(u, v))
    }

    /// Jacobian `[[dx'/dx, dx'/dy], [dy'/dx, dy'/dy]]` at `p`.
    pub fn jacobian(&self, p: Point) -> [[f64; 2]; 2] {
        let n = self.src.normalize(p);
        let k = self.src.scale / self.dst.scale;
        let d = |c: &[f64; 6]| {
            let du = c[1] + 2.0 * c[3] * n.x + c[4] * n.y;
            let dv = c[2] + c[4] * n.x + 2.0 * c[5] * n.y;
            (du * k, dv * k)
        };
        let (xu, xv) = d(&self.cx);
        let (yu, yv) = d(&self.cy);
        [[xu, xv], [yu, yv]]
    }

    /// Inverse by Newton iteration from the local linearisation at the
    /// source centre. `None` if the Jacobian goes singular or the iteration
    /// fails to converge.
    pub fn apply_inverse(&self, target: Point) -> Option<Point> {
        let center = Point::new(self.src.cx, self.src.cy);
        let mut p = newton_step(self, center, target)?;
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let next = newton_step(self, p, target)?;
            let step = next.distance(&p);
            p = next;
            if step <= TRANSFORM_TOLERANCE * (1.0 + p.x.abs().max(p.y.abs())) {
                return Some(p);
            }
        }
        None
    }
}

fn newton_step(q: &Quadratic, p: Point, target: Point) -> Option<Point> {
    let f = q.apply(p);
    let [[a, b], [c, d]] = q.jacobian(p);
    let det = a * d - b * c;
    if !det.is_finite() || det.abs() < 1e-300 {
        return None;
    }
    let rx = target.x - f.x;
    let ry = target.y - f.y;
    Some(Point::new(
        p.x + (d * rx - b * ry) / det,
        p.y + (-c * rx + a * ry) / det,
    ))
}

pub(crate) fn quadratic_basis(u: f64, v: f64) -> [f64; 6] {
    [1.0, u, v, u * u, u * v, v * v]
}

/// Pixel-to-pixel geometry, either affine or second-order polynomial.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mapping {
    Affine(Affine),
    Quadratic(Quadratic),
}

impl Default for Mapping {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mapping {
    pub fn identity() -> Self {
        Self::Affine(Affine::identity())
    }

    pub fn apply(&self, p: Point) -> Point {
        match self {
            Self::Affine(a) => a.apply(p),
            Self::Quadratic(q) => q.apply(p),
        }
    }

    /// Map a target-frame point back into the source frame.
    pub fn apply_inverse(&self, p: Point) -> Option<Point> {
        match self {
            Self::Affine(a) => a.inverse().map(|inv| inv.apply(p)),
            Self::Quadratic(q) => q.apply_inverse(p),
        }
    }

    /// First-order approximation around `p`.
    pub fn linearize_at(&self, p: Point) -> Affine {
        match self {
            Self::Affine(a) => *a,
            Self::Quadratic(q) => {
                let [[a, b], [c, d]] = q.jacobian(p);
                let f = q.apply(p);
                Affine::new([a, b, f.x - a * p.x - b * p.y, c, d, f.y - c * p.x - d * p.y])
            }
        }
    }

    pub fn as_affine(&self) -> Option<&Affine> {
        match self {
            Self::Affine(a) => Some(a),
            Self::Quadratic(_) => None,
        }
    }
}

/// A fitted mapping from `source_id`'s pixel grid onto `target_id`'s.
///
/// Never mutated after creation; a refit produces a new value.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    source_id: String,
    target_id: String,
    model: TransformModel,
    mapping: Mapping,
    residual_rms: f64,
    matched_pairs: usize,
    rejected_pairs: usize,
    iterations: usize,
}

impl Transform {
    /// Identity transform, used for the reference frame onto itself.
    pub fn identity(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::from_mapping(
            source_id,
            target_id,
            TransformModel::Similarity,
            Mapping::identity(),
        )
    }

    /// Wrap a known mapping, with no fit statistics.
    pub fn from_mapping(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        model: TransformModel,
        mapping: Mapping,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            model,
            mapping,
            residual_rms: 0.0,
            matched_pairs: 0,
            rejected_pairs: 0,
            iterations: 0,
        }
    }

    pub(crate) fn fitted(
        source_id: &str,
        target_id: &str,
        model: TransformModel,
        mapping: Mapping,
        stats: FitStats,
    ) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            model,
            mapping,
            residual_rms: stats.residual_rms,
            matched_pairs: stats.matched_pairs,
            rejected_pairs: stats.rejected_pairs,
            iterations: stats.iterations,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn model(&self) -> TransformModel {
        self.model
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// RMS distance (pixels) between mapped source points and their matches.
    pub fn residual_rms(&self) -> f64 {
        self.residual_rms
    }

    pub fn matched_pairs(&self) -> usize {
        self.matched_pairs
    }

    pub fn rejected_pairs(&self) -> usize {
        self.rejected_pairs
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn apply(&self, p: Point) -> Point {
        self.mapping.apply(p)
    }

    pub fn apply_inverse(&self, p: Point) -> Option<Point> {
        self.mapping.apply_inverse(p)
    }

    /// Translation at the source origin, i.e. where pixel (0, 0) lands.
    pub fn translation(&self) -> (f64, f64) {
        let p = self.apply(Point::default());
        (p.x, p.y)
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lin = self.mapping.linearize_at(Point::default());
        let (dx, dy) = lin.translation_components();
        write!(
            f,
            "{} {} -> {} (dx={:.3}, dy={:.3}, rot={:.4}°, scale={:.5}, rms={:.3}px, n={})",
            self.model,
            self.source_id,
            self.target_id,
            dx,
            dy,
            lin.rotation().to_degrees(),
            lin.scale(),
            self.residual_rms,
            self.matched_pairs
        )
    }
}

/// Fit bookkeeping carried into a [`Transform`].
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FitStats {
    pub residual_rms: f64,
    pub matched_pairs: usize,
    pub rejected_pairs: usize,
    pub iterations: usize,
}
