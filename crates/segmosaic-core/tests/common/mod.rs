use ndarray::Array2;

use segmosaic_core::detect::Centroid;
use segmosaic_core::frame::ImageFrame;
use segmosaic_core::transform::Point;

/// Deterministic linear congruential generator for reproducible noise.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407))
    }

    /// Uniform in (0, 1].
    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64 + 1.0) / (1u64 << 53) as f64
    }

    /// Standard normal sample (Box-Muller).
    pub fn gaussian(&mut self) -> f64 {
        let u1 = self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Flat background with Gaussian read noise.
pub fn noise_image(height: usize, width: usize, background: f64, sigma: f64, seed: u64) -> Array2<f32> {
    let mut rng = Lcg::new(seed);
    Array2::from_shape_fn((height, width), |_| (background + sigma * rng.gaussian()) as f32)
}

/// Add a circular Gaussian source centred on `(x, y)` = (column, row).
pub fn add_gaussian(data: &mut Array2<f32>, x: f64, y: f64, sigma: f64, amplitude: f64) {
    let inv = 1.0 / (2.0 * sigma * sigma);
    for ((row, col), v) in data.indexed_iter_mut() {
        let d2 = (col as f64 - x).powi(2) + (row as f64 - y).powi(2);
        *v += (amplitude * (-d2 * inv).exp()) as f32;
    }
}

/// Frame with Gaussian sources at `sources` shifted by `offset`.
pub fn star_frame(
    id: &str,
    size: (usize, usize),
    sources: &[(f64, f64)],
    offset: (f64, f64),
    seed: u64,
) -> ImageFrame {
    let (h, w) = size;
    let mut data = noise_image(h, w, 100.0, 2.0, seed);
    for &(x, y) in sources {
        add_gaussian(&mut data, x + offset.0, y + offset.1, 1.5, 1000.0);
    }
    ImageFrame::new(id, data)
}

/// `n` points inside `[margin, extent - margin)` on both axes, at least
/// `min_separation` apart.
pub fn scatter_points(n: usize, extent: f64, margin: f64, min_separation: f64, seed: u64) -> Vec<Point> {
    let mut rng = Lcg::new(seed);
    let mut points: Vec<Point> = Vec::with_capacity(n);
    while points.len() < n {
        let p = Point::new(
            margin + rng.next_f64() * (extent - 2.0 * margin),
            margin + rng.next_f64() * (extent - 2.0 * margin),
        );
        if points.iter().all(|q| q.distance(&p) >= min_separation) {
            points.push(p);
        }
    }
    points
}

/// Accepted centroids at the given positions, brightest first.
pub fn centroids_at(frame_id: &str, points: &[Point]) -> Vec<Centroid> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| Centroid {
            frame_id: frame_id.to_string(),
            x: p.x,
            y: p.y,
            amplitude: 1000.0 - i as f64,
            flux: 10_000.0,
            fwhm: 3.0,
            residual: 0.01,
            quality: 0.99,
            rejection: None,
        })
        .collect()
}
