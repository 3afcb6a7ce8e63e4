#[allow(dead_code)]
mod common;

use segmosaic_core::error::MosaicError;
use segmosaic_core::frame::ImageFrame;
use segmosaic_core::register::{
    estimate_translation, match_nearest, match_triangles, register, translation_prior, RegistrationConfig,
    TriangleMatchConfig,
};
use segmosaic_core::transform::fit::fit_mapping;
use segmosaic_core::transform::{Affine, Mapping, Point, TransformModel};

use common::{add_gaussian, centroids_at, noise_image, scatter_points};

fn affine_config() -> RegistrationConfig {
    RegistrationConfig {
        model: TransformModel::Affine,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Affine round trip
// ---------------------------------------------------------------------------

#[test]
fn test_mild_affine_recovered_without_prior() {
    let truth = Affine::new([1.004, 0.003, 4.2, -0.002, 0.997, -2.7]);
    let reference_points = scatter_points(14, 100.0, 8.0, 10.0, 42);
    let frame_points: Vec<Point> = reference_points.iter().map(|p| truth.apply(*p)).collect();

    let source = centroids_at("frame", &frame_points);
    let target = centroids_at("reference", &reference_points);
    let transform = register(&source, &target, None, &affine_config()).unwrap();

    assert_eq!(transform.source_id(), "frame");
    assert_eq!(transform.target_id(), "reference");
    assert_eq!(transform.model(), TransformModel::Affine);
    assert_eq!(transform.matched_pairs(), 14);
    assert!(transform.residual_rms() < 1e-6);

    let expected = truth.inverse().unwrap();
    let fitted = transform.mapping().as_affine().unwrap();
    assert!(fitted.approx_eq(&expected, 1e-6), "{fitted:?} vs {expected:?}");

    for p in &frame_points {
        let back = transform.apply_inverse(transform.apply(*p)).unwrap();
        assert!(back.distance(p) < 1e-6);
    }
}

#[test]
fn test_rotated_affine_with_prior() {
    let truth = Affine::similarity(1.02, 5f64.to_radians(), -12.5, 8.25)
        .compose(&Affine::new([1.0, 0.01, 0.0, 0.0, 1.0, 0.0]));
    let frame_points = scatter_points(20, 200.0, 10.0, 12.0, 7);
    let reference_points: Vec<Point> = frame_points.iter().map(|p| truth.apply(*p)).collect();

    // Prior is off by a pixel in translation.
    let mut prior = truth;
    prior.m[2] += 1.0;
    let prior = Mapping::Affine(prior);

    let transform = register(
        &centroids_at("f", &frame_points),
        &centroids_at("r", &reference_points),
        Some(&prior),
        &affine_config(),
    )
    .unwrap();

    assert_eq!(transform.matched_pairs(), 20);
    let fitted = transform.mapping().as_affine().unwrap();
    assert!(fitted.approx_eq(&truth, 1e-6));
    assert!((fitted.scale() - truth.scale()).abs() < 1e-9);
}

#[test]
fn test_similarity_default_model() {
    let truth = Affine::similarity(0.98, -0.03, 3.3, -1.7);
    let frame_points = scatter_points(10, 120.0, 10.0, 12.0, 99);
    let reference_points: Vec<Point> = frame_points.iter().map(|p| truth.apply(*p)).collect();

    let transform = register(
        &centroids_at("f", &frame_points),
        &centroids_at("r", &reference_points),
        None,
        &RegistrationConfig::default(),
    )
    .unwrap();

    assert_eq!(transform.model(), TransformModel::Similarity);
    let fitted = transform.mapping().as_affine().unwrap();
    assert!(fitted.approx_eq(&truth, 1e-6));
    assert!((fitted.rotation() + 0.03).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Outliers and rejected centroids
// ---------------------------------------------------------------------------

#[test]
fn test_spurious_sources_are_not_matched() {
    let truth = Affine::translation(3.0, -2.0);
    let frame_points = scatter_points(12, 100.0, 10.0, 10.0, 5);
    let mut reference_points: Vec<Point> = frame_points.iter().map(|p| truth.apply(*p)).collect();
    // Moved source: matched by proximity but inconsistent with the rest.
    reference_points[4].x += 1.2;

    let transform = register(
        &centroids_at("f", &frame_points),
        &centroids_at("r", &reference_points),
        Some(&Mapping::Affine(truth)),
        &RegistrationConfig::default(),
    )
    .unwrap();

    assert!(transform.rejected_pairs() >= 1);
    assert!(transform.residual_rms() < 1e-6);
    let (dx, dy) = transform.translation();
    assert!((dx - 3.0).abs() < 1e-6 && (dy + 2.0).abs() < 1e-6);
}

#[test]
fn test_flagged_centroids_are_ignored() {
    let truth = Affine::translation(1.0, 1.0);
    let frame_points = scatter_points(6, 80.0, 10.0, 10.0, 3);
    let reference_points: Vec<Point> = frame_points.iter().map(|p| truth.apply(*p)).collect();

    let mut source = centroids_at("f", &frame_points);
    for c in source.iter_mut().skip(1) {
        c.rejection = Some(segmosaic_core::detect::Rejection::PoorFit);
    }

    let result = register(
        &source,
        &centroids_at("r", &reference_points),
        Some(&Mapping::Affine(truth)),
        &RegistrationConfig::default(),
    );
    match result {
        Err(MosaicError::InsufficientPoints {
            frame_id,
            required,
            found,
        }) => {
            assert_eq!(frame_id, "f");
            assert_eq!(required, 2);
            assert_eq!(found, 1);
        }
        other => panic!("expected InsufficientPoints, got {other:?}"),
    }
}

#[test]
fn test_no_matches_within_radius() {
    let frame_points = scatter_points(8, 100.0, 10.0, 10.0, 21);
    let reference_points: Vec<Point> = frame_points.iter().map(|p| Point::new(p.x + 200.0, p.y)).collect();

    let result = register(
        &centroids_at("f", &frame_points),
        &centroids_at("r", &reference_points),
        Some(&Mapping::identity()),
        &RegistrationConfig::default(),
    );
    assert!(matches!(result, Err(MosaicError::InsufficientPoints { .. })));
}

#[test]
fn test_outlier_rejection_out_of_iterations() {
    let truth = Affine::translation(2.0, -1.0);
    let frame_points = scatter_points(10, 100.0, 10.0, 10.0, 17);
    let mut reference_points: Vec<Point> = frame_points.iter().map(|p| truth.apply(*p)).collect();
    reference_points[3].x += 1.5;

    // One pass drops the displaced pair but leaves no budget to refit.
    let config = RegistrationConfig {
        max_iterations: 1,
        ..Default::default()
    };
    let result = register(
        &centroids_at("f", &frame_points),
        &centroids_at("r", &reference_points),
        Some(&Mapping::Affine(truth)),
        &config,
    );
    match result {
        Err(MosaicError::NoConvergence { frame_id, iterations }) => {
            assert_eq!(frame_id, "f");
            assert_eq!(iterations, 1);
        }
        other => panic!("expected NoConvergence, got {other:?}"),
    }

    // The default budget converges on the same data.
    let transform = register(
        &centroids_at("f", &frame_points),
        &centroids_at("r", &reference_points),
        Some(&Mapping::Affine(truth)),
        &RegistrationConfig::default(),
    )
    .unwrap();
    assert!(transform.rejected_pairs() >= 1);
    assert_eq!(transform.matched_pairs() + transform.rejected_pairs(), 10);
    assert!(transform.residual_rms() < 1e-6);
}

#[test]
fn test_invalid_registration_config() {
    let points = scatter_points(5, 50.0, 5.0, 5.0, 1);
    let config = RegistrationConfig {
        max_iterations: 0,
        ..Default::default()
    };
    let result = register(&centroids_at("f", &points), &centroids_at("r", &points), None, &config);
    assert!(matches!(result, Err(MosaicError::InvalidConfig(_))));
}

// ---------------------------------------------------------------------------
// Quadratic
// ---------------------------------------------------------------------------

#[test]
fn test_quadratic_distortion_recovered() {
    let distort = |p: Point| {
        Point::new(
            p.x + 2.0 + 5e-5 * p.x * p.x,
            p.y - 1.0 + 5e-5 * p.x * p.y,
        )
    };
    let frame_points = scatter_points(16, 100.0, 8.0, 10.0, 77);
    let reference_points: Vec<Point> = frame_points.iter().map(|p| distort(*p)).collect();

    let config = RegistrationConfig {
        model: TransformModel::Quadratic,
        ..Default::default()
    };
    let transform = register(
        &centroids_at("f", &frame_points),
        &centroids_at("r", &reference_points),
        Some(&Mapping::identity()),
        &config,
    )
    .unwrap();

    assert_eq!(transform.model(), TransformModel::Quadratic);
    assert!(matches!(transform.mapping(), Mapping::Quadratic(_)));
    assert_eq!(transform.matched_pairs(), 16);
    assert!(transform.residual_rms() < 1e-6);

    for p in [Point::new(20.0, 30.0), Point::new(55.5, 71.25), Point::new(88.0, 12.0)] {
        assert!(transform.apply(p).distance(&distort(p)) < 1e-6);
        let back = transform.apply_inverse(transform.apply(p)).unwrap();
        assert!(back.distance(&p) < 1e-6);
    }
}

#[test]
fn test_quadratic_needs_six_points() {
    let points = scatter_points(5, 60.0, 5.0, 8.0, 8);
    let config = RegistrationConfig {
        model: TransformModel::Quadratic,
        ..Default::default()
    };
    let result = register(
        &centroids_at("f", &points),
        &centroids_at("r", &points),
        Some(&Mapping::identity()),
        &config,
    );
    assert!(matches!(
        result,
        Err(MosaicError::InsufficientPoints { required: 6, .. })
    ));
}

#[test]
fn test_collinear_points_are_degenerate_for_affine() {
    let points: Vec<Point> = (0..6).map(|i| Point::new(10.0 + 12.0 * i as f64, 20.0)).collect();
    assert!(fit_mapping(TransformModel::Affine, &points, &points).is_none());

    let result = register(
        &centroids_at("f", &points),
        &centroids_at("r", &points),
        Some(&Mapping::identity()),
        &affine_config(),
    );
    assert!(matches!(result, Err(MosaicError::DegenerateGeometry { .. })));
}

// ---------------------------------------------------------------------------
// Correspondence helpers
// ---------------------------------------------------------------------------

#[test]
fn test_triangle_matching_finds_permuted_correspondences() {
    let source = scatter_points(9, 100.0, 5.0, 10.0, 12);
    let truth = Affine::similarity(1.1, 0.4, 20.0, -5.0);
    let mut target: Vec<Point> = source.iter().map(|p| truth.apply(*p)).collect();
    target.reverse();

    let pairs = match_triangles(&source, &target, &TriangleMatchConfig::default());
    assert_eq!(pairs.len(), 9);
    for (i, j) in pairs {
        assert_eq!(j, 8 - i);
    }
}

#[test]
fn test_nearest_neighbour_is_one_to_one() {
    let source = vec![Point::new(10.0, 10.0), Point::new(11.0, 10.0)];
    let target = vec![Point::new(10.4, 10.0)];
    let pairs = match_nearest(&source, &target, &Mapping::identity(), 3.0);
    assert_eq!(pairs, vec![(0, 0)]);
}

// ---------------------------------------------------------------------------
// Phase correlation prior
// ---------------------------------------------------------------------------

fn field(id: &str, offset: (f64, f64), seed: u64) -> ImageFrame {
    let mut data = noise_image(128, 128, 50.0, 1.0, seed);
    for p in scatter_points(25, 128.0, 16.0, 8.0, 64) {
        add_gaussian(&mut data, p.x + offset.0, p.y + offset.1, 1.5, 500.0);
    }
    ImageFrame::new(id, data)
}

#[test]
fn test_phase_correlation_estimates_shift() {
    let reference = field("ref", (0.0, 0.0), 31);
    let target = field("tgt", (6.0, -4.0), 32);

    let (dx, dy) = estimate_translation(&reference, &target).unwrap();
    assert!((dx - 6.0).abs() < 0.5, "dx = {dx}");
    assert!((dy + 4.0).abs() < 0.5, "dy = {dy}");
}

#[test]
fn test_phase_prior_seeds_registration() {
    let truth = (6.0, -4.0);
    let reference = field("ref", (0.0, 0.0), 31);
    let target = field("tgt", truth, 32);

    let prior = translation_prior(&reference, &target).unwrap();
    let reference_points = scatter_points(25, 128.0, 16.0, 8.0, 64);
    let target_points: Vec<Point> = reference_points
        .iter()
        .map(|p| Point::new(p.x + truth.0, p.y + truth.1))
        .collect();

    let transform = register(
        &centroids_at("tgt", &target_points),
        &centroids_at("ref", &reference_points),
        Some(&prior),
        &RegistrationConfig::default(),
    )
    .unwrap();
    let (dx, dy) = transform.translation();
    assert!((dx + 6.0).abs() < 1e-6 && (dy - 4.0).abs() < 1e-6);
}
