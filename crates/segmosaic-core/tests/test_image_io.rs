use approx::assert_abs_diff_eq;
use ndarray::Array2;

use segmosaic_core::error::MosaicError;
use segmosaic_core::frame::ImageFrame;
use segmosaic_core::io::{load_frame, save_mosaic};
use segmosaic_core::mosaic::{composite, GridBounds, GridSpec, Interpolation};
use segmosaic_core::transform::Transform;

fn gradient_frame() -> ImageFrame {
    ImageFrame::new(
        "grad",
        Array2::from_shape_fn((16, 24), |(r, c)| 100.0 + (r * 24 + c) as f32),
    )
}

#[test]
fn test_save_and_reload_preview_tiff() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mosaic.tif");

    let result = composite(
        &[gradient_frame()],
        &[Transform::identity("grad", "grad")],
        &GridSpec::default(),
        Interpolation::Bilinear,
    )
    .unwrap();
    save_mosaic(&result, &path).unwrap();
    assert!(path.exists());

    let frame = load_frame(&path, "preview").unwrap();
    assert_eq!(frame.id(), "preview");
    assert_eq!((frame.width(), frame.height()), (24, 16));

    // Stretched over the covered range.
    assert_abs_diff_eq!(frame.data()[[0, 0]], 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(frame.data()[[15, 23]], 1.0, epsilon = 1e-6);
    let expected_mid = (8 * 24 + 12) as f32 / 383.0;
    assert_abs_diff_eq!(frame.data()[[8, 12]], expected_mid, epsilon = 1e-4);
}

#[test]
fn test_uncovered_pixels_written_as_zero_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.png");

    let spec = GridSpec {
        pixel_scale: 1.0,
        bounds: GridBounds::Explicit {
            x_min: 0.0,
            y_min: 0.0,
            width: 30,
            height: 16,
        },
    };
    let result = composite(
        &[gradient_frame()],
        &[Transform::identity("grad", "grad")],
        &spec,
        Interpolation::Nearest,
    )
    .unwrap();
    assert!(!result.has_coverage(0, 29));
    save_mosaic(&result, &path).unwrap();

    let frame = load_frame(&path, "png").unwrap();
    assert_eq!((frame.width(), frame.height()), (30, 16));
    assert_eq!(frame.data()[[0, 29]], 0.0);
    assert_abs_diff_eq!(frame.data()[[15, 23]], 1.0, epsilon = 1e-6);
}

#[test]
fn test_load_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_frame(&dir.path().join("nope.png"), "x").unwrap_err();
    assert!(matches!(err, MosaicError::ImageError(_) | MosaicError::Io(_)));
}
