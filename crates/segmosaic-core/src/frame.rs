use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::{MosaicError, Result};
use crate::transform::Mapping;

/// One calibrated detector image plus its coordinate metadata.
///
/// Pixel data is row-major, shape = (height, width). The optional mask marks
/// invalid or saturated pixels with `true`. A frame never changes after
/// construction.
#[derive(Clone, Debug)]
pub struct ImageFrame {
    id: String,
    data: Array2<f32>,
    mask: Option<Array2<bool>>,
    pixel_to_reference: Mapping,
    metadata: FrameMetadata,
}

/// Exposure bookkeeping carried alongside a frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMetadata {
    pub exposure_id: Option<String>,
    pub segment_id: Option<String>,
    pub timestamp_us: Option<u64>,
    /// Any further header keywords the loader chose to keep.
    pub extra: BTreeMap<String, String>,
}

impl ImageFrame {
    /// Create an unmasked frame with an identity pixel-to-reference mapping.
    pub fn new(id: impl Into<String>, data: Array2<f32>) -> Self {
        Self {
            id: id.into(),
            data,
            mask: None,
            pixel_to_reference: Mapping::identity(),
            metadata: FrameMetadata::default(),
        }
    }

    /// Attach an invalid-pixel mask. Fails if its shape differs from the data.
    pub fn with_mask(mut self, mask: Array2<bool>) -> Result<Self> {
        if mask.dim() != self.data.dim() {
            let (mh, mw) = mask.dim();
            return Err(MosaicError::invalid_frame(
                &self.id,
                format!(
                    "mask is {}x{} but data is {}x{}",
                    mw,
                    mh,
                    self.width(),
                    self.height()
                ),
            ));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn with_pixel_to_reference(mut self, mapping: Mapping) -> Self {
        self.pixel_to_reference = mapping;
        self
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn mask(&self) -> Option<&Array2<bool>> {
        self.mask.as_ref()
    }

    pub fn pixel_to_reference(&self) -> &Mapping {
        &self.pixel_to_reference
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when the pixel is inside the frame and not masked.
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        if row >= self.height() || col >= self.width() {
            return false;
        }
        match &self.mask {
            Some(mask) => !mask[[row, col]],
            None => true,
        }
    }

    pub fn valid_pixel_count(&self) -> usize {
        match &self.mask {
            Some(mask) => mask.iter().filter(|&&m| !m).count(),
            None => self.data.len(),
        }
    }

    /// Values of all unmasked pixels, in row-major order.
    pub fn valid_values(&self) -> Vec<f32> {
        match &self.mask {
            Some(mask) => self
                .data
                .iter()
                .zip(mask.iter())
                .filter(|(_, &m)| !m)
                .map(|(&v, _)| v)
                .collect(),
            None => self.data.iter().copied().collect(),
        }
    }
}
