//! Packed RGB/BGR → I420 conversion (BT.601, limited range)

use thiserror::Error;

use crate::frame::FrameBuffer;
use crate::image::{ImageView, PixelLayout};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConvertError {
    #[error("invalid dimensions {width}x{height}: must be non-zero and even")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("stride {stride} is shorter than a {row_bytes} byte row")]
    StrideTooSmall { stride: usize, row_bytes: usize },

    #[error("image is {actual} bytes, {expected} needed for its declared stride")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("image {actual_width}x{actual_height} does not match configured {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("image stride {actual} does not match configured stride {expected}")]
    StrideMismatch { expected: usize, actual: usize },

    #[error("pixel layout {actual} does not match configured {expected}")]
    LayoutMismatch {
        expected: PixelLayout,
        actual: PixelLayout,
    },

    #[error("frame buffer is {actual_width}x{actual_height}, converter targets {width}x{height}")]
    DestinationMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Converter bound to one source geometry.
///
/// Built once from the first image of a session; every later image must have
/// the same dimensions, stride and layout. Mismatches are rejected instead of
/// producing a sheared picture.
#[derive(Debug, Clone)]
pub struct ColorConverter {
    width: u32,
    height: u32,
    src_stride: usize,
    layout: PixelLayout,
}

impl ColorConverter {
    pub fn new(source: &ImageView<'_>) -> Result<Self, ConvertError> {
        let (width, height) = (source.width, source.height);
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(ConvertError::InvalidDimensions { width, height });
        }
        validate_geometry(source)?;

        log::debug!(
            "Color converter {} {}x{} stride {} -> I420",
            source.layout,
            width,
            height,
            source.stride
        );

        Ok(Self {
            width,
            height,
            src_stride: source.stride,
            layout: source.layout,
        })
    }

    /// Converts `source` into `dest`, overwriting all three planes.
    pub fn convert(
        &self,
        source: &ImageView<'_>,
        dest: &mut FrameBuffer,
    ) -> Result<(), ConvertError> {
        self.check_source(source)?;
        if dest.width() != self.width || dest.height() != self.height {
            return Err(ConvertError::DestinationMismatch {
                width: self.width,
                height: self.height,
                actual_width: dest.width(),
                actual_height: dest.height(),
            });
        }

        let w = self.width as usize;
        let h = self.height as usize;
        let stride = self.src_stride;
        let row_bytes = w * PixelLayout::BYTES_PER_PIXEL;
        let (ri, gi, bi) = self.layout.channel_offsets();
        let uv_width = w / 2;

        let (y_plane, u_plane, v_plane) = dest.planes_mut();

        for row in (0..h).step_by(2) {
            let top = &source.data[row * stride..row * stride + row_bytes];
            let bottom = &source.data[(row + 1) * stride..(row + 1) * stride + row_bytes];

            for col in (0..w).step_by(2) {
                let mut sum_u: i32 = 0;
                let mut sum_v: i32 = 0;

                for (dy, line) in [top, bottom].into_iter().enumerate() {
                    for dx in 0..2usize {
                        let px = (col + dx) * PixelLayout::BYTES_PER_PIXEL;
                        let r = i32::from(line[px + ri]);
                        let g = i32::from(line[px + gi]);
                        let b = i32::from(line[px + bi]);

                        let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
                        y_plane[(row + dy) * w + col + dx] = y_val.clamp(0, 255) as u8;

                        sum_u += (-38 * r - 74 * g + 112 * b + 128) >> 8;
                        sum_v += (112 * r - 94 * g - 18 * b + 128) >> 8;
                    }
                }

                let uv_idx = (row / 2) * uv_width + (col / 2);
                u_plane[uv_idx] = ((sum_u / 4) + 128).clamp(0, 255) as u8;
                v_plane[uv_idx] = ((sum_v / 4) + 128).clamp(0, 255) as u8;
            }
        }

        Ok(())
    }

    fn check_source(&self, source: &ImageView<'_>) -> Result<(), ConvertError> {
        if source.width != self.width || source.height != self.height {
            return Err(ConvertError::DimensionMismatch {
                width: self.width,
                height: self.height,
                actual_width: source.width,
                actual_height: source.height,
            });
        }
        if source.stride != self.src_stride {
            return Err(ConvertError::StrideMismatch {
                expected: self.src_stride,
                actual: source.stride,
            });
        }
        if source.layout != self.layout {
            return Err(ConvertError::LayoutMismatch {
                expected: self.layout,
                actual: source.layout,
            });
        }
        validate_geometry(source)
    }
}

fn validate_geometry(source: &ImageView<'_>) -> Result<(), ConvertError> {
    let row_bytes = source.row_bytes();
    if source.stride < row_bytes {
        return Err(ConvertError::StrideTooSmall {
            stride: source.stride,
            row_bytes,
        });
    }
    let expected = source.min_len();
    if source.data.len() < expected {
        return Err(ConvertError::BufferTooSmall {
            expected,
            actual: source.data.len(),
        });
    }
    Ok(())
}
