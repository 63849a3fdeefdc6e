//! Borrowed views of packed 3-channel images handed over by acquisition

use std::fmt;

/// Channel order of a packed 8-bit 3-channel image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb24,
    Bgr24,
}

impl PixelLayout {
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Byte offsets of the red, green and blue channels inside one pixel
    pub(crate) const fn channel_offsets(&self) -> (usize, usize, usize) {
        match self {
            PixelLayout::Rgb24 => (0, 1, 2),
            PixelLayout::Bgr24 => (2, 1, 0),
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelLayout::Rgb24 => write!(f, "RGB24"),
            PixelLayout::Bgr24 => write!(f, "BGR24"),
        }
    }
}

/// A packed image borrowed from the caller for the duration of one submit.
///
/// `stride` is the distance in bytes between the starts of two rows and may
/// exceed `width * 3` when the source pads its rows.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub layout: PixelLayout,
    pub data: &'a [u8],
}

impl<'a> ImageView<'a> {
    pub fn new(
        width: u32,
        height: u32,
        stride: usize,
        layout: PixelLayout,
        data: &'a [u8],
    ) -> Self {
        Self {
            width,
            height,
            stride,
            layout,
            data,
        }
    }

    /// Tightly packed RGB image (`stride == width * 3`)
    pub fn packed_rgb(width: u32, height: u32, data: &'a [u8]) -> Self {
        Self::new(
            width,
            height,
            width as usize * PixelLayout::BYTES_PER_PIXEL,
            PixelLayout::Rgb24,
            data,
        )
    }

    /// Bytes of pixel data in one row, padding excluded
    pub fn row_bytes(&self) -> usize {
        self.width as usize * PixelLayout::BYTES_PER_PIXEL
    }

    /// Smallest buffer able to hold every row; the last row needs no padding
    pub fn min_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride * (self.height as usize - 1) + self.row_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_rgb() {
        let data = vec![0u8; 4 * 2 * 3];
        let img = ImageView::packed_rgb(4, 2, &data);
        assert_eq!(img.stride, 12);
        assert_eq!(img.row_bytes(), 12);
        assert_eq!(img.min_len(), 24);
    }

    #[test]
    fn test_min_len_with_padding() {
        let data = vec![0u8; 16 * 3];
        let img = ImageView::new(4, 3, 16, PixelLayout::Bgr24, &data);
        // two padded rows + one bare row
        assert_eq!(img.min_len(), 16 * 2 + 12);
    }

    #[test]
    fn test_channel_offsets() {
        assert_eq!(PixelLayout::Rgb24.channel_offsets(), (0, 1, 2));
        assert_eq!(PixelLayout::Bgr24.channel_offsets(), (2, 1, 0));
    }
}
