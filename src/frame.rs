//! Reusable I420 frame buffer handed to the encoder

use openh264::formats::YUVSource;

/// Slack appended after the last plane so SIMD readers in the codec may
/// overrun the chroma planes without leaving the allocation.
pub const FRAME_PADDING: usize = 64;

/// One planar 4:2:0 frame in a single contiguous allocation.
///
/// Layout: full resolution Y plane, then the quarter resolution U and V
/// planes, then [`FRAME_PADDING`] zero bytes. The buffer is sized once from
/// the session dimensions and overwritten in place for every frame.
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// Presentation timestamp in the output stream time base
    pub pts: i64,
}

impl FrameBuffer {
    /// Bytes needed for a `width` x `height` frame, padding included
    pub fn required_len(width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_dimensions(width, height);
        w * h + 2 * cw * ch + FRAME_PADDING
    }

    pub fn allocate(width: u32, height: u32) -> Self {
        let len = Self::required_len(width, height);
        log::debug!("Allocating {}x{} I420 frame buffer ({} bytes)", width, height, len);
        Self {
            width,
            height,
            data: vec![0u8; len],
            pts: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total allocation, padding included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Start of the allocation; stable for the lifetime of the buffer
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn luma_stride(&self) -> usize {
        self.width as usize
    }

    pub fn chroma_stride(&self) -> usize {
        chroma_dimensions(self.width, self.height).0
    }

    fn plane_lengths(&self) -> (usize, usize) {
        let (cw, ch) = chroma_dimensions(self.width, self.height);
        (self.width as usize * self.height as usize, cw * ch)
    }

    pub fn y_plane(&self) -> &[u8] {
        let (y_len, _) = self.plane_lengths();
        &self.data[..y_len]
    }

    pub fn u_plane(&self) -> &[u8] {
        let (y_len, c_len) = self.plane_lengths();
        &self.data[y_len..y_len + c_len]
    }

    pub fn v_plane(&self) -> &[u8] {
        let (y_len, c_len) = self.plane_lengths();
        &self.data[y_len + c_len..y_len + 2 * c_len]
    }

    /// Mutable Y, U and V planes, split without copying
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let (y_len, c_len) = self.plane_lengths();
        let (y, rest) = self.data.split_at_mut(y_len);
        let (u, rest) = rest.split_at_mut(c_len);
        let (v, _padding) = rest.split_at_mut(c_len);
        (y, u, v)
    }
}

impl YUVSource for FrameBuffer {
    fn dimensions(&self) -> (usize, usize) {
        (self.width as usize, self.height as usize)
    }

    fn strides(&self) -> (usize, usize, usize) {
        let c = self.chroma_stride();
        (self.luma_stride(), c, c)
    }

    fn y(&self) -> &[u8] {
        self.y_plane()
    }

    fn u(&self) -> &[u8] {
        self.u_plane()
    }

    fn v(&self) -> &[u8] {
        self.v_plane()
    }
}

pub(crate) fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    ((width as usize + 1) / 2, (height as usize + 1) / 2)
}
