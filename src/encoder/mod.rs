//! Video encoder abstraction

mod h264;

pub use h264::H264Encoder;

use bytes::Bytes;
use thiserror::Error;

use crate::frame::FrameBuffer;
use crate::timebase::TimeBase;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("codec error: {0}")]
    Codec(#[from] openh264::Error),

    #[error("encoder used before configure")]
    NotConfigured,

    #[error("encoder already configured")]
    AlreadyConfigured,

    #[error("encoder closed")]
    Closed,

    #[error("invalid encoder settings: {0}")]
    InvalidSettings(String),

    #[error("frame {actual_width}x{actual_height} does not match configured {width}x{height}")]
    FrameMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Parameters fixed on the first frame of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Frames between two IDR frames
    pub gop_size: u32,
}

impl EncoderSettings {
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncoderError::InvalidSettings(format!(
                "dimensions must be > 0, got {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(EncoderError::InvalidSettings("frame rate must be > 0".into()));
        }
        if self.bitrate == 0 {
            return Err(EncoderError::InvalidSettings("bitrate must be > 0".into()));
        }
        if self.gop_size == 0 {
            return Err(EncoderError::InvalidSettings("GOP size must be > 0".into()));
        }
        Ok(())
    }
}

/// One compressed access unit in Annex-B framing
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub data: Bytes,
    /// Presentation timestamp carried over from the source frame
    pub pts: i64,
    pub keyframe: bool,
}

/// A stateful codec session.
///
/// `configure` runs exactly once; `encode` may hand back no packet when the
/// codec holds the frame back, or several when it flushes.
pub trait VideoEncoder {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<(), EncoderError>;

    /// Clock the encoder reasons in; valid after `configure`
    fn time_base(&self) -> TimeBase;

    fn encode(&mut self, frame: &FrameBuffer) -> Result<Vec<EncodedPacket>, EncoderError>;

    /// Stops the codec; the encoder no longer touches frame memory afterwards.
    fn close(&mut self);
}
