use bytes::Bytes;
use openh264::encoder::{
    BitRate, Encoder, EncoderConfig, FrameRate, FrameType, IntraFramePeriod, RateControlMode,
    UsageType,
};
use openh264::OpenH264API;

use super::{EncodedPacket, EncoderError, EncoderSettings, VideoEncoder};
use crate::frame::FrameBuffer;
use crate::timebase::TimeBase;

enum CodecState {
    Unconfigured,
    Open {
        encoder: Box<Encoder>,
        settings: EncoderSettings,
    },
    Closed,
}

/// H.264 Constrained Baseline encoder backed by Cisco's openh264.
///
/// Tuned for live camera input: realtime usage profile, bitrate rate control
/// and frame skipping disabled so every submitted frame yields an access unit.
pub struct H264Encoder {
    state: CodecState,
    frames_encoded: u64,
}

impl H264Encoder {
    pub fn new() -> Self {
        Self {
            state: CodecState::Unconfigured,
            frames_encoded: 0,
        }
    }

    fn build_config(settings: &EncoderSettings) -> EncoderConfig {
        EncoderConfig::new()
            .bitrate(BitRate::from_bps(settings.bitrate))
            .max_frame_rate(FrameRate::from_hz(settings.frame_rate as f32))
            .rate_control_mode(RateControlMode::Bitrate)
            .usage_type(UsageType::CameraVideoRealTime)
            .intra_frame_period(IntraFramePeriod::from_num_frames(settings.gop_size))
            .skip_frames(false)
    }
}

impl Default for H264Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoEncoder for H264Encoder {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<(), EncoderError> {
        match self.state {
            CodecState::Unconfigured => {}
            CodecState::Open { .. } => return Err(EncoderError::AlreadyConfigured),
            CodecState::Closed => return Err(EncoderError::Closed),
        }
        settings.validate()?;

        let config = Self::build_config(settings);
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)?;

        log::info!(
            "H.264 encoder configured: {}x{} @ {} fps, bitrate={} bps, gop={}",
            settings.width,
            settings.height,
            settings.frame_rate,
            settings.bitrate,
            settings.gop_size
        );

        self.state = CodecState::Open {
            encoder: Box::new(encoder),
            settings: *settings,
        };
        Ok(())
    }

    fn time_base(&self) -> TimeBase {
        match &self.state {
            CodecState::Open { settings, .. } => TimeBase::per_frame(settings.frame_rate),
            _ => TimeBase::new(0, 1),
        }
    }

    fn encode(&mut self, frame: &FrameBuffer) -> Result<Vec<EncodedPacket>, EncoderError> {
        let (encoder, settings) = match &mut self.state {
            CodecState::Open { encoder, settings } => (encoder, settings),
            CodecState::Unconfigured => return Err(EncoderError::NotConfigured),
            CodecState::Closed => return Err(EncoderError::Closed),
        };

        if frame.width() != settings.width || frame.height() != settings.height {
            return Err(EncoderError::FrameMismatch {
                width: settings.width,
                height: settings.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        let bitstream = encoder.encode(frame)?;
        let frame_type = bitstream.frame_type();
        if matches!(frame_type, FrameType::Skip | FrameType::Invalid) {
            log::debug!("Encoder produced no output for pts={}", frame.pts);
            return Ok(Vec::new());
        }

        let data = bitstream.to_vec();
        if data.is_empty() {
            return Ok(Vec::new());
        }
        self.frames_encoded += 1;

        Ok(vec![EncodedPacket {
            data: Bytes::from(data),
            pts: frame.pts,
            keyframe: matches!(frame_type, FrameType::IDR | FrameType::I),
        }])
    }

    fn close(&mut self) {
        if let CodecState::Open { .. } = self.state {
            log::debug!("Closing H.264 encoder after {} frames", self.frames_encoded);
        }
        self.state = CodecState::Closed;
    }
}
