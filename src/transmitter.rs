//! Frame transmitter: lazy session setup, per-frame pipeline, ordered teardown

use std::path::PathBuf;
use std::time::Instant;

use crate::config::Config;
use crate::convert::ColorConverter;
use crate::encoder::{EncoderSettings, H264Encoder, VideoEncoder};
use crate::error::{StageError, TransmitterError};
use crate::frame::FrameBuffer;
use crate::image::ImageView;
use crate::notifier::{FrameNotifier, ZmqNotifier};
use crate::output::{OutputStream, PacketSink, StreamSettings, UdpSink};
use crate::stats::TransmitterStats;

/// Which stage poisoned a failed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    Encoding,
}

impl FailureKind {
    fn error(self, source: StageError) -> TransmitterError {
        match self {
            FailureKind::Configuration => TransmitterError::Configuration(source),
            FailureKind::Encoding => TransmitterError::Encoding(source),
        }
    }
}

/// Observable lifecycle of a transmitter session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No frame seen yet
    Unconfigured,
    /// First frame is setting up codec and stream
    Configuring,
    /// Accepting frames
    Ready,
    /// A fatal error happened; every later submit fails with the same kind
    Failed(FailureKind),
    /// Torn down
    Closed,
}

/// Per-session resources that exist only once the first frame fixed the
/// geometry.
struct Pipeline {
    converter: ColorConverter,
    frame: FrameBuffer,
}

enum Session {
    Unconfigured,
    Configuring,
    Ready(Pipeline),
    Failed {
        kind: FailureKind,
        pipeline: Option<Pipeline>,
    },
    Closed,
}

#[derive(Debug, Clone)]
struct SessionOptions {
    frame_rate: u32,
    bitrate: u32,
    gop_size: u32,
    sdp_path: Option<PathBuf>,
}

/// Encodes submitted images and streams them, one session per instance.
///
/// The first call to [`submit`](Self::submit) configures the encoder and
/// output stream from the image dimensions. Teardown runs on
/// [`shutdown`](Self::shutdown) or drop and releases resources in dependency
/// order: stream trailer, frame buffer, encoder, sink I/O, output stream,
/// notifier.
pub struct Transmitter<E = H264Encoder, S = UdpSink, N = ZmqNotifier>
where
    E: VideoEncoder,
    S: PacketSink,
    N: FrameNotifier,
{
    session: Session,
    options: SessionOptions,

    encoder: Option<E>,
    output: Option<OutputStream<S>>,
    notifier: Option<N>,

    pts_increment: i64,
    pts: i64,

    stats: TransmitterStats,
    started: Instant,
}

impl Transmitter {
    /// Binds the RTP socket and the notifier endpoint.
    ///
    /// Codec and stream stay unconfigured until the first frame arrives.
    pub fn new(config: &Config) -> Result<Self, TransmitterError> {
        config.validate().map_err(TransmitterError::initialization)?;

        let sink = UdpSink::bind(&config.stream.local_bind, &config.stream.destination)
            .map_err(TransmitterError::initialization)?;
        let notifier = ZmqNotifier::bind(&config.notifier.host, config.notifier.port)
            .map_err(TransmitterError::initialization)?;

        Self::with_parts(config, H264Encoder::new(), sink, notifier)
    }
}

impl<E, S, N> Transmitter<E, S, N>
where
    E: VideoEncoder,
    S: PacketSink,
    N: FrameNotifier,
{
    /// Assembles a transmitter from already constructed parts
    pub fn with_parts(
        config: &Config,
        encoder: E,
        sink: S,
        notifier: N,
    ) -> Result<Self, TransmitterError> {
        config.validate().map_err(TransmitterError::initialization)?;

        let stream_settings = StreamSettings {
            payload_type: config.stream.payload_type,
            ssrc: config.stream.ssrc,
            mtu: config.stream.mtu,
            session_name: config.stream.session_name.clone(),
        };

        Ok(Self {
            session: Session::Unconfigured,
            options: SessionOptions {
                frame_rate: config.session.frame_rate,
                bitrate: config.session.bitrate,
                gop_size: config.session.gop_size,
                sdp_path: config.sdp_path().map(PathBuf::from),
            },
            encoder: Some(encoder),
            output: Some(OutputStream::new(sink, stream_settings)),
            notifier: Some(notifier),
            pts_increment: 0,
            pts: 0,
            stats: TransmitterStats::default(),
            started: Instant::now(),
        })
    }

    /// Encodes one image and streams it.
    ///
    /// Configures the session on the first call. A configuration or
    /// encode/write failure is fatal: the session moves to
    /// [`SessionState::Failed`] and every later call fails with the same
    /// kind. An image that does not match the configured geometry is rejected
    /// with [`TransmitterError::Encoding`] but leaves the session usable.
    pub fn submit(&mut self, image: &ImageView<'_>) -> Result<(), TransmitterError> {
        self.stats.frames_submitted += 1;

        match self.state() {
            SessionState::Unconfigured => self.configure(image)?,
            SessionState::Ready => {}
            SessionState::Failed(kind) => return Err(kind.error(StageError::SessionFailed)),
            SessionState::Configuring => {
                return Err(TransmitterError::configuration(StageError::SessionFailed))
            }
            SessionState::Closed => return Err(TransmitterError::encoding(StageError::Closed)),
        }

        self.transmit(image)
    }

    pub fn state(&self) -> SessionState {
        match &self.session {
            Session::Unconfigured => SessionState::Unconfigured,
            Session::Configuring => SessionState::Configuring,
            Session::Ready(_) => SessionState::Ready,
            Session::Failed { kind, .. } => SessionState::Failed(*kind),
            Session::Closed => SessionState::Closed,
        }
    }

    pub fn stats(&self) -> TransmitterStats {
        let mut stats = self.stats.clone();
        if let Some(output) = &self.output {
            stats.bytes_sent = output.bytes_sent();
        }
        stats
    }

    /// The session's frame buffer, once configured
    pub fn frame_buffer(&self) -> Option<&FrameBuffer> {
        match &self.session {
            Session::Ready(pipeline) => Some(&pipeline.frame),
            Session::Failed { pipeline, .. } => pipeline.as_ref().map(|p| &p.frame),
            _ => None,
        }
    }

    /// Timestamp advance per frame in 90kHz ticks; 0 until configured
    pub fn pts_increment(&self) -> i64 {
        self.pts_increment
    }

    pub fn notifier(&self) -> Option<&N> {
        self.notifier.as_ref()
    }

    /// Tears the session down and returns the final statistics
    pub fn shutdown(mut self) -> TransmitterStats {
        self.teardown();
        self.stats.clone()
    }

    fn configure(&mut self, image: &ImageView<'_>) -> Result<(), TransmitterError> {
        self.session = Session::Configuring;

        match self.open_pipeline(image) {
            Ok(pipeline) => {
                self.session = Session::Ready(pipeline);
                self.stats.configurations += 1;
                Ok(())
            }
            Err(e) => {
                log::error!("Session configuration failed: {}", e);
                self.session = Session::Failed {
                    kind: FailureKind::Configuration,
                    pipeline: None,
                };
                Err(TransmitterError::Configuration(e))
            }
        }
    }

    fn open_pipeline(&mut self, image: &ImageView<'_>) -> Result<Pipeline, StageError> {
        // Validates the first image before any codec state exists
        let converter = ColorConverter::new(image)?;
        let (width, height) = (image.width, image.height);

        let encoder = self.encoder.as_mut().ok_or(StageError::Closed)?;
        let output = self.output.as_mut().ok_or(StageError::Closed)?;

        encoder.configure(&EncoderSettings {
            width,
            height,
            frame_rate: self.options.frame_rate,
            bitrate: self.options.bitrate,
            gop_size: self.options.gop_size,
        })?;
        output.configure(width, height, self.options.frame_rate)?;
        self.pts_increment = encoder.time_base().rescale(1, output.time_base());

        output.open()?;

        let sdp = output.session_description()?;
        log::debug!("Session description:\n{}", sdp);
        if let Some(path) = &self.options.sdp_path {
            sdp.write_to(path)?;
        }

        output.write_header()?;

        let frame = FrameBuffer::allocate(width, height);
        self.stats.frame_buffer_allocations += 1;

        log::info!(
            "Transmitter configured: {}x{} {} @ {} fps, pts increment {} ({} -> {})",
            width,
            height,
            image.layout,
            self.options.frame_rate,
            self.pts_increment,
            encoder.time_base(),
            output.time_base()
        );

        Ok(Pipeline { converter, frame })
    }

    fn transmit(&mut self, image: &ImageView<'_>) -> Result<(), TransmitterError> {
        let Session::Ready(pipeline) = &mut self.session else {
            return Err(TransmitterError::encoding(StageError::SessionFailed));
        };

        // Rejected input never reaches the codec, so the session survives it
        pipeline
            .converter
            .convert(image, &mut pipeline.frame)
            .map_err(TransmitterError::encoding)?;

        self.pts += self.pts_increment;
        pipeline.frame.pts = self.pts;

        let written = match (self.encoder.as_mut(), self.output.as_mut()) {
            (Some(encoder), Some(output)) => encode_and_write(encoder, output, &pipeline.frame),
            _ => Err(StageError::Closed),
        };

        let packets = match written {
            Ok(packets) => packets,
            Err(e) => {
                log::error!("Frame pts={} failed: {}", self.pts, e);
                self.fail(FailureKind::Encoding);
                return Err(TransmitterError::Encoding(e));
            }
        };

        self.stats.last_pts = self.pts;
        log::debug!(
            "Encoded frame pts={} ({} RTP packets) at {:.3}s",
            self.pts,
            packets,
            self.started.elapsed().as_secs_f64()
        );

        if packets > 0 {
            self.stats.frames_sent += 1;
            self.stats.rtp_packets_sent += packets as u64;

            if let Some(notifier) = self.notifier.as_mut() {
                if notifier.frame_ready() {
                    self.stats.markers_published += 1;
                } else {
                    self.stats.marker_send_failures += 1;
                }
            }
        }

        Ok(())
    }

    fn fail(&mut self, kind: FailureKind) {
        let pipeline = match std::mem::replace(&mut self.session, Session::Closed) {
            Session::Ready(pipeline) => Some(pipeline),
            Session::Failed { pipeline, .. } => pipeline,
            _ => None,
        };
        self.session = Session::Failed { kind, pipeline };
    }

    fn teardown(&mut self) {
        let pipeline = match std::mem::replace(&mut self.session, Session::Closed) {
            Session::Closed => return,
            Session::Ready(pipeline) => Some(pipeline),
            Session::Failed { pipeline, .. } => pipeline,
            Session::Unconfigured | Session::Configuring => None,
        };

        // Trailer only for a stream whose header went out
        if let Some(output) = self.output.as_mut() {
            if output.header_written() {
                if let Err(e) = output.write_trailer() {
                    log::warn!("Failed to write stream trailer: {}", e);
                }
            }
        }

        drop(pipeline);

        if let Some(mut encoder) = self.encoder.take() {
            encoder.close();
        }

        if let Some(output) = self.output.as_mut() {
            output.release_io();
        }

        if let Some(output) = self.output.take() {
            self.stats.bytes_sent = output.bytes_sent();
        }

        if let Some(mut notifier) = self.notifier.take() {
            notifier.close();
        }

        log::info!("Sent {} KB", self.stats.bytes_sent / 1024);
    }
}

fn encode_and_write<E: VideoEncoder, S: PacketSink>(
    encoder: &mut E,
    output: &mut OutputStream<S>,
    frame: &FrameBuffer,
) -> Result<usize, StageError> {
    let mut written = 0;
    for packet in encoder.encode(frame)? {
        written += output.write_packet(&packet)?;
    }
    Ok(written)
}

impl<E, S, N> Drop for Transmitter<E, S, N>
where
    E: VideoEncoder,
    S: PacketSink,
    N: FrameNotifier,
{
    fn drop(&mut self) {
        self.teardown();
    }
}
