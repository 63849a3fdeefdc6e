//! Frame encoding and transmission pipeline
//!
//! Takes decoded RGB/BGR images one at a time and streams them as H.264 over
//! RTP/UDP, with:
//! - Lazy one-shot session setup from the first frame's geometry
//! - BT.601 color conversion into a single reusable I420 buffer
//! - RFC 6184 packetization with RTCP Sender Report / BYE framing
//! - An SDP file for generic players (VLC, ffplay)
//! - A ZMQ PUB marker per transmitted frame that never blocks the pipeline
//!
//! # Example
//!
//! ```no_run
//! use frame_transmitter::{Config, ImageView, Transmitter};
//!
//! let mut transmitter = Transmitter::new(&Config::default())?;
//! let pixels = vec![0u8; 640 * 480 * 3];
//! transmitter.submit(&ImageView::packed_rgb(640, 480, &pixels))?;
//! let stats = transmitter.shutdown();
//! println!("sent {} bytes", stats.bytes_sent);
//! # Ok::<(), frame_transmitter::TransmitterError>(())
//! ```

pub mod config;
pub mod convert;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod image;
pub mod notifier;
pub mod output;
pub mod rtp;
pub mod stats;
pub mod timebase;
pub mod transmitter;

// Re-exports for convenience
pub use config::{Config, ConfigError};
pub use encoder::{EncodedPacket, EncoderError, EncoderSettings, H264Encoder, VideoEncoder};
pub use error::{StageError, TransmitterError};
pub use frame::FrameBuffer;
pub use image::{ImageView, PixelLayout};
pub use notifier::{FrameNotifier, ZmqNotifier};
pub use output::{OutputError, OutputStream, PacketSink, SessionDescription, UdpSink};
pub use stats::TransmitterStats;
pub use timebase::TimeBase;
pub use transmitter::{FailureKind, SessionState, Transmitter};
