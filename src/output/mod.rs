//! RTP output stream: header/packet/trailer framing over a packet sink

mod sdp;
mod udp;

pub use sdp::SessionDescription;
pub use udp::UdpSink;

use std::net::SocketAddr;

use bytes::BytesMut;
use thiserror::Error;

use crate::encoder::EncodedPacket;
use crate::rtp::rtcp::{self, SenderReport};
use crate::rtp::{H264Packetizer, PacketizerError, PacketizerStats};
use crate::timebase::TimeBase;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packetizer error: {0}")]
    Packetizer(#[from] PacketizerError),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("sink is not open")]
    NotOpen,

    #[error("output stream is not configured")]
    NotConfigured,

    #[error("output stream already configured")]
    AlreadyConfigured,

    #[error("{0} written out of order")]
    OutOfOrder(&'static str),

    #[error("output stream I/O released")]
    Released,
}

/// Datagram transport the output stream writes through.
///
/// Media and control travel on separate channels, RTP and RTCP for the UDP
/// implementation.
pub trait PacketSink {
    /// Resolves and connects the destination
    fn open(&mut self) -> Result<(), OutputError>;

    fn send_media(&mut self, packet: &[u8]) -> Result<usize, OutputError>;

    fn send_control(&mut self, packet: &[u8]) -> Result<usize, OutputError>;

    /// Releases the underlying I/O; later sends fail
    fn close(&mut self);

    /// Media destination, known once `open` succeeded
    fn destination(&self) -> Option<SocketAddr>;
}

/// Stream parameters fixed at construction
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub payload_type: u8,
    pub ssrc: u32,
    pub mtu: usize,
    pub session_name: String,
}

#[derive(Debug, Clone, Copy)]
struct VideoFormat {
    width: u32,
    height: u32,
    frame_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Idle,
    Open,
    HeaderWritten,
    TrailerWritten,
    Released,
}

/// Muxer for a single H.264 video stream.
///
/// Calls must follow `configure`, `open`, `write_header`, any number of
/// `write_packet`, `write_trailer`, `release_io`. Out of order calls are
/// rejected without touching the sink.
pub struct OutputStream<S: PacketSink> {
    sink: S,
    settings: StreamSettings,
    format: Option<VideoFormat>,
    packetizer: Option<H264Packetizer>,
    framing: Framing,
    bytes_sent: u64,
    last_rtp_timestamp: u32,
}

impl<S: PacketSink> OutputStream<S> {
    pub fn new(sink: S, settings: StreamSettings) -> Self {
        Self {
            sink,
            settings,
            format: None,
            packetizer: None,
            framing: Framing::Idle,
            bytes_sent: 0,
            last_rtp_timestamp: 0,
        }
    }

    /// Fixes the video format and creates the packetizer
    pub fn configure(
        &mut self,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<(), OutputError> {
        if self.format.is_some() {
            return Err(OutputError::AlreadyConfigured);
        }
        let packetizer =
            H264Packetizer::new(self.settings.ssrc, self.settings.payload_type, self.settings.mtu)?;

        self.packetizer = Some(packetizer);
        self.format = Some(VideoFormat {
            width,
            height,
            frame_rate,
        });
        Ok(())
    }

    /// Clock of the timestamps passed to `write_packet`
    pub fn time_base(&self) -> TimeBase {
        TimeBase::rtp_video()
    }

    pub fn open(&mut self) -> Result<(), OutputError> {
        match self.framing {
            Framing::Idle => {}
            Framing::Released => return Err(OutputError::Released),
            _ => return Err(OutputError::OutOfOrder("open")),
        }
        self.sink.open()?;
        self.framing = Framing::Open;
        Ok(())
    }

    /// SDP describing this stream; needs `configure` and `open`
    pub fn session_description(&self) -> Result<SessionDescription, OutputError> {
        let format = self.format.ok_or(OutputError::NotConfigured)?;
        let destination = self.sink.destination().ok_or(OutputError::NotOpen)?;

        Ok(SessionDescription {
            session_name: self.settings.session_name.clone(),
            session_id: rtcp::ntp_now() >> 32,
            destination,
            payload_type: self.settings.payload_type,
            width: format.width,
            height: format.height,
            frame_rate: format.frame_rate,
        })
    }

    /// Announces the stream with an RTCP Sender Report
    pub fn write_header(&mut self) -> Result<(), OutputError> {
        if self.format.is_none() {
            return Err(OutputError::NotConfigured);
        }
        if self.framing != Framing::Open {
            return Err(self.order_error("header"));
        }

        let report = self.sender_report();
        self.bytes_sent += self.sink.send_control(&report.to_bytes())? as u64;
        self.framing = Framing::HeaderWritten;
        log::debug!("Stream header written (SSRC {:#010x})", self.settings.ssrc);
        Ok(())
    }

    /// Packetizes one access unit and sends every RTP packet.
    ///
    /// `packet.pts` must already be in [`Self::time_base`] units. Returns the
    /// number of RTP packets written.
    pub fn write_packet(&mut self, packet: &EncodedPacket) -> Result<usize, OutputError> {
        if self.framing != Framing::HeaderWritten {
            return Err(self.order_error("packet"));
        }
        let packetizer = self.packetizer.as_mut().ok_or(OutputError::NotConfigured)?;

        // RTP timestamps are 32 bit and wrap
        let timestamp = packet.pts as u32;
        let datagrams = packetizer.packetize(&packet.data, timestamp)?;

        for datagram in &datagrams {
            self.bytes_sent += self.sink.send_media(datagram)? as u64;
        }
        self.last_rtp_timestamp = timestamp;

        Ok(datagrams.len())
    }

    /// Closes the stream with a final Sender Report and BYE
    pub fn write_trailer(&mut self) -> Result<(), OutputError> {
        if self.framing != Framing::HeaderWritten {
            return Err(self.order_error("trailer"));
        }

        let report = self.sender_report().to_bytes();
        let bye = rtcp::goodbye(self.settings.ssrc);
        let mut compound = BytesMut::with_capacity(report.len() + bye.len());
        compound.extend_from_slice(&report);
        compound.extend_from_slice(&bye);

        // The stream is finished even if the BYE never left
        self.framing = Framing::TrailerWritten;
        self.bytes_sent += self.sink.send_control(&compound)? as u64;
        log::debug!("Stream trailer written");
        Ok(())
    }

    /// Closes the sink. Idempotent.
    pub fn release_io(&mut self) {
        if self.framing != Framing::Released {
            self.sink.close();
            self.framing = Framing::Released;
        }
    }

    pub fn header_written(&self) -> bool {
        self.framing == Framing::HeaderWritten
    }

    /// Total bytes handed to the sink, headers and RTCP included
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn packetizer_stats(&self) -> PacketizerStats {
        self.packetizer
            .as_ref()
            .map(|p| p.stats())
            .unwrap_or_default()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn sender_report(&self) -> SenderReport {
        let stats = self.packetizer_stats();
        SenderReport {
            ssrc: self.settings.ssrc,
            ntp_timestamp: rtcp::ntp_now(),
            rtp_timestamp: self.last_rtp_timestamp,
            packet_count: stats.packets_sent as u32,
            octet_count: stats.octets_sent as u32,
        }
    }

    fn order_error(&self, what: &'static str) -> OutputError {
        match self.framing {
            Framing::Idle => OutputError::NotOpen,
            Framing::Released => OutputError::Released,
            _ => OutputError::OutOfOrder(what),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::{RtpHeader, RTP_HEADER_SIZE};
    use bytes::Bytes;

    #[derive(Default)]
    struct RecordingSink {
        open: bool,
        closed: bool,
        media: Vec<Vec<u8>>,
        control: Vec<Vec<u8>>,
    }

    impl PacketSink for RecordingSink {
        fn open(&mut self) -> Result<(), OutputError> {
            self.open = true;
            Ok(())
        }

        fn send_media(&mut self, packet: &[u8]) -> Result<usize, OutputError> {
            self.media.push(packet.to_vec());
            Ok(packet.len())
        }

        fn send_control(&mut self, packet: &[u8]) -> Result<usize, OutputError> {
            self.control.push(packet.to_vec());
            Ok(packet.len())
        }

        fn close(&mut self) {
            self.closed = true;
        }

        fn destination(&self) -> Option<SocketAddr> {
            self.open.then(|| SocketAddr::from(([127, 0, 0, 1], 5004)))
        }
    }

    fn stream() -> OutputStream<RecordingSink> {
        OutputStream::new(
            RecordingSink::default(),
            StreamSettings {
                payload_type: 96,
                ssrc: 0x1234,
                mtu: 1400,
                session_name: "test".into(),
            },
        )
    }

    fn access_unit(pts: i64) -> EncodedPacket {
        EncodedPacket {
            data: Bytes::from_static(&[0, 0, 0, 1, 0x67, 1, 2, 0, 0, 0, 1, 0x65, 3, 4, 5]),
            pts,
            keyframe: true,
        }
    }

    #[test]
    fn test_full_session_framing() {
        let mut out = stream();
        out.configure(64, 48, 15).unwrap();
        out.open().unwrap();
        out.write_header().unwrap();
        assert!(out.header_written());

        assert_eq!(out.write_packet(&access_unit(6000)).unwrap(), 2);
        out.write_trailer().unwrap();
        out.release_io();

        let sink = out.sink();
        assert!(sink.closed);
        assert_eq!(sink.control.len(), 2);
        assert_eq!(sink.control[0][1], rtcp::RTCP_PT_SENDER_REPORT);
        // trailer: SR followed by BYE in one compound packet
        assert_eq!(sink.control[1][1], rtcp::RTCP_PT_SENDER_REPORT);
        assert_eq!(sink.control[1][SenderReport::SIZE + 1], rtcp::RTCP_PT_BYE);

        let last = RtpHeader::from_bytes(&sink.media[1]).unwrap();
        assert!(last.marker);
        assert_eq!(last.timestamp, 6000);
        assert_eq!(&sink.media[1][RTP_HEADER_SIZE..], &[0x65, 3, 4, 5]);

        let expected: usize = sink.control.iter().chain(&sink.media).map(Vec::len).sum();
        assert_eq!(out.bytes_sent(), expected as u64);
    }

    #[test]
    fn test_header_requires_configure_and_open() {
        let mut out = stream();
        assert!(matches!(out.write_header(), Err(OutputError::NotConfigured)));

        out.configure(64, 48, 15).unwrap();
        assert!(matches!(out.write_header(), Err(OutputError::NotOpen)));
        assert!(out.sink().control.is_empty());
    }

    #[test]
    fn test_packet_before_header_rejected() {
        let mut out = stream();
        out.configure(64, 48, 15).unwrap();
        out.open().unwrap();
        assert!(matches!(
            out.write_packet(&access_unit(0)),
            Err(OutputError::OutOfOrder("packet"))
        ));
        assert!(out.sink().media.is_empty());
    }

    #[test]
    fn test_trailer_without_header_rejected() {
        let mut out = stream();
        out.configure(64, 48, 15).unwrap();
        out.open().unwrap();
        assert!(out.write_trailer().is_err());
        out.release_io();
        out.release_io();
        assert!(matches!(out.open(), Err(OutputError::Released)));
    }

    #[test]
    fn test_rtp_timestamp_wraps() {
        let mut out = stream();
        out.configure(64, 48, 15).unwrap();
        out.open().unwrap();
        out.write_header().unwrap();
        out.write_packet(&access_unit(u32::MAX as i64 + 6001)).unwrap();

        let header = RtpHeader::from_bytes(&out.sink().media[0]).unwrap();
        assert_eq!(header.timestamp, 6000);
    }

    #[test]
    fn test_session_description_needs_destination() {
        let mut out = stream();
        out.configure(64, 48, 15).unwrap();
        assert!(matches!(out.session_description(), Err(OutputError::NotOpen)));

        out.open().unwrap();
        let sdp = out.session_description().unwrap();
        assert_eq!(sdp.destination.port(), 5004);
        assert_eq!(sdp.frame_rate, 15);
    }
}
