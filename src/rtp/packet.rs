//! RTP packet structures (RFC 3550)

use super::RTP_VERSION;

/// RTP header structure (12 bytes minimum)
///
/// RFC 3550 Section 5.1:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit (set on the last packet of an access unit)
    pub marker: bool,

    /// Payload type (dynamic, 96-127 for H.264)
    pub payload_type: u8,

    /// Sequence number (16 bits, wraps around)
    pub sequence_number: u16,

    /// Timestamp (90kHz clock for video)
    pub timestamp: u32,

    /// Synchronization source identifier
    pub ssrc: u32,
}

impl RtpHeader {
    /// Serializes RTP header to bytes
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];

        bytes[0] = RTP_VERSION << 6; // P=0, X=0, CC=0
        bytes[1] = (if self.marker { 0x80 } else { 0 }) | (self.payload_type & 0x7F);

        bytes[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        bytes
    }
}

#[cfg(test)]
impl RtpHeader {
    /// Parses RTP header from byte slice. Padding, extensions and CSRC lists
    /// are never emitted by this sender and are rejected.
    pub(crate) fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        let version = (data[0] >> 6) & 0x03;
        if version != RTP_VERSION || data[0] & 0x3F != 0 {
            return None;
        }

        let marker = (data[1] & 0x80) != 0;
        let payload_type = data[1] & 0x7F;

        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        Some(Self {
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        })
    }
}
