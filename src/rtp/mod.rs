//! RTP/H.264 packetization according to RFC 6184
//!
//! Access units arrive in Annex-B framing from the encoder. Each NAL unit that
//! fits the MTU travels as a Single NAL Unit packet; larger ones are split into
//! FU-A fragments. The marker bit closes every access unit.

mod packet;
pub mod rtcp;

pub use packet::RtpHeader;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// RTP protocol constants
pub const RTP_VERSION: u8 = 2;
pub const RTP_PAYLOAD_TYPE_H264: u8 = 96;
pub const RTP_HEADER_SIZE: usize = 12;
pub const FU_A_HEADER_SIZE: usize = 2;
pub const DEFAULT_MTU: usize = 1400;

const NAL_TYPE_FU_A: u8 = 28;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketizerError {
    #[error("empty access unit")]
    EmptyData,

    #[error("no NAL units found in access unit")]
    NoNalUnits,

    #[error("invalid MTU: {0}")]
    InvalidMtu(usize),

    #[error("invalid payload type: {0}")]
    InvalidPayloadType(u8),
}

/// Statistics for RTP packetizer
#[derive(Debug, Clone, Default)]
pub struct PacketizerStats {
    pub packets_sent: u64,
    /// Payload octets, RTP headers excluded (RTCP SR semantics)
    pub octets_sent: u64,
    pub frames_sent: u64,
    pub current_ts: u32,
}

/// RTP/H.264 packetizer for a single stream.
///
/// Owned exclusively by the output stream, so state is plain fields behind
/// `&mut self`.
pub struct H264Packetizer {
    payload_type: u8,
    ssrc: u32,
    max_payload_size: usize,

    sequence_number: u16,
    last_timestamp: u32,

    packets_sent: u64,
    octets_sent: u64,
    frames_sent: u64,
}

impl H264Packetizer {
    /// Creates a new RTP packetizer
    ///
    /// # Arguments
    /// * `ssrc` - Synchronization source identifier (unique per stream)
    /// * `payload_type` - Dynamic payload type announced in the SDP
    /// * `mtu` - Maximum datagram size (0 selects [`DEFAULT_MTU`])
    pub fn new(ssrc: u32, payload_type: u8, mtu: usize) -> Result<Self, PacketizerError> {
        let mtu = if mtu == 0 { DEFAULT_MTU } else { mtu };
        if mtu <= RTP_HEADER_SIZE + FU_A_HEADER_SIZE {
            return Err(PacketizerError::InvalidMtu(mtu));
        }
        if payload_type > 127 {
            return Err(PacketizerError::InvalidPayloadType(payload_type));
        }

        Ok(Self {
            payload_type,
            ssrc,
            max_payload_size: mtu - RTP_HEADER_SIZE,
            sequence_number: 0,
            last_timestamp: 0,
            packets_sent: 0,
            octets_sent: 0,
            frames_sent: 0,
        })
    }

    /// Packetizes one Annex-B access unit into RTP datagrams
    ///
    /// # Arguments
    /// * `access_unit` - Encoder output with start codes
    /// * `timestamp` - RTP timestamp (90kHz clock), shared by every packet
    pub fn packetize(
        &mut self,
        access_unit: &[u8],
        timestamp: u32,
    ) -> Result<Vec<Bytes>, PacketizerError> {
        if access_unit.is_empty() {
            return Err(PacketizerError::EmptyData);
        }

        let nal_units = split_nal_units(access_unit);
        if nal_units.is_empty() {
            return Err(PacketizerError::NoNalUnits);
        }

        let mut packets = Vec::with_capacity(nal_units.len());
        let last_nal = nal_units.len() - 1;

        for (index, nal) in nal_units.iter().enumerate() {
            let closes_frame = index == last_nal;
            if nal.len() <= self.max_payload_size {
                let pkt = self.build_packet(timestamp, closes_frame, &[], nal);
                packets.push(pkt);
            } else {
                self.fragment(nal, timestamp, closes_frame, &mut packets);
            }
        }

        self.last_timestamp = timestamp;
        self.frames_sent += 1;

        Ok(packets)
    }

    /// Splits one oversized NAL unit into FU-A packets (RFC 6184 Section 5.8)
    fn fragment(&mut self, nal: &[u8], timestamp: u32, closes_frame: bool, out: &mut Vec<Bytes>) {
        let nal_header = nal[0];
        let indicator = (nal_header & 0xE0) | NAL_TYPE_FU_A;
        let nal_type = nal_header & 0x1F;

        let body = &nal[1..];
        let chunk_size = self.max_payload_size - FU_A_HEADER_SIZE;
        let chunks = body.chunks(chunk_size).count();

        for (i, chunk) in body.chunks(chunk_size).enumerate() {
            let start = i == 0;
            let end = i + 1 == chunks;

            let mut fu_header = nal_type;
            if start {
                fu_header |= 0x80;
            }
            if end {
                fu_header |= 0x40;
            }

            let marker = closes_frame && end;
            let pkt = self.build_packet(timestamp, marker, &[indicator, fu_header], chunk);
            out.push(pkt);
        }
    }

    /// Builds a single RTP packet: header, optional FU prefix, payload
    fn build_packet(
        &mut self,
        timestamp: u32,
        marker: bool,
        prefix: &[u8],
        payload: &[u8],
    ) -> Bytes {
        let header = RtpHeader {
            marker,
            payload_type: self.payload_type,
            sequence_number: self.sequence_number,
            timestamp,
            ssrc: self.ssrc,
        };

        let payload_len = prefix.len() + payload.len();
        let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE + payload_len);
        buf.put_slice(&header.to_bytes());
        buf.put_slice(prefix);
        buf.put_slice(payload);

        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.packets_sent += 1;
        self.octets_sent += payload_len as u64;

        buf.freeze()
    }

    /// Gets packetizer statistics
    pub fn stats(&self) -> PacketizerStats {
        PacketizerStats {
            packets_sent: self.packets_sent,
            octets_sent: self.octets_sent,
            frames_sent: self.frames_sent,
            current_ts: self.last_timestamp,
        }
    }
}

/// Splits an Annex-B byte stream on 3- and 4-byte start codes.
///
/// Returns the NAL units without their start codes. Input lacking any start
/// code yields nothing.
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    // (first byte of the start code, first byte of the NAL unit)
    let mut bounds = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let prefix_start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            bounds.push((prefix_start, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(bounds.len());
    for (k, &(_, begin)) in bounds.iter().enumerate() {
        let end = bounds.get(k + 1).map(|&(prefix, _)| prefix).unwrap_or(data.len());
        if end > begin {
            units.push(&data[begin..end]);
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(kind: u8, len: usize) -> Vec<u8> {
        let mut unit = vec![0x60 | kind];
        unit.extend((0..len - 1).map(|i| (i % 251) as u8 + 1));
        unit
    }

    fn annex_b(units: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for u in units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(u);
        }
        out
    }

    #[test]
    fn test_split_nal_units() {
        let sps = nal(7, 10);
        let pps = nal(8, 4);
        let mut stream = annex_b(&[sps.clone()]);
        // 3-byte start code for the second unit
        stream.extend_from_slice(&[0, 0, 1]);
        stream.extend_from_slice(&pps);

        let units = split_nal_units(&stream);
        assert_eq!(units, vec![&sps[..], &pps[..]]);
    }

    #[test]
    fn test_split_without_start_code() {
        assert!(split_nal_units(&[0x65, 0x01, 0x02]).is_empty());
    }

    #[test]
    fn test_single_nal_packets() {
        let mut p = H264Packetizer::new(0xCAFE, 96, 1400).unwrap();
        let au = annex_b(&[nal(7, 10), nal(8, 4), nal(5, 200)]);

        let packets = p.packetize(&au, 6000).unwrap();
        assert_eq!(packets.len(), 3);

        for (i, pkt) in packets.iter().enumerate() {
            let header = RtpHeader::from_bytes(pkt).unwrap();
            assert_eq!(header.sequence_number, i as u16);
            assert_eq!(header.timestamp, 6000);
            assert_eq!(header.ssrc, 0xCAFE);
            assert_eq!(header.marker, i == 2, "marker only on the last packet");
        }
        assert_eq!(packets[2][RTP_HEADER_SIZE] & 0x1F, 5);
    }

    #[test]
    fn test_fu_a_fragmentation() {
        let mtu = 100;
        let mut p = H264Packetizer::new(1, 96, mtu).unwrap();
        let idr = nal(5, 500);
        let au = annex_b(&[idr.clone()]);

        let packets = p.packetize(&au, 0).unwrap();
        assert!(packets.len() > 1);

        let mut rebuilt = vec![];
        for (i, pkt) in packets.iter().enumerate() {
            assert!(pkt.len() <= mtu);
            let indicator = pkt[RTP_HEADER_SIZE];
            let fu_header = pkt[RTP_HEADER_SIZE + 1];
            assert_eq!(indicator & 0x1F, NAL_TYPE_FU_A);
            assert_eq!(indicator & 0xE0, idr[0] & 0xE0);
            assert_eq!(fu_header & 0x1F, 5);
            assert_eq!(fu_header & 0x80 != 0, i == 0, "start bit");
            assert_eq!(fu_header & 0x40 != 0, i == packets.len() - 1, "end bit");
            assert_eq!(pkt[1] & 0x80 != 0, i == packets.len() - 1, "marker bit");
            rebuilt.extend_from_slice(&pkt[RTP_HEADER_SIZE + FU_A_HEADER_SIZE..]);
        }

        assert_eq!(rebuilt, &idr[1..]);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut p = H264Packetizer::new(1, 96, 1400).unwrap();
        p.sequence_number = u16::MAX;
        let au = annex_b(&[nal(1, 20), nal(1, 20)]);

        let packets = p.packetize(&au, 0).unwrap();
        assert_eq!(RtpHeader::from_bytes(&packets[0]).unwrap().sequence_number, u16::MAX);
        assert_eq!(RtpHeader::from_bytes(&packets[1]).unwrap().sequence_number, 0);
    }

    #[test]
    fn test_stats_count_payload_octets() {
        let mut p = H264Packetizer::new(1, 96, 1400).unwrap();
        let au = annex_b(&[nal(5, 100)]);
        p.packetize(&au, 3000).unwrap();

        let stats = p.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.octets_sent, 100);
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.current_ts, 3000);
    }

    #[test]
    fn test_invalid_input() {
        let mut p = H264Packetizer::new(1, 96, 1400).unwrap();
        assert_eq!(p.packetize(&[], 0), Err(PacketizerError::EmptyData));
        assert_eq!(p.packetize(&[1, 2, 3, 4], 0), Err(PacketizerError::NoNalUnits));
        assert!(H264Packetizer::new(1, 96, 14).is_err());
        assert!(H264Packetizer::new(1, 200, 1400).is_err());
    }
}
