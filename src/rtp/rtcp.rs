//! Minimal RTCP sender packets (RFC 3550 Section 6)
//!
//! Only what a fire-and-forget sender emits: one Sender Report announcing the
//! stream and one BYE closing it.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

use super::RTP_VERSION;

pub const RTCP_PT_SENDER_REPORT: u8 = 200;
pub const RTCP_PT_BYE: u8 = 203;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Sender Report without reception report blocks (28 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    /// 64-bit NTP timestamp, seconds in the upper half
    pub ntp_timestamp: u64,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    pub const SIZE: usize = 28;

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(RTP_VERSION << 6); // P=0, RC=0
        buf.put_u8(RTCP_PT_SENDER_REPORT);
        buf.put_u16((Self::SIZE / 4 - 1) as u16);
        buf.put_u32(self.ssrc);
        buf.put_u64(self.ntp_timestamp);
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
        buf.freeze()
    }
}

/// BYE for a single source, no reason string (8 bytes)
pub fn goodbye(ssrc: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8((RTP_VERSION << 6) | 1); // SC=1
    buf.put_u8(RTCP_PT_BYE);
    buf.put_u16(1);
    buf.put_u32(ssrc);
    buf.freeze()
}

/// Current wall-clock time as a 64-bit NTP timestamp
pub fn ntp_now() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seconds = since_epoch.as_secs() + NTP_UNIX_OFFSET;
    let fraction = (u64::from(since_epoch.subsec_nanos()) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_report_layout() {
        let sr = SenderReport {
            ssrc: 0x0102_0304,
            ntp_timestamp: 0xAABB_CCDD_0000_0001,
            rtp_timestamp: 6000,
            packet_count: 3,
            octet_count: 4096,
        };
        let bytes = sr.to_bytes();

        assert_eq!(bytes.len(), SenderReport::SIZE);
        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[1], 200);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 6);
        assert_eq!(&bytes[4..8], &[1, 2, 3, 4]);
        assert_eq!(&bytes[8..12], &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]), 6000);
        assert_eq!(u32::from_be_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 4096);
    }

    #[test]
    fn test_goodbye_layout() {
        let bye = goodbye(7);
        assert_eq!(&bye[..], &[0x81, 203, 0, 1, 0, 0, 0, 7]);
    }

    #[test]
    fn test_ntp_now_after_2020() {
        // 2020-01-01 in NTP seconds
        assert!(ntp_now() >> 32 > 3_786_825_600);
    }
}
