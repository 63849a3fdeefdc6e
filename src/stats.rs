//! Transmission statistics

use serde::{Deserialize, Serialize};

/// Snapshot of a transmitter session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransmitterStats {
    /// Images passed to `submit`
    pub frames_submitted: u64,

    /// Frames that produced at least one written packet
    pub frames_sent: u64,

    /// Total RTP packets sent
    pub rtp_packets_sent: u64,

    /// Total bytes handed to the network, RTCP included
    pub bytes_sent: u64,

    /// Frame markers handed to the notifier queue. A slow subscriber may
    /// still miss some of them: the queue keeps only the newest.
    pub markers_published: u64,

    /// Frame markers the notifier failed to send (socket error or closed)
    pub marker_send_failures: u64,

    /// Completed configurations (0 or 1)
    pub configurations: u32,

    /// Frame buffer allocations (0 or 1)
    pub frame_buffer_allocations: u32,

    /// Presentation timestamp of the latest frame, 90kHz
    pub last_pts: i64,
}

impl TransmitterStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_sent.saturating_sub(previous.frames_sent);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_sent.saturating_sub(previous.bytes_sent);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_fps() {
        let prev = TransmitterStats {
            frames_sent: 100,
            ..Default::default()
        };

        let current = TransmitterStats {
            frames_sent: 115,
            ..Default::default()
        };

        assert_eq!(current.calculate_fps(&prev, 1.0), 15.0);
        assert_eq!(current.calculate_fps(&prev, 0.0), 0.0);
    }

    #[test]
    fn test_calculate_bitrate() {
        let prev = TransmitterStats::default();
        let current = TransmitterStats {
            bytes_sent: 250_000, // 2 Mbit over 1 second
            ..Default::default()
        };

        assert_eq!(current.calculate_bitrate_kbps(&prev, 1.0), 2000.0);
    }
}
