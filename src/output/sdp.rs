use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use super::OutputError;
use crate::timebase::RTP_VIDEO_CLOCK_RATE;

/// SDP document a generic player opens to receive the stream.
///
/// SPS/PPS travel in-band ahead of every IDR frame, so no
/// `sprop-parameter-sets` attribute is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub session_name: String,
    pub session_id: u64,
    pub destination: SocketAddr,
    pub payload_type: u8,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl SessionDescription {
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), OutputError> {
        std::fs::write(path.as_ref(), self.to_string())?;
        log::info!("Session description written to {}", path.as_ref().display());
        Ok(())
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = if self.destination.is_ipv4() { "IP4" } else { "IP6" };
        let pt = self.payload_type;

        write!(f, "v=0\r\n")?;
        write!(f, "o=- {} 1 IN {} {}\r\n", self.session_id, family, self.destination.ip())?;
        write!(f, "s={}\r\n", self.session_name)?;
        write!(f, "c=IN {} {}\r\n", family, self.destination.ip())?;
        write!(f, "t=0 0\r\n")?;
        write!(f, "m=video {} RTP/AVP {}\r\n", self.destination.port(), pt)?;
        write!(f, "a=rtpmap:{} H264/{}\r\n", pt, RTP_VIDEO_CLOCK_RATE)?;
        write!(f, "a=fmtp:{} packetization-mode=1\r\n", pt)?;
        write!(f, "a=framerate:{}\r\n", self.frame_rate)?;
        write!(f, "a=framesize:{} {}-{}\r\n", pt, self.width, self.height)?;
        write!(f, "a=sendonly\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdp() -> SessionDescription {
        SessionDescription {
            session_name: "frame-transmitter".into(),
            session_id: 42,
            destination: "192.168.1.20:49990".parse().unwrap(),
            payload_type: 96,
            width: 1280,
            height: 1024,
            frame_rate: 15,
        }
    }

    #[test]
    fn test_sdp_text() {
        let text = sdp().to_string();
        let lines: Vec<&str> = text.split("\r\n").collect();

        assert_eq!(lines[0], "v=0");
        assert_eq!(lines[1], "o=- 42 1 IN IP4 192.168.1.20");
        assert!(lines.contains(&"c=IN IP4 192.168.1.20"));
        assert!(lines.contains(&"m=video 49990 RTP/AVP 96"));
        assert!(lines.contains(&"a=rtpmap:96 H264/90000"));
        assert!(lines.contains(&"a=fmtp:96 packetization-mode=1"));
        assert!(lines.contains(&"a=framerate:15"));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn test_ipv6_destination() {
        let mut desc = sdp();
        desc.destination = "[::1]:5004".parse().unwrap();
        assert!(desc.to_string().contains("c=IN IP6 ::1\r\n"));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.sdp");
        sdp().write_to(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, sdp().to_string());
    }
}
