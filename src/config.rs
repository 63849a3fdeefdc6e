//! Configuration management for the frame transmitter

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::rtp::{DEFAULT_MTU, RTP_PAYLOAD_TYPE_H264};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete transmitter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Encoder parameters; dimensions come from the first frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Frames per second, fixed for the whole session
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Target bitrate (bits per second)
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    /// Frames between two keyframes
    #[serde(default = "default_gop_size")]
    pub gop_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            bitrate: default_bitrate(),
            gop_size: default_gop_size(),
        }
    }
}

/// RTP output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// RTP destination (`host:port`); RTCP goes to port + 1
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Local address the sending socket binds to
    #[serde(default = "default_local_bind")]
    pub local_bind: String,

    /// Maximum transmission unit (bytes)
    #[serde(default = "default_mtu")]
    pub mtu: usize,

    /// Dynamic RTP payload type (96-127)
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,

    /// RTP SSRC identifier
    #[serde(default = "default_ssrc")]
    pub ssrc: u32,

    /// Where the SDP file is written; empty disables it
    #[serde(default = "default_sdp_path")]
    pub sdp_path: String,

    /// `s=` line of the SDP
    #[serde(default = "default_session_name")]
    pub session_name: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            local_bind: default_local_bind(),
            mtu: default_mtu(),
            payload_type: default_payload_type(),
            ssrc: default_ssrc(),
            sdp_path: default_sdp_path(),
            session_name: default_session_name(),
        }
    }
}

/// Frame-ready PUB endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Interface to bind, `*` for all
    #[serde(default = "default_notifier_host")]
    pub host: String,

    /// TCP port (0 = auto-assign)
    #[serde(default = "default_notifier_port")]
    pub port: u16,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            host: default_notifier_host(),
            port: default_notifier_port(),
        }
    }
}

// Default value functions
fn default_frame_rate() -> u32 {
    15
}
fn default_bitrate() -> u32 {
    2_000_000
}
fn default_gop_size() -> u32 {
    6
}
fn default_destination() -> String {
    "127.0.0.1:49990".to_string()
}
fn default_local_bind() -> String {
    "0.0.0.0:0".to_string()
}
fn default_mtu() -> usize {
    DEFAULT_MTU
}
fn default_payload_type() -> u8 {
    RTP_PAYLOAD_TYPE_H264
}
fn default_ssrc() -> u32 {
    0x4652_4D54
}
fn default_sdp_path() -> String {
    "stream.sdp".to_string()
}
fn default_session_name() -> String {
    "frame-transmitter".to_string()
}
fn default_notifier_host() -> String {
    "*".to_string()
}
fn default_notifier_port() -> u16 {
    15001
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.frame_rate == 0 || session.frame_rate > 120 {
            return Err(ConfigError::Invalid(format!(
                "frame_rate must be between 1 and 120, got {}",
                session.frame_rate
            )));
        }
        if session.bitrate == 0 {
            return Err(ConfigError::Invalid("bitrate must be > 0".to_string()));
        }
        if session.gop_size == 0 {
            return Err(ConfigError::Invalid("gop_size must be > 0".to_string()));
        }

        let stream = &self.stream;
        if stream.mtu < 500 || stream.mtu > 9000 {
            return Err(ConfigError::Invalid(format!(
                "MTU must be between 500 and 9000, got {}",
                stream.mtu
            )));
        }
        if !(96..=127).contains(&stream.payload_type) {
            return Err(ConfigError::Invalid(format!(
                "payload_type must be between 96 and 127, got {}",
                stream.payload_type
            )));
        }
        if stream.destination.trim().is_empty() {
            return Err(ConfigError::Invalid("destination must not be empty".to_string()));
        }

        if self.notifier.host.trim().is_empty() {
            return Err(ConfigError::Invalid("notifier host must not be empty".to_string()));
        }

        Ok(())
    }

    /// SDP output path, `None` when disabled
    pub fn sdp_path(&self) -> Option<&Path> {
        let path = self.stream.sdp_path.trim();
        (!path.is_empty()).then(|| Path::new(path))
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.frame_rate, 15);
        assert_eq!(config.stream.mtu, 1400);
        assert_eq!(config.notifier.host, "*");
        assert_eq!(config.notifier.port, 15001);
        assert_eq!(config.sdp_path(), Some(Path::new("stream.sdp")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[session]
frame_rate = 30
bitrate = 4000000
gop_size = 30

[stream]
destination = "192.168.1.100:5004"
mtu = 1200
ssrc = 0xDEADBEEF
sdp_path = ""

[notifier]
host = "127.0.0.1"
port = 16000
        "#;

        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.session.frame_rate, 30);
        assert_eq!(config.session.bitrate, 4_000_000);
        assert_eq!(config.stream.destination, "192.168.1.100:5004");
        assert_eq!(config.stream.mtu, 1200);
        assert_eq!(config.stream.ssrc, 0xDEADBEEF);
        assert_eq!(config.stream.payload_type, 96);
        assert_eq!(config.sdp_path(), None);
        assert_eq!(config.notifier.port, 16000);
    }

    #[test]
    fn test_invalid_mtu() {
        let toml = r#"
[stream]
mtu = 10000
        "#;

        assert!(matches!(Config::from_str(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_frame_rate() {
        assert!(Config::from_str("[session]\nframe_rate = 0").is_err());
        assert!(Config::from_str("[session]\nframe_rate = 121").is_err());
    }

    #[test]
    fn test_invalid_payload_type() {
        assert!(Config::from_str("[stream]\npayload_type = 33").is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_str("[session\nframe_rate = 15"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transmitter.toml");

        let mut config = Config::default();
        config.session.frame_rate = 25;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.session.frame_rate, 25);
        assert_eq!(loaded.stream.destination, config.stream.destination);
    }
}
