use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::{OutputError, PacketSink};

/// RTP over UDP, RTCP on the next port up.
///
/// The local socket is bound at construction so bind failures surface before
/// the first frame; the destination is resolved on `open`.
pub struct UdpSink {
    socket: Option<UdpSocket>,
    destination: String,
    media_addr: Option<SocketAddr>,
    control_addr: Option<SocketAddr>,
}

impl UdpSink {
    pub fn bind(local: &str, destination: &str) -> Result<Self, OutputError> {
        let socket = UdpSocket::bind(local)?;
        log::info!("RTP socket bound to {}", socket.local_addr()?);

        Ok(Self {
            socket: Some(socket),
            destination: destination.to_string(),
            media_addr: None,
            control_addr: None,
        })
    }

    fn send_to(&self, packet: &[u8], addr: Option<SocketAddr>) -> Result<usize, OutputError> {
        let socket = self.socket.as_ref().ok_or(OutputError::Released)?;
        let addr = addr.ok_or(OutputError::NotOpen)?;
        Ok(socket.send_to(packet, addr)?)
    }
}

impl PacketSink for UdpSink {
    fn open(&mut self) -> Result<(), OutputError> {
        if self.socket.is_none() {
            return Err(OutputError::Released);
        }

        let media = self
            .destination
            .to_socket_addrs()
            .map_err(|e| OutputError::InvalidDestination(format!("{}: {}", self.destination, e)))?
            .next()
            .ok_or_else(|| OutputError::InvalidDestination(self.destination.clone()))?;

        let control_port = media.port().checked_add(1).ok_or_else(|| {
            OutputError::InvalidDestination(format!("{}: no room for RTCP port", self.destination))
        })?;
        let mut control = media;
        control.set_port(control_port);

        log::info!("Streaming RTP to {} (RTCP {})", media, control);
        self.media_addr = Some(media);
        self.control_addr = Some(control);
        Ok(())
    }

    fn send_media(&mut self, packet: &[u8]) -> Result<usize, OutputError> {
        self.send_to(packet, self.media_addr)
    }

    fn send_control(&mut self, packet: &[u8]) -> Result<usize, OutputError> {
        self.send_to(packet, self.control_addr)
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            log::debug!("RTP socket closed");
        }
    }

    fn destination(&self) -> Option<SocketAddr> {
        self.media_addr
    }
}
