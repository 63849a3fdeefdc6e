//! Frame-ready notifications for downstream consumers

use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("ZMQ error: {0}")]
    Zmq(#[from] zmq::Error),
}

/// Fire-and-forget signal emitted once per transmitted frame
pub trait FrameNotifier {
    /// Publishes one marker without blocking. Returns `false` when the send
    /// failed; a marker later replaced in the queue still counts as sent.
    fn frame_ready(&mut self) -> bool;

    fn close(&mut self);
}

/// ZMQ PUB socket emitting one empty message per frame.
///
/// The outbound queue holds a single message (`SNDHWM=1` plus `CONFLATE`):
/// a subscriber that falls behind only ever sees the newest marker, and the
/// pipeline never waits on it. In-process consumers get the same semantics
/// through [`ZmqNotifier::subscribe`].
///
/// Conflation replaces the queued marker inside ZMQ, so a send into a full
/// queue still succeeds. Markers lost that way are invisible here; only
/// outright send failures are counted.
pub struct ZmqNotifier {
    _context: zmq::Context,
    socket: Option<zmq::Socket>,
    endpoint: String,
    frames: watch::Sender<u64>,
    sequence: u64,
    published: u64,
    send_failures: u64,
}

impl ZmqNotifier {
    /// Binds `tcp://{host}:{port}`; port 0 picks an ephemeral port
    pub fn bind(host: &str, port: u16) -> Result<Self, NotifierError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUB)?;
        socket.set_sndhwm(1)?;
        socket.set_conflate(true)?;
        socket.set_linger(0)?;

        let requested = if port == 0 {
            format!("tcp://{}:*", host)
        } else {
            format!("tcp://{}:{}", host, port)
        };
        socket.bind(&requested)?;

        let endpoint = socket.get_last_endpoint()?.unwrap_or(requested);
        log::info!("Frame notifier bound to {}", endpoint);

        let (frames, _) = watch::channel(0);

        Ok(Self {
            _context: context,
            socket: Some(socket),
            endpoint,
            frames,
            sequence: 0,
            published: 0,
            send_failures: 0,
        })
    }

    /// Endpoint actually bound, with the resolved port
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// In-process subscription; the value is the number of the latest frame
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.frames.subscribe()
    }

    /// Markers accepted by the socket, including ones later conflated away
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }
}

impl FrameNotifier for ZmqNotifier {
    fn frame_ready(&mut self) -> bool {
        self.sequence += 1;
        self.frames.send_replace(self.sequence);

        let Some(socket) = self.socket.as_ref() else {
            self.send_failures += 1;
            return false;
        };

        match socket.send(zmq::Message::new(), zmq::DONTWAIT) {
            Ok(()) => {
                self.published += 1;
                true
            }
            Err(e) => {
                log::warn!("Frame marker not sent: {}", e);
                self.send_failures += 1;
                false
            }
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            log::debug!(
                "Frame notifier closed ({} published, {} send failures)",
                self.published,
                self.send_failures
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_receives_empty_marker() {
        let mut notifier = ZmqNotifier::bind("127.0.0.1", 0).unwrap();
        assert!(!notifier.endpoint().ends_with(":*"));

        let ctx = zmq::Context::new();
        let sub = ctx.socket(zmq::SUB).unwrap();
        sub.set_subscribe(b"").unwrap();
        sub.set_rcvtimeo(100).unwrap();
        sub.connect(notifier.endpoint()).unwrap();

        // PUB drops everything until the subscription has propagated
        let mut received = None;
        for _ in 0..50 {
            notifier.frame_ready();
            if let Ok(msg) = sub.recv_bytes(0) {
                received = Some(msg);
                break;
            }
        }

        assert_eq!(received, Some(Vec::new()));
    }

    #[test]
    fn test_in_process_subscriber_sees_latest_only() {
        let mut notifier = ZmqNotifier::bind("127.0.0.1", 0).unwrap();
        let mut rx = notifier.subscribe();

        for _ in 0..3 {
            notifier.frame_ready();
        }

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 3);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_slow_subscriber_gets_newest_marker_only() {
        let mut notifier = ZmqNotifier::bind("127.0.0.1", 0).unwrap();

        let ctx = zmq::Context::new();
        let sub = ctx.socket(zmq::SUB).unwrap();
        sub.set_subscribe(b"").unwrap();
        sub.set_rcvtimeo(100).unwrap();
        sub.connect(notifier.endpoint()).unwrap();

        // Wait until the subscription reached the publisher, then drain
        let mut subscribed = false;
        for _ in 0..50 {
            notifier.frame_ready();
            if sub.recv_bytes(0).is_ok() {
                subscribed = true;
                break;
            }
        }
        assert!(subscribed);
        while sub.recv_bytes(0).is_ok() {}

        let before = notifier.published();
        for _ in 0..20 {
            assert!(notifier.frame_ready());
        }
        assert_eq!(notifier.published() - before, 20);
        assert_eq!(notifier.send_failures(), 0);

        let mut received = Vec::new();
        while let Ok(msg) = sub.recv_bytes(0) {
            received.push(msg);
        }
        assert_eq!(received, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_send_without_subscribers_never_blocks() {
        let mut notifier = ZmqNotifier::bind("127.0.0.1", 0).unwrap();
        let start = std::time::Instant::now();
        for _ in 0..100 {
            assert!(notifier.frame_ready());
        }
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(notifier.published(), 100);
        assert_eq!(notifier.send_failures(), 0);
    }

    #[test]
    fn test_closed_notifier_counts_send_failure() {
        let mut notifier = ZmqNotifier::bind("127.0.0.1", 0).unwrap();
        notifier.close();
        notifier.close();
        assert!(!notifier.frame_ready());
        assert_eq!(notifier.published(), 0);
        assert_eq!(notifier.send_failures(), 1);
    }
}
