//! Frame transmitter demo: streams a synthetic test pattern

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use frame_transmitter::{
    Config, ImageView, PixelLayout, SessionState, Transmitter, TransmitterStats,
};
use tokio::sync::{oneshot, watch};

#[derive(Parser, Debug)]
#[command(name = "frame-transmitter")]
#[command(about = "Encode frames to H.264 and stream them over RTP")]
#[command(version)]
struct Cli {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Notifier bind host (`*` for all interfaces)
    #[arg(long)]
    host: Option<String>,

    /// Notifier port
    #[arg(long)]
    port: Option<u16>,

    /// Frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// RTP destination host:port
    #[arg(long)]
    destination: Option<String>,

    /// Test pattern width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Test pattern height
    #[arg(long, default_value_t = 1024)]
    height: u32,

    /// Stop after this many frames (0 = until Ctrl+C)
    #[arg(long, default_value_t = 0)]
    frames: u64,
}

/// Moving vertical color bars in BGR with padded rows, the layout most
/// industrial cameras hand over.
struct TestPattern {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
    offset: usize,
}

impl TestPattern {
    const BARS: [[u8; 3]; 8] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
        [16, 16, 16],
    ];
    const ROW_PADDING: usize = 32;

    fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * PixelLayout::BYTES_PER_PIXEL + Self::ROW_PADDING;
        Self {
            width,
            height,
            stride,
            data: vec![0u8; stride * height as usize],
            offset: 0,
        }
    }

    fn next_frame(&mut self) -> ImageView<'_> {
        let width = self.width as usize;
        let bar_width = (width / Self::BARS.len()).max(1);

        for row in self.data.chunks_exact_mut(self.stride) {
            for col in 0..width {
                let bar = ((col + self.offset) / bar_width) % Self::BARS.len();
                let [r, g, b] = Self::BARS[bar];
                let px = col * PixelLayout::BYTES_PER_PIXEL;
                row[px..px + 3].copy_from_slice(&[b, g, r]);
            }
        }
        self.offset = (self.offset + 4) % width.max(1);

        ImageView::new(self.width, self.height, self.stride, PixelLayout::Bgr24, &self.data)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    log::info!("Frame transmitter starting with args: {:?}", cli);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(host) = cli.host.clone() {
        config.notifier.host = host;
    }
    if let Some(port) = cli.port {
        config.notifier.port = port;
    }
    if let Some(fps) = cli.fps {
        config.session.frame_rate = fps;
    }
    if let Some(destination) = cli.destination.clone() {
        config.stream.destination = destination;
    }
    config.validate()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutting down");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let (markers_tx, markers_rx) = oneshot::channel();
    let loop_flag = Arc::clone(&shutdown);
    let (width, height, max_frames) = (cli.width, cli.height, cli.frames);

    // The transmitter is single-threaded; it lives on one blocking thread
    let acquisition = tokio::task::spawn_blocking(move || -> Result<TransmitterStats> {
        let mut transmitter = Transmitter::new(&config)?;
        if let Some(notifier) = transmitter.notifier() {
            let _ = markers_tx.send(notifier.subscribe());
        }

        run_acquisition(&mut transmitter, &config, width, height, max_frames, &loop_flag);
        Ok(transmitter.shutdown())
    });

    if let Ok(markers) = markers_rx.await {
        tokio::spawn(watch_markers(markers));
    }

    let stats = acquisition.await??;
    log::info!(
        "Done: {} frames submitted, {} sent, {} RTP packets, {} markers ({} send failures)",
        stats.frames_submitted,
        stats.frames_sent,
        stats.rtp_packets_sent,
        stats.markers_published,
        stats.marker_send_failures
    );

    Ok(())
}

fn run_acquisition(
    transmitter: &mut Transmitter,
    config: &Config,
    width: u32,
    height: u32,
    max_frames: u64,
    shutdown: &AtomicBool,
) {
    let frame_interval = Duration::from_secs_f64(1.0 / config.session.frame_rate as f64);
    let mut pattern = TestPattern::new(width, height);

    let mut next_deadline = Instant::now();
    let mut last_report = (Instant::now(), TransmitterStats::default());
    let mut frame_count = 0u64;

    log::info!(
        "Streaming {}x{} test pattern at {} fps, press Ctrl+C to stop",
        width,
        height,
        config.session.frame_rate
    );

    while !shutdown.load(Ordering::Relaxed) && (max_frames == 0 || frame_count < max_frames) {
        let image = pattern.next_frame();
        if let Err(e) = transmitter.submit(&image) {
            log::error!("Frame {} not transmitted: {}", frame_count, e);
            if matches!(transmitter.state(), SessionState::Failed(_)) {
                break;
            }
        }
        frame_count += 1;

        // Log stats periodically
        if frame_count % 100 == 0 {
            let stats = transmitter.stats();
            let elapsed = last_report.0.elapsed().as_secs_f64();
            log::info!(
                "Frames: {} sent, {:.1} fps, {:.0} kbps, pts={}",
                stats.frames_sent,
                stats.calculate_fps(&last_report.1, elapsed),
                stats.calculate_bitrate_kbps(&last_report.1, elapsed),
                stats.last_pts
            );
            last_report = (Instant::now(), stats);
        }

        next_deadline += frame_interval;
        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        } else {
            next_deadline = now;
        }
    }
}

async fn watch_markers(mut markers: watch::Receiver<u64>) {
    let mut seen = 0u64;
    while markers.changed().await.is_ok() {
        let latest = *markers.borrow_and_update();
        seen += 1;
        if latest != seen {
            log::debug!("Marker subscriber skipped to frame {}", latest);
            seen = latest;
        }
    }
    log::debug!("Marker channel closed after {} frames", seen);
}
