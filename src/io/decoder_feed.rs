//! Decoder feed TCP listener
//!
//! An external decoder process pushes one line per camera frame:
//! - `CODE <payload>`: a frame in which a code was decoded
//! - `FRAME`: a frame without a code (still drives expiry)
//!
//! Frames are stamped with the receive time and forwarded to the station.

use crate::domain::types::{epoch_ms, Code, DecodedFrame, StationInput};
use crate::infra::metrics::Metrics;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Longest accepted feed line in bytes, excluding the newline
pub const MAX_LINE_BYTES: usize = 4096;

/// Outcome of reading one feed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedRead {
    /// A line (possibly without trailing newline at end of stream) is in the buffer
    Line,
    /// The line exceeded `MAX_LINE_BYTES` and was discarded up to its newline
    TooLong,
    /// End of stream
    Eof,
}

/// Read one newline-terminated line as raw bytes into `buf`
///
/// Never buffers more than `MAX_LINE_BYTES + 1` bytes per line. Payload bytes
/// are not required to be UTF-8.
pub async fn read_feed_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<FeedRead> {
    buf.clear();
    let limit = MAX_LINE_BYTES as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;

    if n == 0 {
        return Ok(FeedRead::Eof);
    }
    if buf.last() == Some(&b'\n') || (n as u64) < limit {
        return Ok(FeedRead::Line);
    }

    // Over the cap: skip the rest of the line
    buf.clear();
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(FeedRead::TooLong);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(FeedRead::TooLong);
        }
    }
}

/// Decoder feed configuration
#[derive(Debug, Clone)]
pub struct DecoderFeedConfig {
    pub bind_address: String,
    pub port: u16,
    pub enabled: bool,
}

impl Default for DecoderFeedConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 25900, enabled: true }
    }
}

/// Parse one feed line into a frame
///
/// Returns None for blank or unrecognised lines. `CODE` with an empty
/// payload counts as a frame without a code.
pub fn parse_feed_line(line: &str, received_at_ms: u64) -> Option<DecodedFrame> {
    let line = line.trim();
    if line == "FRAME" || line == "CODE" {
        return Some(DecodedFrame::miss(received_at_ms));
    }
    let payload = line.strip_prefix("CODE ")?;
    Some(match Code::parse(payload) {
        Some(code) => DecodedFrame::with_code(code, received_at_ms),
        None => DecodedFrame::miss(received_at_ms),
    })
}

/// Start the decoder feed listener
///
/// Frames are sent via try_send so a slow station never stalls the decoder;
/// drops are counted in metrics.
pub async fn start_decoder_feed(
    config: DecoderFeedConfig,
    input_tx: mpsc::Sender<StationInput>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    if !config.enabled {
        info!("decoder_feed_disabled");
        return Ok(());
    }

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind decoder feed on {addr}"))?;

    info!(addr = %addr, "decoder_feed_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("decoder_feed_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, peer)) => {
                        let tx = input_tx.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_feed_connection(socket, peer, tx, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "decoder_feed_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_feed_connection(
    socket: TcpStream,
    peer: SocketAddr,
    input_tx: mpsc::Sender<StationInput>,
    metrics: Arc<Metrics>,
) {
    info!(peer = %peer, "decoder_connected");

    let mut reader = BufReader::new(socket);
    let mut buf = Vec::with_capacity(256);

    // Rate-limit drop and oversize warnings to 1 per second
    let mut last_drop_warn: Option<Instant> = None;
    let mut last_oversize_warn: Option<Instant> = None;

    loop {
        match read_feed_line(&mut reader, &mut buf).await {
            Ok(FeedRead::Line) => {}
            Ok(FeedRead::TooLong) => {
                if last_oversize_warn.map_or(true, |t| t.elapsed() > Duration::from_secs(1)) {
                    warn!(peer = %peer, max_bytes = %MAX_LINE_BYTES, "decoder_line_too_long");
                    last_oversize_warn = Some(Instant::now());
                }
                continue;
            }
            Ok(FeedRead::Eof) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "decoder_read_failed");
                break;
            }
        }

        // Non-UTF-8 payloads (Latin-1, binary) are kept with replacement characters
        let line = String::from_utf8_lossy(&buf);
        let Some(frame) = parse_feed_line(&line, epoch_ms()) else {
            if !line.trim().is_empty() {
                debug!(peer = %peer, line = %line.trim(), "decoder_unknown_line");
            }
            continue;
        };

        match input_tx.try_send(StationInput::Frame(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_frame_dropped();
                if last_drop_warn.map_or(true, |t| t.elapsed() > Duration::from_secs(1)) {
                    warn!(peer = %peer, "frame_dropped: station queue full");
                    last_drop_warn = Some(Instant::now());
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!(peer = %peer, "decoder_feed_station_closed");
                break;
            }
        }
    }

    info!(peer = %peer, "decoder_disconnected");
}
