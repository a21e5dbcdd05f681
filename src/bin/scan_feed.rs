//! Decoder feed forwarder
//!
//! Reads decoded codes from stdin, one per line, and forwards them to the
//! station's decoder feed. Pairs with any scanner that writes lines, e.g.
//!
//!   zbarcam --raw /dev/video0 | scan-feed
//!   zbarcam /dev/video0 | scan-feed --strip-symbology
//!
//! Blank lines are sent as `FRAME` so the station still advances expiry.

use anyhow::Context;
use clap::Parser;
use scan_gate::io::decoder_feed::{read_feed_line, FeedRead, MAX_LINE_BYTES};
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scan-feed")]
#[command(about = "Forward decoded codes from stdin to a scan-gate station")]
struct Args {
    /// Station decoder feed address
    #[arg(short, long, default_value = "127.0.0.1:25900")]
    addr: String,

    /// Strip a symbology prefix such as `QR-Code:` (zbarcam without --raw)
    #[arg(long)]
    strip_symbology: bool,
}

/// Turn one scanner line into a feed line
fn feed_line(raw: &str, strip_symbology: bool) -> String {
    let mut payload = raw.trim();
    if strip_symbology {
        if let Some((symbology, rest)) = payload.split_once(':') {
            let is_symbology = !symbology.is_empty()
                && !rest.starts_with("//")
                && symbology.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if is_symbology {
                payload = rest.trim();
            }
        }
    }

    if payload.is_empty() {
        "FRAME\n".to_string()
    } else {
        format!("CODE {payload}\n")
    }
}

/// Next feed line from scanner input, or `None` at end of input
///
/// Lines that are not UTF-8 are decoded lossily. Lines over the feed limit are
/// dropped with a warning.
async fn next_feed_line<R: AsyncBufRead + Unpin>(
    input: &mut R,
    buf: &mut Vec<u8>,
    strip_symbology: bool,
) -> anyhow::Result<Option<String>> {
    loop {
        match read_feed_line(input, buf).await.context("Failed to read stdin")? {
            FeedRead::Line => {
                return Ok(Some(feed_line(&String::from_utf8_lossy(buf), strip_symbology)));
            }
            FeedRead::TooLong => {
                warn!(max_bytes = %MAX_LINE_BYTES, "scan_feed_line_too_long");
            }
            FeedRead::Eof => return Ok(None),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let mut stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("Failed to connect to station at {}", args.addr))?;
    info!(addr = %args.addr, "scan_feed_connected");

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut buf = Vec::new();
    let mut sent = 0u64;
    while let Some(out) = next_feed_line(&mut stdin, &mut buf, args.strip_symbology).await? {
        if let Err(e) = stream.write_all(out.as_bytes()).await {
            warn!(error = %e, sent = %sent, "scan_feed_disconnected");
            return Err(e).context("Station closed the connection");
        }
        sent += 1;
    }

    stream.flush().await.ok();
    info!(sent = %sent, "scan_feed_done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_line_raw() {
        assert_eq!(feed_line("SKU-001\n", false), "CODE SKU-001\n");
        assert_eq!(feed_line("QR-Code:SKU-001", false), "CODE QR-Code:SKU-001\n");
        assert_eq!(feed_line("   ", false), "FRAME\n");
    }

    #[test]
    fn test_feed_line_strips_symbology() {
        assert_eq!(feed_line("QR-Code:SKU-001", true), "CODE SKU-001\n");
        assert_eq!(feed_line("QR-Code:", true), "FRAME\n");
        // URLs keep their scheme
        assert_eq!(feed_line("https://x.io/a", true), "CODE https://x.io/a\n");
    }

    #[tokio::test]
    async fn test_next_feed_line_survives_bad_input() {
        let mut input = b"QR-Code:caf\xe9\n".to_vec();
        input.extend(std::iter::repeat(b'z').take(MAX_LINE_BYTES + 10));
        input.extend_from_slice(b"\nQR-Code:SKU-7\n");
        let mut reader = BufReader::new(input.as_slice());
        let mut buf = Vec::new();

        let first = next_feed_line(&mut reader, &mut buf, true).await.unwrap();
        assert_eq!(first.as_deref(), Some("CODE caf\u{FFFD}\n"));
        let second = next_feed_line(&mut reader, &mut buf, true).await.unwrap();
        assert_eq!(second.as_deref(), Some("CODE SKU-7\n"));
        assert_eq!(next_feed_line(&mut reader, &mut buf, true).await.unwrap(), None);
    }
}
