//! Operator console on stdin
//!
//! Single-letter commands, one per line:
//! `m` inbound, `k` outbound, `r` reset counters, `c` clear history,
//! `f` reset remote store, `s` status, `q` quit.
//!
//! Reads on a dedicated OS thread so a blocked stdin read never holds up
//! runtime shutdown.

use crate::domain::types::{OperatorCommand, StationInput};
use std::io::BufRead;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const HELP: &str =
    "commands: m=inbound k=outbound r=reset counters c=clear history f=reset remote s=status q=quit";

/// Parse an operator line; blank lines yield None
pub fn parse_operator_line(line: &str) -> Option<Result<OperatorCommand, String>> {
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.parse())
    }
}

/// Forward commands from any line source until it ends or the station stops
pub fn forward_commands<R: BufRead>(reader: R, input_tx: &mpsc::Sender<StationInput>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "operator_read_failed");
                break;
            }
        };

        match parse_operator_line(&line) {
            None => {}
            Some(Ok(cmd)) => {
                debug!(command = %cmd.as_str(), "operator_command");
                if input_tx.blocking_send(StationInput::Command(cmd)).is_err() {
                    // Station has stopped
                    return;
                }
                if cmd == OperatorCommand::Quit {
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "operator_unknown_command");
                info!("{HELP}");
            }
        }
    }

    // EOF leaves the station running; it still stops on ctrl-c
    debug!("operator_input_closed");
}

/// Spawn the stdin reader thread
pub fn spawn_operator_console(
    input_tx: mpsc::Sender<StationInput>,
) -> std::io::Result<JoinHandle<()>> {
    info!("{HELP}");
    std::thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            forward_commands(stdin.lock(), &input_tx);
        })
}
