//! Shared types for the scan station

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Decoded payload of a scanned visual code
///
/// Never empty: surrounding whitespace is trimmed on construction and blank
/// payloads are rejected, so a `Code` can always be tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    /// Build a code from raw decoder output, `None` for blank payloads
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines and status listings
    pub fn display_short(&self, max_chars: usize) -> String {
        if self.0.chars().count() > max_chars {
            let head: String = self.0.chars().take(max_chars).collect();
            format!("{head}...")
        } else {
            self.0.clone()
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical queue an observation is counted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Items entering the storage location
    #[default]
    Inbound,
    /// Items leaving the storage location
    Outbound,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Inbound => "inbound",
            TrackingMode::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbound" | "in" => Ok(TrackingMode::Inbound),
            "outbound" | "out" => Ok(TrackingMode::Outbound),
            other => Err(format!("unknown tracking mode: {other}")),
        }
    }
}

/// Result of decoding one camera frame, as delivered by the decoder feed
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Last code decoded in the frame, `None` on a decode miss
    pub code: Option<Code>,
    /// Wall-clock time the frame was received (epoch ms)
    pub received_at_ms: u64,
}

impl DecodedFrame {
    pub fn with_code(code: Code, received_at_ms: u64) -> Self {
        Self { code: Some(code), received_at_ms }
    }

    pub fn miss(received_at_ms: u64) -> Self {
        Self { code: None, received_at_ms }
    }
}

/// An object counted for the first time under a mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedEvent {
    pub code: Code,
    pub mode: TrackingMode,
    /// Observation time (epoch ms)
    pub timestamp_ms: u64,
}

/// Discrete operator actions on the running station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Switch the mode new observations are counted under
    SetMode(TrackingMode),
    /// Zero both counters
    ResetCounters,
    /// Forget history, tracked objects and markers so codes can be recounted
    ClearHistory,
    /// Reset the remote store and the local counters
    RemoteReset,
    /// Log counters and currently tracked objects
    Status,
    /// Stop the station
    Quit,
}

impl std::str::FromStr for OperatorCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "m" | "in" | "inbound" => OperatorCommand::SetMode(TrackingMode::Inbound),
            "k" | "out" | "outbound" => OperatorCommand::SetMode(TrackingMode::Outbound),
            "r" | "reset" => OperatorCommand::ResetCounters,
            "c" | "clear" => OperatorCommand::ClearHistory,
            "f" | "remote-reset" => OperatorCommand::RemoteReset,
            "s" | "status" => OperatorCommand::Status,
            "q" | "quit" | "exit" => OperatorCommand::Quit,
            other => return Err(format!("unknown command: {other}")),
        })
    }
}

impl OperatorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorCommand::SetMode(TrackingMode::Inbound) => "mode_inbound",
            OperatorCommand::SetMode(TrackingMode::Outbound) => "mode_outbound",
            OperatorCommand::ResetCounters => "reset_counters",
            OperatorCommand::ClearHistory => "clear_history",
            OperatorCommand::RemoteReset => "remote_reset",
            OperatorCommand::Status => "status",
            OperatorCommand::Quit => "quit",
        }
    }
}

/// Input to the station control loop
#[derive(Debug, Clone, PartialEq)]
pub enum StationInput {
    Frame(DecodedFrame),
    Command(OperatorCommand),
}
