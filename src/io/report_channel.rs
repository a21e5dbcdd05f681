//! Typed channel for remote report messages
//!
//! Provides a non-blocking way to hand reports from the station loop to the
//! report worker. Uses a bounded mpsc channel to prevent unbounded memory growth.

use crate::domain::types::CountedEvent;
use crate::infra::metrics::Metrics;
use crate::services::detection_tracker::Counters;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Messages that can be sent to the report worker
#[derive(Debug, Clone, PartialEq)]
pub enum ReportMessage {
    /// A code counted for the first time under a mode
    Event(CountedEvent),
    /// Running totals after an event
    Summary(SummaryReport),
    /// Operator-requested reset of the remote store
    Reset { requested_at_ms: u64 },
}

impl ReportMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ReportMessage::Event(_) => "event",
            ReportMessage::Summary(_) => "summary",
            ReportMessage::Reset { .. } => "reset",
        }
    }
}

/// Totals mirrored to the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryReport {
    pub total_inbound: u64,
    pub total_outbound: u64,
    /// Inbound minus outbound
    pub remainder: i64,
    /// Time of the event that triggered the summary (epoch ms)
    pub timestamp_ms: u64,
}

impl SummaryReport {
    pub fn from_counters(counters: Counters, timestamp_ms: u64) -> Self {
        Self {
            total_inbound: counters.inbound,
            total_outbound: counters.outbound,
            remainder: counters.remainder(),
            timestamp_ms,
        }
    }
}

/// Sender handle for report messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped and counted.
#[derive(Clone)]
pub struct ReportSender {
    tx: mpsc::Sender<ReportMessage>,
    metrics: Arc<Metrics>,
}

impl ReportSender {
    pub fn new(tx: mpsc::Sender<ReportMessage>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Queue a counted event
    pub fn send_event(&self, event: CountedEvent) -> bool {
        self.enqueue(ReportMessage::Event(event))
    }

    /// Queue a summary of the current totals
    pub fn send_summary(&self, summary: SummaryReport) -> bool {
        self.enqueue(ReportMessage::Summary(summary))
    }

    /// Queue a remote reset
    pub fn send_reset(&self, requested_at_ms: u64) -> bool {
        self.enqueue(ReportMessage::Reset { requested_at_ms })
    }

    /// Use try_send to avoid blocking the station - drop if channel full
    fn enqueue(&self, msg: ReportMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                self.metrics.record_report_dropped();
                warn!(kind = %msg.kind(), "report_dropped: channel full");
                false
            }
            Err(TrySendError::Closed(msg)) => {
                self.metrics.record_report_dropped();
                warn!(kind = %msg.kind(), "report_dropped: worker stopped");
                false
            }
        }
    }
}

/// Create a new report channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_report_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (ReportSender, mpsc::Receiver<ReportMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ReportSender::new(tx, metrics), rx)
}
