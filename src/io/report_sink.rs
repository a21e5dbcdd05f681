//! Remote reporting sink interface
//!
//! Sinks are best-effort: every call returns whether it succeeded and logs
//! its own failures. Callers never retry and never roll back local state.

use crate::domain::types::CountedEvent;
use crate::io::report_channel::SummaryReport;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Prepare the remote store before the first report
    async fn init(&self) -> bool {
        true
    }

    /// Record a counted event
    async fn report_event(&self, event: &CountedEvent) -> bool;

    /// Mirror the running totals
    async fn report_summary(&self, summary: &SummaryReport) -> bool;

    /// Reset the remote store to its initial state
    async fn reset(&self) -> bool;
}

/// Sink used when no remote store is configured: logs and succeeds
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn report_event(&self, event: &CountedEvent) -> bool {
        info!(
            code = %event.code,
            mode = %event.mode,
            ts = %event.timestamp_ms,
            "report_event"
        );
        true
    }

    async fn report_summary(&self, summary: &SummaryReport) -> bool {
        info!(
            total_inbound = %summary.total_inbound,
            total_outbound = %summary.total_outbound,
            remainder = %summary.remainder,
            "report_summary"
        );
        true
    }

    async fn reset(&self) -> bool {
        info!("report_reset");
        true
    }
}
