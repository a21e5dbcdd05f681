//! Report worker - pushes counted events to the remote store off the hot path
//!
//! The station enqueues report messages via an mpsc channel and never waits on
//! the network. The worker drains the channel in order, so an event is always
//! written before the summary that follows it.

use crate::infra::metrics::Metrics;
use crate::io::report_channel::ReportMessage;
use crate::io::report_sink::ReportSink;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Worker that delivers report messages to a sink
pub struct ReportWorker {
    sink: Arc<dyn ReportSink>,
    rx: mpsc::Receiver<ReportMessage>,
    metrics: Arc<Metrics>,
}

impl ReportWorker {
    pub fn new(
        sink: Arc<dyn ReportSink>,
        rx: mpsc::Receiver<ReportMessage>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { sink, rx, metrics }
    }

    /// Run the worker, processing messages until every sender is dropped
    pub async fn run(mut self) {
        let sink = self.sink.name();
        if !self.sink.init().await {
            // Keep going: later writes may succeed once the store is reachable
            warn!(sink = %sink, "report_sink_init_failed");
        }
        info!(sink = %sink, "report_worker_started");

        while let Some(msg) = self.rx.recv().await {
            let start = Instant::now();
            let ok = self.deliver(&msg).await;
            self.metrics.record_report(ok);
            debug!(
                sink = %sink,
                kind = %msg.kind(),
                ok = %ok,
                latency_ms = %start.elapsed().as_millis(),
                "report_processed"
            );
        }

        info!(sink = %sink, "report_worker_stopped");
    }

    async fn deliver(&self, msg: &ReportMessage) -> bool {
        match msg {
            ReportMessage::Event(event) => self.sink.report_event(event).await,
            ReportMessage::Summary(summary) => self.sink.report_summary(summary).await,
            ReportMessage::Reset { .. } => self.sink.reset().await,
        }
    }
}
