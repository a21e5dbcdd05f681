//! Station control loop
//!
//! The Station is the single consumer of decoder frames and operator
//! commands. It owns the detection tracker and coordinates:
//! - The new-object throttle in front of the tracker
//! - Display expiry, driven by frame time with a wall-clock fallback tick
//! - Remote reporting of counted events (fire-and-forget)

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::types::{epoch_ms, StationInput, TrackingMode};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::ReportSender;
use crate::services::detection_tracker::{Counters, DetectionTracker, StockBalance};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

/// Single-camera in/out counting station
pub struct Station {
    /// Debounce and display lifecycle
    pub(crate) tracker: DetectionTracker,
    /// Mode new observations are counted under
    pub(crate) mode: TrackingMode,
    /// Minimum spacing between admitted new objects
    pub(crate) new_object_gap_ms: u64,
    /// Time the last new object was admitted
    pub(crate) last_new_object_ms: Option<u64>,
    pub(crate) tick_interval_ms: u64,
    pub(crate) metrics: Arc<Metrics>,
    /// Remote report queue (optional)
    pub(crate) reporter: Option<ReportSender>,
}

impl Station {
    pub fn new(config: &Config, metrics: Arc<Metrics>, reporter: Option<ReportSender>) -> Self {
        Self {
            tracker: DetectionTracker::new(
                config.min_detection_gap_ms(),
                config.display_window_ms(),
            ),
            mode: config.default_mode(),
            new_object_gap_ms: config.new_object_gap_ms(),
            last_new_object_ms: None,
            tick_interval_ms: config.tick_interval_ms().max(1),
            metrics,
            reporter,
        }
    }

    /// Consume frames and commands until quit, shutdown or channel close
    pub async fn run(
        &mut self,
        mut input_rx: mpsc::Receiver<StationInput>,
        mut shutdown: watch::Receiver<bool>,
    ) -> StationSummary {
        // Fallback expiry when the decoder goes quiet
        let mut tick_interval = interval(Duration::from_millis(self.tick_interval_ms));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(mode = %self.mode, "station_started");

        loop {
            tokio::select! {
                input = input_rx.recv() => {
                    match input {
                        Some(input) => {
                            if self.process_input(input).is_break() {
                                break;
                            }
                        }
                        None => {
                            warn!("station_input_closed");
                            break;
                        }
                    }
                }
                _ = tick_interval.tick() => {
                    self.handle_tick(epoch_ms());
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("station_shutdown");
                        break;
                    }
                }
            }
        }

        self.summary()
    }

    /// Dispatch a single input
    pub fn process_input(&mut self, input: StationInput) -> ControlFlow<()> {
        match input {
            StationInput::Frame(frame) => {
                self.handle_frame(frame);
                ControlFlow::Continue(())
            }
            StationInput::Command(cmd) => self.handle_command(cmd, epoch_ms()),
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn counters(&self) -> Counters {
        self.tracker.counters()
    }

    pub fn tracker(&self) -> &DetectionTracker {
        &self.tracker
    }

    /// Final totals
    pub fn summary(&self) -> StationSummary {
        StationSummary::from_counters(self.tracker.counters())
    }
}

/// Totals reported when the station stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationSummary {
    pub inbound: u64,
    pub outbound: u64,
    pub remainder: i64,
    pub balance: StockBalance,
}

impl StationSummary {
    pub fn from_counters(counters: Counters) -> Self {
        Self {
            inbound: counters.inbound,
            outbound: counters.outbound,
            remainder: counters.remainder(),
            balance: counters.balance(),
        }
    }

    pub fn log(&self) {
        info!(
            inbound = %self.inbound,
            outbound = %self.outbound,
            remainder = %self.remainder,
            "station_summary"
        );
        match self.balance {
            StockBalance::Surplus(left) => info!(items = %left, "stock_remaining"),
            StockBalance::Deficit(excess) => warn!(items = %excess, "stock_deficit: more out than in"),
            StockBalance::Even => info!("stock_balanced"),
        }
    }
}
