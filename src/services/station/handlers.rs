//! Input handlers for the Station
//!
//! Frames flow throttle -> cooldown -> tracker -> report queue, and every
//! frame advances expiry with its own timestamp.

use super::Station;
use crate::domain::types::{Code, CountedEvent, DecodedFrame, OperatorCommand};
use crate::io::SummaryReport;
use std::ops::ControlFlow;
use std::time::Instant;
use tracing::{debug, info, trace};

impl Station {
    /// Handle one decoder frame
    pub(crate) fn handle_frame(&mut self, frame: DecodedFrame) {
        let process_start = Instant::now();
        let decoded = frame.code.is_some();

        if let Some(code) = &frame.code {
            self.handle_code(code, frame.received_at_ms);
        }
        self.expire_at(frame.received_at_ms);

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_frame_processed(decoded, latency_us);
    }

    /// Run a decoded code through throttle, cooldown and tracker
    ///
    /// Returns the counted event, if any.
    pub(crate) fn handle_code(&mut self, code: &Code, now_ms: u64) -> Option<CountedEvent> {
        if !self.throttle_allows(now_ms) {
            self.metrics.record_throttled();
            trace!(code = %code, reason = "throttle", "observation_rejected");
            return None;
        }

        if !self.tracker.can_accept(code, now_ms) {
            self.metrics.record_cooldown_rejected();
            trace!(code = %code, reason = "cooldown", "observation_rejected");
            return None;
        }

        let outcome = self.tracker.process_observation(code, now_ms, self.mode);
        self.metrics.record_observation_accepted(outcome.is_new_object);
        if outcome.is_new_object {
            self.last_new_object_ms = Some(now_ms);
        }

        let event = outcome.event?;
        self.publish_event(&event);
        Some(event)
    }

    /// More than `new_object_gap_ms` since the last admitted new object
    fn throttle_allows(&self, now_ms: u64) -> bool {
        self.last_new_object_ms
            .map_or(true, |last| now_ms.saturating_sub(last) > self.new_object_gap_ms)
    }

    /// Queue the event and the totals that follow from it
    fn publish_event(&self, event: &CountedEvent) {
        self.metrics.record_event(event.mode);

        if let Some(ref reporter) = self.reporter {
            reporter.send_event(event.clone());
            reporter.send_summary(SummaryReport::from_counters(
                self.tracker.counters(),
                event.timestamp_ms,
            ));
        }
    }

    /// Wall-clock expiry when no frames arrive
    pub(crate) fn handle_tick(&mut self, now_ms: u64) {
        self.expire_at(now_ms);
    }

    fn expire_at(&mut self, now_ms: u64) {
        let expired = self.tracker.expire(now_ms);
        if expired > 0 {
            self.metrics.record_expired(expired);
        }
        self.metrics.set_active_objects(self.tracker.active_count());
    }

    /// Apply an operator command; `Break` stops the station
    pub(crate) fn handle_command(&mut self, cmd: OperatorCommand, now_ms: u64) -> ControlFlow<()> {
        match cmd {
            OperatorCommand::SetMode(mode) => {
                if mode != self.mode {
                    info!(from = %self.mode, to = %mode, "mode_changed");
                    self.mode = mode;
                } else {
                    debug!(mode = %mode, "mode_unchanged");
                }
            }
            OperatorCommand::ResetCounters => {
                self.tracker.reset_counters();
                info!("counters_reset");
            }
            OperatorCommand::ClearHistory => {
                self.tracker.clear_history();
                self.metrics.set_active_objects(0);
                info!("history_cleared");
            }
            OperatorCommand::RemoteReset => {
                self.tracker.reset_counters();
                let queued = match self.reporter {
                    Some(ref reporter) => reporter.send_reset(now_ms),
                    None => false,
                };
                info!(queued = %queued, "remote_reset_requested");
            }
            OperatorCommand::Status => self.log_status(now_ms),
            OperatorCommand::Quit => {
                info!("quit_requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn log_status(&self, now_ms: u64) {
        let counters = self.tracker.counters();
        info!(
            mode = %self.mode,
            inbound = %counters.inbound,
            outbound = %counters.outbound,
            remainder = %counters.remainder(),
            active = %self.tracker.active_count(),
            min_gap_ms = %self.tracker.min_gap_ms(),
            display_window_ms = %self.tracker.display_window_ms(),
            "station_status"
        );
        for object in self.tracker.active_objects(now_ms) {
            info!(
                code = %object.code.display_short(24),
                mode = %object.mode,
                remaining_ms = %object.remaining_ms,
                "active_object"
            );
        }
    }
}
