//! Tests for the Station module

use super::*;
use crate::domain::types::{Code, CountedEvent, DecodedFrame, OperatorCommand};
use crate::io::{create_report_channel, ReportMessage, SummaryReport};

/// Test harness that keeps the report receiver alive so `try_send` succeeds
struct TestStation {
    station: Station,
    report_rx: mpsc::Receiver<ReportMessage>,
    metrics: Arc<Metrics>,
}

impl std::ops::Deref for TestStation {
    type Target = Station;
    fn deref(&self) -> &Self::Target {
        &self.station
    }
}

impl std::ops::DerefMut for TestStation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.station
    }
}

impl TestStation {
    /// Messages queued for the report worker so far
    fn drain_reports(&mut self) -> Vec<ReportMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.report_rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn create_test_station() -> TestStation {
    create_test_station_with(Config::default().with_tracking(500, 3000), 64)
}

fn create_test_station_with(config: Config, queue_size: usize) -> TestStation {
    let metrics = Arc::new(Metrics::new());
    let (sender, report_rx) = create_report_channel(queue_size, metrics.clone());
    let station = Station::new(&config, metrics.clone(), Some(sender));
    TestStation { station, report_rx, metrics }
}

fn code(s: &str) -> Code {
    Code::parse(s).unwrap()
}

fn seen(station: &mut Station, s: &str, at_ms: u64) {
    station.handle_frame(DecodedFrame::with_code(code(s), at_ms));
}

#[test]
fn test_first_sighting_counts_and_reports() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);

    assert_eq!(t.counters(), Counters { inbound: 1, outbound: 0 });
    assert_eq!(t.tracker().active_count(), 1);
    assert_eq!(
        t.drain_reports(),
        vec![
            ReportMessage::Event(CountedEvent {
                code: code("A"),
                mode: TrackingMode::Inbound,
                timestamp_ms: 1_000,
            }),
            ReportMessage::Summary(SummaryReport {
                total_inbound: 1,
                total_outbound: 0,
                remainder: 1,
                timestamp_ms: 1_000,
            }),
        ]
    );
}

#[test]
fn test_repeat_inside_cooldown_is_ignored() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    t.drain_reports();

    seen(&mut t, "A", 1_300);
    assert_eq!(t.metrics.report().cooldown_rejected, 1);
    assert_eq!(t.tracker().tracked(&code("A")).unwrap().last_update_ms, 1_000);

    // Past the gap: refresh only, no second count
    seen(&mut t, "A", 1_600);
    assert_eq!(t.tracker().tracked(&code("A")).unwrap().last_update_ms, 1_600);
    assert_eq!(t.counters().inbound, 1);
    assert!(t.drain_reports().is_empty());
}

#[test]
fn test_new_object_throttle() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    seen(&mut t, "B", 1_050);
    assert_eq!(t.counters().inbound, 1);
    assert_eq!(t.metrics.report().throttled_frames, 1);
    assert!(t.tracker().tracked(&code("B")).is_none());

    seen(&mut t, "B", 1_150);
    assert_eq!(t.counters().inbound, 2);
}

#[test]
fn test_throttle_ignores_refreshes() {
    let mut t = create_test_station_with(Config::default().with_tracking(50, 3000), 64);

    seen(&mut t, "A", 1_000);
    // Refresh of A does not move the throttle window
    seen(&mut t, "A", 1_200);
    seen(&mut t, "B", 1_250);
    assert_eq!(t.counters().inbound, 2);
}

#[test]
fn test_zero_throttle_gap_admits_back_to_back_objects() {
    let config = Config::default().with_tracking(500, 3000).with_new_object_gap_ms(0);
    let mut t = create_test_station_with(config, 64);

    seen(&mut t, "A", 1_000);
    seen(&mut t, "B", 1_001);
    assert_eq!(t.counters().inbound, 2);
}

#[test]
fn test_mode_switch_counts_again_under_new_mode() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    assert!(t.handle_command(OperatorCommand::SetMode(TrackingMode::Outbound), 1_100).is_continue());
    assert_eq!(t.mode(), TrackingMode::Outbound);

    seen(&mut t, "A", 1_600);
    assert_eq!(t.counters(), Counters { inbound: 1, outbound: 1 });
    assert_eq!(t.tracker().tracked(&code("A")).unwrap().mode, TrackingMode::Outbound);

    // Already counted under both modes
    seen(&mut t, "A", 2_200);
    assert_eq!(t.counters(), Counters { inbound: 1, outbound: 1 });

    let reports = t.drain_reports();
    assert_eq!(reports.len(), 4);
    assert_eq!(
        reports[3],
        ReportMessage::Summary(SummaryReport {
            total_inbound: 1,
            total_outbound: 1,
            remainder: 0,
            timestamp_ms: 1_600,
        })
    );
}

#[test]
fn test_reset_counters_keeps_markers() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    t.handle_command(OperatorCommand::ResetCounters, 1_100);
    assert_eq!(t.counters(), Counters::default());

    // A is still marked: no recount
    seen(&mut t, "A", 1_600);
    assert_eq!(t.counters(), Counters::default());
}

#[test]
fn test_clear_history_allows_recount() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    t.handle_command(OperatorCommand::ClearHistory, 1_100);
    assert_eq!(t.tracker().active_count(), 0);
    assert_eq!(t.counters().inbound, 1);

    seen(&mut t, "A", 1_200);
    assert_eq!(t.counters().inbound, 2);
}

#[test]
fn test_remote_reset_zeroes_counters_and_queues_reset() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    t.drain_reports();

    t.handle_command(OperatorCommand::RemoteReset, 5_000);

    assert_eq!(t.counters(), Counters::default());
    assert_eq!(t.drain_reports(), vec![ReportMessage::Reset { requested_at_ms: 5_000 }]);
}

#[test]
fn test_remote_reset_without_reporter() {
    let metrics = Arc::new(Metrics::new());
    let config = Config::default();
    let mut station = Station::new(&config, metrics, None);

    seen(&mut station, "A", 1_000);
    station.handle_command(OperatorCommand::RemoteReset, 1_100);
    assert_eq!(station.counters(), Counters::default());
}

#[test]
fn test_status_and_quit() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    assert!(t.handle_command(OperatorCommand::Status, 1_500).is_continue());
    assert!(t.handle_command(OperatorCommand::Quit, 1_600).is_break());
}

#[test]
fn test_tracker_windows_follow_config() {
    let t = create_test_station_with(Config::default().with_tracking(250, 1_500), 8);
    assert_eq!(t.tracker().min_gap_ms(), 250);
    assert_eq!(t.tracker().display_window_ms(), 1_500);

    let t = create_test_station();
    assert_eq!(t.tracker().min_gap_ms(), 500);
    assert_eq!(t.tracker().display_window_ms(), 3000);
}

#[test]
fn test_miss_frames_drive_expiry() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);

    t.handle_frame(DecodedFrame::miss(4_000));
    assert_eq!(t.tracker().active_count(), 1);

    t.handle_frame(DecodedFrame::miss(4_001));
    assert_eq!(t.tracker().active_count(), 0);

    let summary = t.metrics.report();
    assert_eq!(summary.expired_total, 1);
    assert_eq!(summary.active_objects, 0);
    assert_eq!(summary.frames_total, 3);
    assert_eq!(summary.decoded_frames_total, 1);
}

#[test]
fn test_tick_expires_without_frames() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    t.handle_tick(10_000);
    assert_eq!(t.tracker().active_count(), 0);

    // Tracked again once expired, but already counted under this mode
    seen(&mut t, "A", 10_100);
    assert_eq!(t.tracker().active_count(), 1);
    assert_eq!(t.counters().inbound, 1);
}

#[test]
fn test_full_report_queue_keeps_local_state() {
    let mut t = create_test_station_with(Config::default().with_tracking(500, 3000), 1);

    seen(&mut t, "A", 1_000);

    // Event fits, summary is dropped
    assert_eq!(t.counters().inbound, 1);
    assert_eq!(t.metrics.reports_dropped(), 1);
    assert_eq!(t.drain_reports().len(), 1);
}

#[test]
fn test_summary_balance() {
    let mut t = create_test_station();

    seen(&mut t, "A", 1_000);
    t.handle_command(OperatorCommand::SetMode(TrackingMode::Outbound), 1_100);
    seen(&mut t, "B", 1_200);
    seen(&mut t, "C", 1_400);

    let summary = t.summary();
    assert_eq!(summary.inbound, 1);
    assert_eq!(summary.outbound, 2);
    assert_eq!(summary.remainder, -1);
    assert_eq!(summary.balance, StockBalance::Deficit(1));
}

#[tokio::test]
async fn test_run_until_quit() {
    let mut t = create_test_station();
    let (input_tx, input_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let now = epoch_ms();
    input_tx.send(StationInput::Frame(DecodedFrame::with_code(code("A"), now))).await.unwrap();
    input_tx
        .send(StationInput::Frame(DecodedFrame::with_code(code("B"), now + 200)))
        .await
        .unwrap();
    input_tx.send(StationInput::Command(OperatorCommand::Quit)).await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), t.run(input_rx, shutdown_rx))
        .await
        .expect("station should stop on quit");

    assert_eq!(summary.inbound, 2);
    assert_eq!(summary.balance, StockBalance::Surplus(2));
    assert_eq!(t.drain_reports().len(), 4);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let mut t = create_test_station();
    let (_input_tx, input_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        shutdown_tx
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), t.run(input_rx, shutdown_rx))
        .await
        .expect("station should stop on shutdown");
    let _ = stopper.await;

    assert_eq!(summary, StationSummary::from_counters(Counters::default()));
}

#[tokio::test]
async fn test_run_stops_when_inputs_close() {
    let mut t = create_test_station();
    let (input_tx, input_rx) = mpsc::channel::<StationInput>(1);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    drop(input_tx);

    let summary = tokio::time::timeout(Duration::from_secs(5), t.run(input_rx, shutdown_rx))
        .await
        .expect("station should stop when inputs close");
    assert_eq!(summary.inbound, 0);
}
