//! Lock-free metrics collection and periodic reporting
//!
//! Station, decoder feed and report worker update counters from different
//! tasks without locking. Periodic values (frame rate, latency histogram)
//! are swapped out on each report.
//!
//! Relaxed ordering throughout: counters are statistics only and must not
//! drive station logic.

use crate::domain::types::TrackingMode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Read all buckets without resetting them
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total frames handled by the station (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Frames that carried a decoded code (monotonic)
    decoded_frames_total: AtomicU64,
    /// Observations passed to the tracker (monotonic)
    observations_accepted: AtomicU64,
    /// Observations rejected by the per-code cooldown (monotonic)
    cooldown_rejected: AtomicU64,
    /// Decoded frames skipped right after a new object (monotonic)
    throttled_frames: AtomicU64,
    /// Observations that started a new display lifetime (monotonic)
    new_objects_total: AtomicU64,
    /// Counted events per mode (monotonic)
    events_inbound: AtomicU64,
    events_outbound: AtomicU64,
    /// Objects removed by display expiry (monotonic)
    expired_total: AtomicU64,
    /// Currently tracked objects (gauge)
    active_objects: AtomicU64,
    /// Frames dropped at the decoder feed because the station queue was full
    frames_dropped: AtomicU64,
    /// Report calls that succeeded / failed at the sink
    reports_sent: AtomicU64,
    reports_failed: AtomicU64,
    /// Report messages dropped because the report queue was full
    reports_dropped: AtomicU64,
    /// Sum of frame processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max frame processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Frame processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Cumulative latency sum and buckets for scrapes (never reset)
    latency_sum_total_us: AtomicU64,
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            decoded_frames_total: AtomicU64::new(0),
            observations_accepted: AtomicU64::new(0),
            cooldown_rejected: AtomicU64::new(0),
            throttled_frames: AtomicU64::new(0),
            new_objects_total: AtomicU64::new(0),
            events_inbound: AtomicU64::new(0),
            events_outbound: AtomicU64::new(0),
            expired_total: AtomicU64::new(0),
            active_objects: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            reports_sent: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
            reports_dropped: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_us: AtomicU64::new(0),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a frame was processed with given latency (lock-free)
    #[inline]
    pub fn record_frame_processed(&self, decoded: bool, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        if decoded {
            self.decoded_frames_total.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_observation_accepted(&self, new_object: bool) {
        self.observations_accepted.fetch_add(1, Ordering::Relaxed);
        if new_object {
            self.new_objects_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_cooldown_rejected(&self) {
        self.cooldown_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_throttled(&self) {
        self.throttled_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event(&self, mode: TrackingMode) {
        match mode {
            TrackingMode::Inbound => self.events_inbound.fetch_add(1, Ordering::Relaxed),
            TrackingMode::Outbound => self.events_outbound.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_expired(&self, count: usize) {
        self.expired_total.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_active_objects(&self, count: usize) {
        self.active_objects.store(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report(&self, ok: bool) {
        if ok {
            self.reports_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reports_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_report_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total frames processed
    #[inline]
    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reports_failed(&self) -> u64 {
        self.reports_failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reports_dropped(&self) -> u64 {
        self.reports_dropped.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let frames_count = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if frames_count > 0 { latency_sum / frames_count } else { 0 };

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec,
            decoded_frames_total: self.decoded_frames_total.load(Ordering::Relaxed),
            observations_accepted: self.observations_accepted.load(Ordering::Relaxed),
            cooldown_rejected: self.cooldown_rejected.load(Ordering::Relaxed),
            throttled_frames: self.throttled_frames.load(Ordering::Relaxed),
            new_objects_total: self.new_objects_total.load(Ordering::Relaxed),
            events_inbound: self.events_inbound.load(Ordering::Relaxed),
            events_outbound: self.events_outbound.load(Ordering::Relaxed),
            expired_total: self.expired_total.load(Ordering::Relaxed),
            active_objects: self.active_objects.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            avg_latency_us: avg_latency,
            max_latency_us: max_latency,
            lat_sum_us: latency_sum,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
        }
    }

    /// Cumulative view for Prometheus scrapes, leaving periodic counters alone
    ///
    /// Latency buckets and sum cover the whole process lifetime, so scraped
    /// histogram series never go backwards. `frames_per_sec` is left at zero;
    /// use `rate()` on `frames_total` instead.
    pub fn snapshot(&self) -> MetricsSummary {
        let lat_buckets = load_buckets(&self.latency_buckets_total);
        let count: u64 = lat_buckets.iter().sum();
        let lat_sum = self.latency_sum_total_us.load(Ordering::Relaxed);

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec: 0.0,
            decoded_frames_total: self.decoded_frames_total.load(Ordering::Relaxed),
            observations_accepted: self.observations_accepted.load(Ordering::Relaxed),
            cooldown_rejected: self.cooldown_rejected.load(Ordering::Relaxed),
            throttled_frames: self.throttled_frames.load(Ordering::Relaxed),
            new_objects_total: self.new_objects_total.load(Ordering::Relaxed),
            events_inbound: self.events_inbound.load(Ordering::Relaxed),
            events_outbound: self.events_outbound.load(Ordering::Relaxed),
            expired_total: self.expired_total.load(Ordering::Relaxed),
            active_objects: self.active_objects.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            avg_latency_us: if count > 0 { lat_sum / count } else { 0 },
            max_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            lat_sum_us: lat_sum,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_per_sec: f64,
    pub decoded_frames_total: u64,
    pub observations_accepted: u64,
    pub cooldown_rejected: u64,
    pub throttled_frames: u64,
    pub new_objects_total: u64,
    pub events_inbound: u64,
    pub events_outbound: u64,
    pub expired_total: u64,
    pub active_objects: u64,
    pub frames_dropped: u64,
    pub reports_sent: u64,
    pub reports_failed: u64,
    pub reports_dropped: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Latency sum over the buckets below
    pub lat_sum_us: u64,
    /// Frame processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            decoded = %self.decoded_frames_total,
            accepted = %self.observations_accepted,
            cooldown_rejected = %self.cooldown_rejected,
            inbound = %self.events_inbound,
            outbound = %self.events_outbound,
            active = %self.active_objects,
            reports_failed = %self.reports_failed,
            reports_dropped = %self.reports_dropped,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
