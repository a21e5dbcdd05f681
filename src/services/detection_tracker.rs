//! Detection debounce and display lifecycle for decoded codes
//!
//! Three independent timers are layered on the same code:
//! - Cooldown: a code is ignored until it has been unseen for `min_gap_ms`
//! - Display: a tracked object lives `display_window_ms` after it was first seen
//! - Markers: a code is counted at most once per mode until history is cleared

use crate::domain::types::{Code, CountedEvent, TrackingMode};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// Default minimum re-detection gap (500 ms)
pub const DEFAULT_MIN_GAP_MS: u64 = 500;

/// Default display window (3 s)
pub const DEFAULT_DISPLAY_WINDOW_MS: u64 = 3000;

/// History entries are pruned on expiry once unseen for this many gaps
const HISTORY_PRUNE_FACTOR: u64 = 3;

/// A code currently shown as active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedObject {
    /// Mode the code was last observed under
    pub mode: TrackingMode,
    pub first_seen_ms: u64,
    pub last_update_ms: u64,
    pub display_window_ms: u64,
}

impl TrackedObject {
    #[inline]
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.first_seen_ms) > self.display_window_ms
    }

    /// Display time left at `now_ms`, zero once expired
    #[inline]
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.display_window_ms.saturating_sub(now_ms.saturating_sub(self.first_seen_ms))
    }
}

/// Cooldown bookkeeping for a code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DetectionRecord {
    last_detected_ms: u64,
    /// Mode of the latest accepted sighting
    mode: TrackingMode,
}

/// One-shot marker key: a code counted under a mode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EventMarker {
    code: Code,
    mode: TrackingMode,
}

/// Result of an accepted observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationOutcome {
    /// True when the code started a new display lifetime
    pub is_new_object: bool,
    /// Set when the observation was counted for the first time under its mode
    pub event: Option<CountedEvent>,
}

/// Whether more items came in than went out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockBalance {
    /// Items remaining in storage
    Surplus(u64),
    /// More items left than were counted in
    Deficit(u64),
    Even,
}

/// Running totals per mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub inbound: u64,
    pub outbound: u64,
}

impl Counters {
    /// Inbound minus outbound, negative when more left than came in
    pub fn remainder(&self) -> i64 {
        self.inbound as i64 - self.outbound as i64
    }

    pub fn balance(&self) -> StockBalance {
        match self.inbound.cmp(&self.outbound) {
            std::cmp::Ordering::Greater => StockBalance::Surplus(self.inbound - self.outbound),
            std::cmp::Ordering::Less => StockBalance::Deficit(self.outbound - self.inbound),
            std::cmp::Ordering::Equal => StockBalance::Even,
        }
    }

    fn increment(&mut self, mode: TrackingMode) {
        match mode {
            TrackingMode::Inbound => self.inbound += 1,
            TrackingMode::Outbound => self.outbound += 1,
        }
    }
}

/// Snapshot of a tracked object for status listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveObject {
    pub code: Code,
    pub mode: TrackingMode,
    pub remaining_ms: u64,
}

/// Decides whether a decoded code is a duplicate, a refresh or a new event
pub struct DetectionTracker {
    min_gap_ms: u64,
    display_window_ms: u64,
    /// Codes currently displayed
    objects: FxHashMap<Code, TrackedObject>,
    /// Last detection per code, for the cooldown
    history: FxHashMap<Code, DetectionRecord>,
    /// (code, mode) pairs already counted
    markers: FxHashSet<EventMarker>,
    counters: Counters,
}

impl DetectionTracker {
    pub fn new(min_gap_ms: u64, display_window_ms: u64) -> Self {
        Self {
            min_gap_ms,
            display_window_ms,
            objects: FxHashMap::default(),
            history: FxHashMap::default(),
            markers: FxHashSet::default(),
            counters: Counters::default(),
        }
    }

    /// True if `code` is not in its re-detection cooldown at `now_ms`
    pub fn can_accept(&self, code: &Code, now_ms: u64) -> bool {
        match self.history.get(code) {
            None => true,
            Some(record) => now_ms.saturating_sub(record.last_detected_ms) > self.min_gap_ms,
        }
    }

    /// Record an accepted observation of `code` under `mode`
    ///
    /// Callers must check `can_accept` first. Re-observing a displayed code
    /// refreshes it without restarting its display window. Counting is keyed
    /// on (code, mode) only, so a mode switch while the code is displayed
    /// counts once for the new mode.
    pub fn process_observation(
        &mut self,
        code: &Code,
        now_ms: u64,
        mode: TrackingMode,
    ) -> ObservationOutcome {
        debug_assert!(self.can_accept(code, now_ms), "observation inside cooldown");

        self.history
            .insert(code.clone(), DetectionRecord { last_detected_ms: now_ms, mode });

        let is_new_object = match self.objects.get_mut(code) {
            Some(object) => {
                object.last_update_ms = now_ms;
                object.mode = mode;
                false
            }
            None => {
                self.objects.insert(
                    code.clone(),
                    TrackedObject {
                        mode,
                        first_seen_ms: now_ms,
                        last_update_ms: now_ms,
                        display_window_ms: self.display_window_ms,
                    },
                );
                true
            }
        };

        let marker = EventMarker { code: code.clone(), mode };
        let event = if self.markers.insert(marker) {
            self.counters.increment(mode);
            info!(
                code = %code,
                mode = %mode,
                inbound = %self.counters.inbound,
                outbound = %self.counters.outbound,
                "object_counted"
            );
            Some(CountedEvent { code: code.clone(), mode, timestamp_ms: now_ms })
        } else {
            debug!(code = %code, mode = %mode, is_new_object = %is_new_object, "object_refreshed");
            None
        };

        ObservationOutcome { is_new_object, event }
    }

    /// Drop objects whose display window has passed
    ///
    /// History of an expired code is pruned as well once it has been unseen
    /// for `3 * min_gap_ms`; otherwise its cooldown stays in effect.
    /// Returns the number of objects removed.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let expired: Vec<Code> = self
            .objects
            .iter()
            .filter(|(_, object)| object.is_expired(now_ms))
            .map(|(code, _)| code.clone())
            .collect();

        let prune_after_ms = self.min_gap_ms * HISTORY_PRUNE_FACTOR;
        for code in &expired {
            self.objects.remove(code);

            let record = self.history.get(code).copied();
            let prune = record
                .is_some_and(|r| now_ms.saturating_sub(r.last_detected_ms) > prune_after_ms);
            if prune {
                self.history.remove(code);
            }

            debug!(
                code = %code,
                last_mode = ?record.map(|r| r.mode),
                history_pruned = %prune,
                "object_expired"
            );
        }

        expired.len()
    }

    /// Zero both counters, leaving tracking state alone
    pub fn reset_counters(&mut self) {
        self.counters = Counters::default();
    }

    /// Forget history, tracked objects and markers, keeping counters
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.objects.clear();
        self.markers.clear();
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn tracked(&self, code: &Code) -> Option<&TrackedObject> {
        self.objects.get(code)
    }

    /// Number of codes currently displayed
    pub fn active_count(&self) -> usize {
        self.objects.len()
    }

    /// Currently displayed objects, oldest first
    pub fn active_objects(&self, now_ms: u64) -> Vec<ActiveObject> {
        let mut entries: Vec<(&Code, &TrackedObject)> = self.objects.iter().collect();
        entries.sort_by(|a, b| a.1.first_seen_ms.cmp(&b.1.first_seen_ms).then(a.0.cmp(b.0)));
        entries
            .into_iter()
            .map(|(code, object)| ActiveObject {
                code: code.clone(),
                mode: object.mode,
                remaining_ms: object.remaining_ms(now_ms),
            })
            .collect()
    }

    pub fn min_gap_ms(&self) -> u64 {
        self.min_gap_ms
    }

    pub fn display_window_ms(&self) -> u64 {
        self.display_window_ms
    }

    #[cfg(test)]
    fn has_history(&self, code: &Code) -> bool {
        self.history.contains_key(code)
    }

    #[cfg(test)]
    fn last_detection(&self, code: &Code) -> Option<(u64, TrackingMode)> {
        self.history.get(code).map(|r| (r.last_detected_ms, r.mode))
    }

    #[cfg(test)]
    fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

impl Default for DetectionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_GAP_MS, DEFAULT_DISPLAY_WINDOW_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TrackingMode::{Inbound, Outbound};

    fn code(s: &str) -> Code {
        Code::parse(s).unwrap()
    }

    /// Mirror of the station's accept-then-process step
    fn observe(
        tracker: &mut DetectionTracker,
        c: &Code,
        now_ms: u64,
        mode: TrackingMode,
    ) -> Option<ObservationOutcome> {
        tracker.can_accept(c, now_ms).then(|| tracker.process_observation(c, now_ms, mode))
    }

    #[test]
    fn test_unknown_code_is_accepted() {
        let tracker = DetectionTracker::default();
        assert!(tracker.can_accept(&code("X1"), 0));
    }

    #[test]
    fn test_cooldown_blocks_until_gap_exceeded() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");
        tracker.process_observation(&x1, 1_000, Inbound);

        assert!(!tracker.can_accept(&x1, 1_200));
        // Gap must be strictly exceeded
        assert!(!tracker.can_accept(&x1, 1_500));
        assert!(tracker.can_accept(&x1, 1_501));
    }

    #[test]
    fn test_cooldown_is_per_code() {
        let mut tracker = DetectionTracker::default();
        tracker.process_observation(&code("X1"), 1_000, Inbound);
        assert!(tracker.can_accept(&code("X2"), 1_001));
    }

    #[test]
    fn test_debounce_accepts_at_most_one_within_gap() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        let accepted = [0u64, 100, 200, 300, 499]
            .iter()
            .filter(|&&t| observe(&mut tracker, &x1, t, Inbound).is_some())
            .count();

        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_first_observation_creates_object_and_counts() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        let outcome = tracker.process_observation(&x1, 1_000, Inbound);

        assert!(outcome.is_new_object);
        assert_eq!(
            outcome.event,
            Some(CountedEvent { code: x1.clone(), mode: Inbound, timestamp_ms: 1_000 })
        );
        assert_eq!(tracker.counters(), Counters { inbound: 1, outbound: 0 });

        let object = tracker.tracked(&x1).unwrap();
        assert_eq!(object.first_seen_ms, 1_000);
        assert_eq!(object.last_update_ms, 1_000);
        assert_eq!(object.display_window_ms, DEFAULT_DISPLAY_WINDOW_MS);
    }

    #[test]
    fn test_no_double_counting_same_mode() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        let second = tracker.process_observation(&x1, 600, Inbound);

        assert!(!second.is_new_object);
        assert!(second.event.is_none());
        assert_eq!(tracker.counters().inbound, 1);
    }

    #[test]
    fn test_refresh_keeps_first_seen() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.process_observation(&x1, 600, Outbound);

        let object = tracker.tracked(&x1).unwrap();
        assert_eq!(object.first_seen_ms, 0);
        assert_eq!(object.last_update_ms, 600);
        assert_eq!(object.mode, Outbound);
    }

    #[test]
    fn test_history_tracks_latest_sighting_mode() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        assert_eq!(tracker.last_detection(&x1), Some((0, Inbound)));
        tracker.process_observation(&x1, 2_000, Outbound);
        assert_eq!(tracker.last_detection(&x1), Some((2_000, Outbound)));

        // Display expires, the recent sighting keeps its cooldown entry
        assert_eq!(tracker.expire(3_001), 1);
        assert_eq!(tracker.last_detection(&x1), Some((2_000, Outbound)));
    }

    #[test]
    fn test_mode_switch_recounts() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        let switched = tracker.process_observation(&x1, 600, Outbound);

        assert!(!switched.is_new_object);
        assert_eq!(switched.event.map(|e| e.mode), Some(Outbound));
        assert_eq!(tracker.counters(), Counters { inbound: 1, outbound: 1 });
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn test_switching_back_does_not_recount() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.process_observation(&x1, 600, Outbound);
        let back = tracker.process_observation(&x1, 1_200, Inbound);

        assert!(back.event.is_none());
        assert_eq!(tracker.counters(), Counters { inbound: 1, outbound: 1 });
    }

    #[test]
    fn test_marker_survives_expiry() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.expire(10_000);
        assert!(tracker.tracked(&x1).is_none());

        let again = tracker.process_observation(&x1, 10_100, Inbound);

        assert!(again.is_new_object);
        assert!(again.event.is_none());
        assert_eq!(tracker.counters().inbound, 1);
    }

    #[test]
    fn test_display_window_expiry() {
        let x1 = code("X1");
        let t0 = 50_000;

        let mut tracker = DetectionTracker::new(500, 3000);
        tracker.process_observation(&x1, t0, Inbound);
        tracker.expire(t0 + 2_990);
        assert!(tracker.tracked(&x1).is_some());

        let mut tracker = DetectionTracker::new(500, 3000);
        tracker.process_observation(&x1, t0, Inbound);
        assert_eq!(tracker.expire(t0 + 3_010), 1);
        assert!(tracker.tracked(&x1).is_none());
    }

    #[test]
    fn test_expiry_at_exact_window_keeps_object() {
        let mut tracker = DetectionTracker::new(500, 3000);
        let x1 = code("X1");
        tracker.process_observation(&x1, 0, Inbound);

        assert_eq!(tracker.expire(3_000), 0);
        assert!(tracker.tracked(&x1).is_some());
    }

    #[test]
    fn test_refresh_does_not_extend_display() {
        let mut tracker = DetectionTracker::new(500, 3000);
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.process_observation(&x1, 2_800, Inbound);
        tracker.expire(3_001);

        assert!(tracker.tracked(&x1).is_none());
    }

    #[test]
    fn test_history_survives_until_prune_threshold() {
        let mut tracker = DetectionTracker::new(500, 3000);
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.process_observation(&x1, 2_000, Inbound);

        // Object expires, but 3_100 - 2_000 = 1_100 is not above 1_500
        tracker.expire(3_100);
        assert!(tracker.tracked(&x1).is_none());
        assert!(tracker.has_history(&x1));
        assert!(!tracker.can_accept(&x1, 2_400));
    }

    #[test]
    fn test_history_not_pruned_without_expiring_object() {
        let mut tracker = DetectionTracker::new(500, 3000);
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.process_observation(&x1, 2_000, Inbound);
        tracker.expire(3_100);

        // No tracked object left, so later expire calls never revisit the entry
        tracker.expire(20_000);
        assert!(tracker.has_history(&x1));
        assert!(tracker.can_accept(&x1, 20_000));
    }

    #[test]
    fn test_history_pruned_with_expired_object() {
        let mut tracker = DetectionTracker::new(500, 3000);
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.expire(3_100);

        assert!(!tracker.has_history(&x1));
    }

    #[test]
    fn test_reset_counters_keeps_tracking_state() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.process_observation(&code("X2"), 10, Outbound);
        tracker.reset_counters();

        assert_eq!(tracker.counters(), Counters::default());
        assert!(tracker.tracked(&x1).is_some());
        assert!(tracker.has_history(&x1));
        assert_eq!(tracker.marker_count(), 2);
    }

    #[test]
    fn test_clear_history_keeps_counters() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.clear_history();

        assert_eq!(tracker.counters().inbound, 1);
        assert_eq!(tracker.active_count(), 0);
        assert!(!tracker.has_history(&x1));
        assert_eq!(tracker.marker_count(), 0);
    }

    #[test]
    fn test_clear_history_allows_recount() {
        let mut tracker = DetectionTracker::default();
        let x1 = code("X1");

        tracker.process_observation(&x1, 0, Inbound);
        tracker.clear_history();

        assert!(tracker.can_accept(&x1, 1));
        let again = tracker.process_observation(&x1, 1, Inbound);
        assert!(again.is_new_object);
        assert!(again.event.is_some());
        assert_eq!(tracker.counters().inbound, 2);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut tracker = DetectionTracker::new(500, 3000);
        let a = code("A");

        // t=0.0: new object, counted inbound
        let first = observe(&mut tracker, &a, 0, Inbound).unwrap();
        assert!(first.is_new_object);
        assert_eq!(
            first.event,
            Some(CountedEvent { code: a.clone(), mode: Inbound, timestamp_ms: 0 })
        );
        assert_eq!(tracker.counters().inbound, 1);
        tracker.expire(0);

        // t=0.2: inside cooldown
        assert!(observe(&mut tracker, &a, 200, Inbound).is_none());
        tracker.expire(200);
        assert_eq!(tracker.tracked(&a).unwrap().last_update_ms, 0);

        // t=0.6: refresh only
        let refresh = observe(&mut tracker, &a, 600, Inbound).unwrap();
        assert!(!refresh.is_new_object);
        assert!(refresh.event.is_none());
        assert_eq!(tracker.tracked(&a).unwrap().last_update_ms, 600);
        assert_eq!(tracker.counters().inbound, 1);
        tracker.expire(600);

        // t=3.1: object expires and 3.1 - 0.6 > 1.5 prunes history
        tracker.expire(3_100);
        assert!(tracker.tracked(&a).is_none());
        assert!(!tracker.has_history(&a));
        assert_eq!(tracker.counters(), Counters { inbound: 1, outbound: 0 });
    }

    #[test]
    fn test_active_objects_ordered_with_remaining() {
        let mut tracker = DetectionTracker::new(500, 3000);
        tracker.process_observation(&code("B"), 1_000, Outbound);
        tracker.process_observation(&code("A"), 0, Inbound);

        let active = tracker.active_objects(2_500);

        assert_eq!(active.len(), 2);
        assert_eq!(active[0].code.as_str(), "A");
        assert_eq!(active[0].remaining_ms, 500);
        assert_eq!(active[1].code.as_str(), "B");
        assert_eq!(active[1].mode, Outbound);
        assert_eq!(active[1].remaining_ms, 1_500);
    }

    #[test]
    fn test_counters_balance() {
        assert_eq!(Counters { inbound: 5, outbound: 2 }.balance(), StockBalance::Surplus(3));
        assert_eq!(Counters { inbound: 1, outbound: 4 }.balance(), StockBalance::Deficit(3));
        assert_eq!(Counters { inbound: 2, outbound: 2 }.balance(), StockBalance::Even);
        assert_eq!(Counters { inbound: 1, outbound: 4 }.remainder(), -3);
    }
}
