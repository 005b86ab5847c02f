// THEORY:
// The `dwell` module gives the engine its sense of time. It follows every identity the
// external tracker reports and keeps a `DwellRecord` for it: how long the entity has
// been in view and how long it has stayed put.
//
// Key architectural principles:
// 1.  **Append-Only History**: A record is born on the first observation of an
//     identity and is never deleted. `history` only grows; the `current` view is
//     rebuilt on every tick as the identities present in that tick.
// 2.  **Reference Box Stillness**: An entity is "not moving" while its box keeps
//     covering more than `BOX_OVERLAP_THRESHOLD` of a stored reference box. Any tick
//     below that ratio re-anchors the reference to the new box and resets the
//     still clock.
// 3.  **Hysteresis**: A still interval only opens once the still clock passes
//     `still_time_threshold`. While it stays open its last history entry is extended
//     in place; when the entity moves the entry is frozen at its last value.
// 4.  **Explicit Time**: The driver samples one timestamp per tick and passes it in.
//     A late tick simply widens the elapsed time of the next update.

use crate::core_modules::geometry::{BoundingBox, Observation};
use crate::error::ObservationError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Minimum share of the reference box the current box must cover to count as still.
pub const BOX_OVERLAP_THRESHOLD: f64 = 0.8;

/// What a single tick did to an entity's stillness state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StillTransition {
    /// First observation of the identity.
    Created,
    /// Overlap held, still clock running but below the threshold.
    Settling,
    /// Still clock crossed the threshold; a new interval was recorded.
    Opened,
    /// Interval already open; its last value was extended.
    Extended,
    /// Entity moved while an interval was open; the interval is frozen.
    Closed,
    /// Entity moved with no interval open.
    Moving,
    /// Reference box had no positive area; treated as moving.
    Degenerate { area: f64 },
}

/// Time bookkeeping for one tracked identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellRecord {
    pub id: u64,
    /// Timestamp (seconds) of the last tick this identity was seen.
    pub prev_timestamp: f64,
    /// Total time in view, in seconds.
    pub total_time: f64,
    /// Time the box has overlapped the reference box, in seconds.
    pub still_time: f64,
    /// Durations of every still interval, oldest first. The last entry may still be open.
    pub still_interval_history: Vec<f64>,
    pub reference_box: BoundingBox,
    pub reference_area: f64,
    /// Box from the latest observation.
    pub last_box: BoundingBox,
    pub is_still: bool,
}

impl DwellRecord {
    fn new(id: u64, bbox: BoundingBox, now: f64) -> Self {
        Self {
            id,
            prev_timestamp: now,
            total_time: 0.0,
            still_time: 0.0,
            still_interval_history: Vec::new(),
            reference_box: bbox,
            reference_area: bbox.area(),
            last_box: bbox,
            is_still: false,
        }
    }

    fn add_time(&mut self, now: f64, bbox: BoundingBox, still_time_threshold: f64) -> StillTransition {
        let mut elapsed = now - self.prev_timestamp;
        if elapsed < 0.0 {
            warn!(id = self.id, elapsed, "timestamp went backwards, counting no time");
            elapsed = 0.0;
        }
        self.prev_timestamp = now;
        self.total_time += elapsed;
        self.last_box = bbox;

        if self.reference_area <= 0.0 {
            let area = self.reference_area;
            self.rebase(bbox);
            return StillTransition::Degenerate { area };
        }

        let overlap_ratio = self.reference_box.intersection_area(&bbox) / self.reference_area;
        if overlap_ratio > BOX_OVERLAP_THRESHOLD {
            self.still_time += elapsed;
            if self.still_time <= still_time_threshold {
                return StillTransition::Settling;
            }
            if self.is_still {
                if let Some(open) = self.still_interval_history.last_mut() {
                    *open = self.still_time;
                }
                StillTransition::Extended
            } else {
                self.still_interval_history.push(self.still_time);
                self.is_still = true;
                StillTransition::Opened
            }
        } else {
            let was_still = self.is_still;
            self.rebase(bbox);
            if was_still {
                StillTransition::Closed
            } else {
                StillTransition::Moving
            }
        }
    }

    fn rebase(&mut self, bbox: BoundingBox) {
        self.reference_box = bbox;
        self.reference_area = bbox.area();
        self.still_time = 0.0;
        self.is_still = false;
    }
}

/// Flattened timing data over every identity ever seen, for distribution plots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeHistory {
    pub total_times: Vec<f64>,
    pub still_intervals: Vec<f64>,
}

/// Tracks dwell and still time for every identity the tracker reports.
pub struct DwellTimeAccumulator {
    still_time_threshold: f64,
    /// Every identity ever seen with its latest record.
    history: BTreeMap<u64, DwellRecord>,
    /// Identities present in the latest tick.
    current: BTreeSet<u64>,
}

impl DwellTimeAccumulator {
    pub fn new(still_time_threshold: f64) -> Self {
        Self {
            still_time_threshold,
            history: BTreeMap::new(),
            current: BTreeSet::new(),
        }
    }

    pub fn still_time_threshold(&self) -> f64 {
        self.still_time_threshold
    }

    /// Applies one tick of observations taken at `now` (seconds). A tick with a
    /// non-finite `now` is reported and otherwise ignored.
    ///
    /// Returns the observations that were skipped or only partially applied.
    pub fn update(&mut self, observations: &[Observation], now: f64) -> Vec<ObservationError> {
        if !now.is_finite() {
            warn!(now, "non-finite tick timestamp, dwell state left unchanged");
            return observations
                .iter()
                .map(|obs| ObservationError::InvalidTimestamp {
                    id: obs.id,
                    timestamp: now,
                })
                .collect();
        }

        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();

        for obs in observations {
            let bbox = match obs.bounding_box() {
                Ok(bbox) => bbox,
                Err(err) => {
                    issues.push(err);
                    continue;
                }
            };
            seen.insert(obs.id);

            let transition = match self.history.get_mut(&obs.id) {
                Some(record) => record.add_time(now, bbox, self.still_time_threshold),
                None => {
                    self.history.insert(obs.id, DwellRecord::new(obs.id, bbox, now));
                    StillTransition::Created
                }
            };

            match transition {
                StillTransition::Opened => debug!(id = obs.id, "still interval opened"),
                StillTransition::Closed => debug!(id = obs.id, "still interval closed"),
                StillTransition::Degenerate { area } => {
                    issues.push(ObservationError::DegenerateGeometry { id: obs.id, area });
                }
                _ => {}
            }
        }

        self.current = seen;
        issues
    }

    pub fn record(&self, id: u64) -> Option<&DwellRecord> {
        self.history.get(&id)
    }

    /// Records of the identities present in the latest tick, ordered by identity.
    pub fn current(&self) -> impl Iterator<Item = &DwellRecord> {
        self.current.iter().filter_map(|id| self.history.get(id))
    }

    /// Records of every identity ever seen, ordered by identity.
    pub fn history(&self) -> impl Iterator<Item = &DwellRecord> {
        self.history.values()
    }

    pub fn current_len(&self) -> usize {
        self.current.len()
    }

    pub fn max_identity(&self) -> Option<u64> {
        self.history.keys().next_back().copied()
    }

    pub fn time_history(&self) -> TimeHistory {
        let mut out = TimeHistory::default();
        for record in self.history.values() {
            out.total_times.push(record.total_time);
            out.still_intervals
                .extend(record.still_interval_history.iter().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn still_box(id: u64) -> Observation {
        Observation::with_box(id, 0.0, 0.0, 10.0, 10.0)
    }

    #[test]
    fn still_interval_opens_after_threshold() {
        let mut acc = DwellTimeAccumulator::new(10.0);
        for t in 0..=10 {
            acc.update(&[still_box(5)], t as f64);
        }
        let record = acc.record(5).unwrap();
        assert!(record.still_interval_history.is_empty());
        assert!(!record.is_still);

        acc.update(&[still_box(5)], 11.0);
        let record = acc.record(5).unwrap();
        assert_eq!(record.still_interval_history, vec![11.0]);
        assert_relative_eq!(record.total_time, 11.0);
        assert!(record.is_still);
    }

    #[test]
    fn open_interval_is_extended_in_place() {
        let mut acc = DwellTimeAccumulator::new(10.0);
        for t in 0..=30 {
            acc.update(&[still_box(1)], t as f64);
        }
        let record = acc.record(1).unwrap();
        assert_eq!(record.still_interval_history, vec![30.0]);
        assert_relative_eq!(record.total_time, 30.0);
        assert!(record.still_time <= record.total_time);
    }

    #[test]
    fn moving_freezes_interval_and_resets_still_clock() {
        let mut acc = DwellTimeAccumulator::new(2.0);
        for t in 0..=5 {
            acc.update(&[still_box(2)], t as f64);
        }
        assert_eq!(acc.record(2).unwrap().still_interval_history, vec![5.0]);

        // Shift well past the overlap threshold.
        acc.update(&[Observation::with_box(2, 50.0, 50.0, 60.0, 60.0)], 6.0);
        let record = acc.record(2).unwrap();
        assert_eq!(record.still_interval_history, vec![5.0]);
        assert_eq!(record.still_time, 0.0);
        assert!(!record.is_still);
        assert_relative_eq!(record.total_time, 6.0);

        // Staying at the new spot starts a second, separate interval.
        for t in 7..=9 {
            acc.update(&[Observation::with_box(2, 50.0, 50.0, 60.0, 60.0)], t as f64);
        }
        assert_eq!(acc.record(2).unwrap().still_interval_history, vec![5.0, 3.0]);
    }

    #[test]
    fn small_jitter_keeps_entity_still() {
        let mut acc = DwellTimeAccumulator::new(1.0);
        acc.update(&[still_box(9)], 0.0);
        // 9x10 overlap of a 10x10 reference: ratio 0.9.
        acc.update(&[Observation::with_box(9, 1.0, 0.0, 11.0, 10.0)], 1.0);
        acc.update(&[Observation::with_box(9, 1.0, 0.0, 11.0, 10.0)], 2.0);
        let record = acc.record(9).unwrap();
        assert_relative_eq!(record.still_time, 2.0);
        assert_eq!(record.reference_box, BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn exactly_threshold_overlap_counts_as_motion() {
        let mut acc = DwellTimeAccumulator::new(1.0);
        acc.update(&[still_box(4)], 0.0);
        // 8x10 overlap: ratio exactly 0.8.
        acc.update(&[Observation::with_box(4, 2.0, 0.0, 12.0, 10.0)], 1.0);
        let record = acc.record(4).unwrap();
        assert_eq!(record.still_time, 0.0);
        assert_eq!(record.reference_box, BoundingBox::from_corners(2.0, 0.0, 12.0, 10.0));
    }

    #[test]
    fn degenerate_reference_is_treated_as_moving() {
        let mut acc = DwellTimeAccumulator::new(1.0);
        let flat = Observation::with_box(3, 0.0, 0.0, 10.0, 0.0);
        acc.update(&[flat.clone()], 0.0);
        let issues = acc.update(&[flat], 1.0);
        assert!(matches!(
            issues.as_slice(),
            [ObservationError::DegenerateGeometry { id: 3, .. }]
        ));
        let record = acc.record(3).unwrap();
        assert_eq!(record.still_time, 0.0);
        assert_relative_eq!(record.total_time, 1.0);

        // A proper box re-anchors the reference and stillness resumes next tick.
        acc.update(&[still_box(3)], 2.0);
        acc.update(&[still_box(3)], 3.0);
        assert_relative_eq!(acc.record(3).unwrap().still_time, 1.0);
    }

    #[test]
    fn backwards_timestamp_adds_no_time() {
        let mut acc = DwellTimeAccumulator::new(10.0);
        acc.update(&[still_box(1)], 5.0);
        acc.update(&[still_box(1)], 3.0);
        let record = acc.record(1).unwrap();
        assert_eq!(record.total_time, 0.0);
        acc.update(&[still_box(1)], 4.0);
        assert_relative_eq!(acc.record(1).unwrap().total_time, 1.0);
    }

    #[test]
    fn non_finite_timestamp_is_ignored() {
        let mut acc = DwellTimeAccumulator::new(1.0);
        acc.update(&[still_box(1)], 0.0);
        let issues = acc.update(&[still_box(1)], f64::NAN);
        assert!(matches!(
            issues.as_slice(),
            [ObservationError::InvalidTimestamp { id: 1, .. }]
        ));
        assert_eq!(acc.update(&[still_box(1)], f64::INFINITY).len(), 1);
        assert!(acc.update(&[still_box(1)], 2.0).is_empty());
        acc.update(&[still_box(1)], 3.0);

        let record = acc.record(1).unwrap();
        assert_relative_eq!(record.total_time, 3.0);
        assert_relative_eq!(record.still_time, 3.0);
        assert_eq!(record.prev_timestamp, 3.0);
        assert_eq!(record.still_interval_history, vec![3.0]);
    }

    #[test]
    fn non_finite_first_sighting_creates_no_record() {
        let mut acc = DwellTimeAccumulator::new(1.0);
        acc.update(&[still_box(2)], f64::NAN);
        assert!(acc.record(2).is_none());
        assert_eq!(acc.current_len(), 0);
    }

    #[test]
    fn current_is_rebuilt_but_history_is_kept() {
        let mut acc = DwellTimeAccumulator::new(10.0);
        acc.update(&[still_box(1), still_box(3), still_box(7)], 0.0);
        acc.update(&[still_box(3), still_box(7)], 1.0);

        let current: Vec<u64> = acc.current().map(|r| r.id).collect();
        let history: Vec<u64> = acc.history().map(|r| r.id).collect();
        assert_eq!(current, vec![3, 7]);
        assert_eq!(history, vec![1, 3, 7]);
        assert_eq!(acc.max_identity(), Some(7));
    }

    #[test]
    fn unsupported_geometry_is_skipped_without_touching_others() {
        let mut acc = DwellTimeAccumulator::new(10.0);
        let issues = acc.update(&[Observation::with_points(2, vec![]), still_box(1)], 0.0);
        assert_eq!(issues.len(), 1);
        assert!(acc.record(2).is_none());
        assert!(acc.record(1).is_some());
        assert_eq!(acc.current_len(), 1);
    }

    #[test]
    fn time_history_flattens_all_identities() {
        let mut acc = DwellTimeAccumulator::new(1.0);
        for t in 0..=3 {
            acc.update(&[still_box(1), still_box(2)], t as f64);
        }
        acc.update(&[Observation::with_box(2, 40.0, 40.0, 50.0, 50.0)], 4.0);
        for t in 5..=6 {
            acc.update(&[Observation::with_box(2, 40.0, 40.0, 50.0, 50.0)], t as f64);
        }

        let th = acc.time_history();
        assert_eq!(th.total_times, vec![3.0, 6.0]);
        assert_eq!(th.still_intervals, vec![3.0, 3.0, 2.0]);
    }
}
