// THEORY:
// The `Dashboard` is the data side of an occupancy dashboard: the two headline numbers
// (current occupancy, total visitors) and two duration histograms (still intervals
// and total dwell times). It draws nothing; a UI consumes the serializable snapshot.
//
// Headline numbers are cheap and refresh on every call. Histograms scan the whole
// dwell history, so they are rebuilt at most once per `update_interval` seconds.

use crate::core_modules::dwell::DwellTimeAccumulator;
use crate::core_modules::occupancy::{Occupancy, OccupancyAggregator};
use serde::Serialize;

pub const HISTOGRAM_BINS: usize = 12;
/// Histograms always span at least this many seconds.
pub const MIN_HISTOGRAM_SPAN: f64 = 60.0;

/// Equal-width histogram over `[range.0, range.1]`, last bin closed on the right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub range: (f64, f64),
    pub counts: Vec<u32>,
}

impl Histogram {
    pub fn new(data: &[f64], bins: usize, range: (f64, f64)) -> Self {
        let bins = bins.max(1);
        let mut counts = vec![0u32; bins];
        let (lo, hi) = range;
        let width = hi - lo;
        if width > 0.0 {
            for &v in data {
                if !(lo..=hi).contains(&v) {
                    continue;
                }
                let idx = ((v - lo) * bins as f64 / width) as usize;
                counts[idx.min(bins - 1)] += 1;
            }
        }
        Self { range, counts }
    }

    /// Durations binned over `[0, max(60, max(data))]`.
    pub fn of_durations(data: &[f64]) -> Self {
        let top = data.iter().copied().fold(MIN_HISTOGRAM_SPAN, f64::max);
        Self::new(data, HISTOGRAM_BINS, (0.0, top))
    }

    pub fn bin_edges(&self) -> Vec<f64> {
        let n = self.counts.len();
        let (lo, hi) = self.range;
        (0..=n).map(|i| lo + (hi - lo) * i as f64 / n as f64).collect()
    }

    /// Four evenly spaced y-axis ticks starting at zero that cover the tallest bin.
    pub fn y_ticks(&self) -> [u32; 4] {
        let max_bin = self.counts.iter().copied().max().unwrap_or(0);
        let step = max_bin / 4 + 1;
        [0, step, 2 * step, 3 * step]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub occupancy: Occupancy,
    pub still_time: Histogram,
    pub total_time: Histogram,
    /// Timestamp of the last histogram rebuild.
    pub refreshed_at: Option<f64>,
}

pub struct Dashboard {
    update_interval: f64,
    snapshot: DashboardSnapshot,
}

impl Dashboard {
    pub fn new(update_interval: f64) -> Self {
        Self {
            update_interval,
            snapshot: DashboardSnapshot {
                occupancy: Occupancy::default(),
                still_time: Histogram::of_durations(&[]),
                total_time: Histogram::of_durations(&[]),
                refreshed_at: None,
            },
        }
    }

    /// Refreshes the snapshot from `dwell` at time `now`.
    pub fn update(&mut self, dwell: &DwellTimeAccumulator, now: f64) -> &DashboardSnapshot {
        self.snapshot.occupancy = OccupancyAggregator::occupancy(dwell);

        let due = match self.snapshot.refreshed_at {
            None => true,
            Some(last) => now - last >= self.update_interval,
        };
        if due {
            let history = dwell.time_history();
            self.snapshot.still_time = Histogram::of_durations(&history.still_intervals);
            self.snapshot.total_time = Histogram::of_durations(&history.total_times);
            self.snapshot.refreshed_at = Some(now);
        }
        &self.snapshot
    }

    pub fn snapshot(&self) -> &DashboardSnapshot {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Observation;

    #[test]
    fn empty_histogram_spans_a_minute() {
        let h = Histogram::of_durations(&[]);
        assert_eq!(h.range, (0.0, 60.0));
        assert_eq!(h.counts, vec![0; 12]);
        assert_eq!(h.y_ticks(), [0, 1, 2, 3]);
    }

    #[test]
    fn binning_matches_closed_last_bin() {
        let h = Histogram::of_durations(&[0.0, 4.9, 5.0, 59.0, 60.0]);
        assert_eq!(h.counts[0], 2);
        assert_eq!(h.counts[1], 1);
        assert_eq!(h.counts[11], 2);
        assert_eq!(h.counts.iter().sum::<u32>(), 5);
    }

    #[test]
    fn range_grows_with_longest_duration() {
        let h = Histogram::of_durations(&[10.0, 120.0]);
        assert_eq!(h.range, (0.0, 120.0));
        assert_eq!(h.counts[1], 1);
        assert_eq!(h.counts[11], 1);
        let edges = h.bin_edges();
        assert_eq!(edges.len(), 13);
        assert_eq!(edges[1], 10.0);
    }

    #[test]
    fn y_ticks_cover_tallest_bin() {
        let h = Histogram::new(&[1.0; 9], 12, (0.0, 60.0));
        assert_eq!(h.y_ticks(), [0, 3, 6, 9]);
    }

    #[test]
    fn histograms_refresh_on_interval_occupancy_every_call() {
        let mut dwell = DwellTimeAccumulator::new(10.0);
        let mut dash = Dashboard::new(5.0);
        let obs = [Observation::with_box(3, 0.0, 0.0, 10.0, 10.0)];

        dwell.update(&obs, 0.0);
        dash.update(&dwell, 0.0);
        assert_eq!(dash.snapshot().refreshed_at, Some(0.0));

        dwell.update(&obs, 2.0);
        let snap = dash.update(&dwell, 2.0);
        assert_eq!(snap.occupancy.current_occupancy, 1);
        assert_eq!(snap.occupancy.total_visitors, 3);
        assert_eq!(snap.refreshed_at, Some(0.0));

        dwell.update(&[], 6.0);
        let snap = dash.update(&dwell, 6.0);
        assert_eq!(snap.occupancy.current_occupancy, 0);
        assert_eq!(snap.refreshed_at, Some(6.0));
        assert_eq!(snap.total_time.counts.iter().sum::<u32>(), 1);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let dash = Dashboard::new(1.0);
        let json = serde_json::to_value(dash.snapshot()).unwrap();
        assert_eq!(json["occupancy"]["total_visitors"], 0);
        assert_eq!(json["still_time"]["counts"].as_array().unwrap().len(), 12);
    }
}
