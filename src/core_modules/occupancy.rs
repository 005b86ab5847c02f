// THEORY:
// Occupancy is derived, not tracked. The current head count is the size of the dwell
// accumulator's live view, and the visitor count is the largest identity ever
// handed out by the tracker. The latter is only a true count if the tracker assigns
// identities monotonically and never reuses them.

use crate::core_modules::dwell::DwellTimeAccumulator;
use serde::Serialize;

/// Head count for the latest tick plus the cumulative visitor figure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub current_occupancy: usize,
    pub total_visitors: u64,
}

/// Reads occupancy figures out of a `DwellTimeAccumulator`.
pub struct OccupancyAggregator;

impl OccupancyAggregator {
    pub fn occupancy(dwell: &DwellTimeAccumulator) -> Occupancy {
        Occupancy {
            current_occupancy: dwell.current_len(),
            total_visitors: dwell.max_identity().unwrap_or(0),
        }
    }
}
