// THEORY:
// This file is the main entry point for the `dwell_vision` library crate. The crate is
// the analytic core of an occupancy monitor: it consumes per-frame tracked observations
// (identity plus geometry) and turns them into dwell times, occupancy counts, a spatial
// heatmap, movement trails and dashboard data.
//
// The primary interface is `OccupancyMonitor` in `pipeline`, which owns one instance of
// each accumulator and drives them from a single `update` call per tick. The
// `parallel_pipeline` module hosts several monitors, one per camera stream, on tokio.
// The accumulators in `core_modules` stay public so they can be used on their own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::geometry::{BoundingBox, Geometry, Observation, Point};
pub use core_modules::occupancy::Occupancy;
pub use core_modules::palette::{HuePalette, Palette};
pub use error::{ConfigError, ObservationError, StreamError};
pub use parallel_pipeline::{MultiStreamMonitor, StreamTick};
pub use pipeline::{MonitorConfig, OccupancyMonitor, TickReport};
