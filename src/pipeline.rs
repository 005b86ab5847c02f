// THEORY:
// The `pipeline` module is the top-level API for a single camera stream. It wires the
// four accumulators together behind one `OccupancyMonitor`, so a driver only has to
// hand over each tick's observations with a timestamp and can then query or render.
//
// Key architectural principles:
// 1.  **One Tick, One Timestamp**: `update` receives the tick timestamp from the driver
//     and threads it through every component, so all of them agree on "now".
// 2.  **Validate Once**: Observations with unusable geometry are filtered out before
//     any component sees them. One bad observation never stops the rest of the tick.
// 3.  **Reports, Not Panics**: Everything skipped or only partially applied during a
//     tick is returned in a `TickReport` and logged; nothing is fatal.
// 4.  **Read-Only Queries**: Occupancy, time history and every render are pure reads
//     of the accumulated state.

use crate::core_modules::dashboard::{Dashboard, DashboardSnapshot};
use crate::core_modules::dwell::{DwellTimeAccumulator, TimeHistory};
use crate::core_modules::geometry::Observation;
use crate::core_modules::heat_grid::SpatialHeatAccumulator;
use crate::core_modules::occupancy::{Occupancy, OccupancyAggregator};
use crate::core_modules::palette::Palette;
use crate::core_modules::time_label;
use crate::core_modules::trail::TrailHistory;
use crate::error::{ConfigError, ObservationError};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::dwell::{BOX_OVERLAP_THRESHOLD, DwellRecord};
pub use crate::core_modules::geometry::{BoundingBox, Geometry, Point};

/// Longest trail a monitor will keep per identity.
pub const MAX_TRAIL_HISTORY: usize = 10_000;

/// Heat map settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatConfig {
    /// Kernel radius in pixels.
    pub radius: u32,
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self { radius: 10 }
    }
}

/// Fading trail settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailConfig {
    /// Points kept per identity.
    pub history_size: usize,
    /// Marker radius of the newest point, in pixels.
    pub radius: u32,
    /// Marker stroke width, in pixels.
    pub thickness: u32,
    /// Radius multiplier per step back in history.
    pub decay: f32,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            history_size: 30,
            radius: 10,
            thickness: 2,
            decay: 0.95,
        }
    }
}

/// Configuration for the OccupancyMonitor. Fixed for the lifetime of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Seconds an entity has to stay put before a still interval is recorded.
    pub still_time_threshold: f64,
    /// Minimum seconds between dashboard histogram rebuilds.
    pub dashboard_interval: f64,
    pub heat: HeatConfig,
    pub trail: TrailConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            frame_width: 1280,
            frame_height: 720,
            still_time_threshold: 10.0,
            dashboard_interval: 1.0,
            heat: HeatConfig::default(),
            trail: TrailConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn with_frame_size(width: u32, height: u32) -> Self {
        Self {
            frame_width: width,
            frame_height: height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::EmptyFrame {
                width: self.frame_width,
                height: self.frame_height,
            });
        }
        for (field, value) in [
            ("still_time_threshold", self.still_time_threshold),
            ("dashboard_interval", self.dashboard_interval),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDuration { field, value });
            }
        }
        if self.heat.radius == 0 {
            return Err(ConfigError::NonPositive { field: "heat.radius" });
        }
        if self.trail.history_size == 0 {
            return Err(ConfigError::NonPositive { field: "trail.history_size" });
        }
        if self.trail.history_size > MAX_TRAIL_HISTORY {
            return Err(ConfigError::TooLarge {
                field: "trail.history_size",
                value: self.trail.history_size,
                max: MAX_TRAIL_HISTORY,
            });
        }
        if self.trail.radius == 0 {
            return Err(ConfigError::NonPositive { field: "trail.radius" });
        }
        if self.trail.thickness == 0 {
            return Err(ConfigError::NonPositive { field: "trail.thickness" });
        }
        if !(self.trail.decay > 0.0 && self.trail.decay <= 1.0) {
            return Err(ConfigError::InvalidDecay(self.trail.decay));
        }
        Ok(())
    }
}

/// What happened to one tick's observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub timestamp: f64,
    /// Observations applied by the dwell and trail accumulators.
    pub accepted: usize,
    /// Everything skipped or only partially applied, in the order it was met.
    pub issues: Vec<ObservationError>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// The main, top-level struct for one monitored stream.
pub struct OccupancyMonitor {
    config: MonitorConfig,
    dwell: DwellTimeAccumulator,
    heat: SpatialHeatAccumulator,
    trails: TrailHistory,
    dashboard: Dashboard,
    tick_count: u64,
}

impl OccupancyMonitor {
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            width = config.frame_width,
            height = config.frame_height,
            still_time_threshold = config.still_time_threshold,
            "occupancy monitor ready"
        );
        Ok(Self {
            dwell: DwellTimeAccumulator::new(config.still_time_threshold),
            heat: SpatialHeatAccumulator::new(config.frame_width, config.frame_height, config.heat.radius),
            trails: TrailHistory::new(
                config.trail.history_size,
                config.trail.radius,
                config.trail.thickness,
                config.trail.decay,
            ),
            dashboard: Dashboard::new(config.dashboard_interval),
            tick_count: 0,
            config,
        })
    }

    /// Applies one frame's observations, taken at `now` seconds.
    pub fn update(&mut self, observations: &[Observation], now: f64) -> TickReport {
        let mut issues = Vec::new();
        let mut valid = Vec::with_capacity(observations.len());
        for obs in observations {
            match obs.validate() {
                Ok(()) => valid.push(obs.clone()),
                Err(err) => {
                    warn!(%err, "observation skipped");
                    issues.push(err);
                }
            }
        }

        // Stage 1: dwell and stillness
        issues.extend(self.dwell.update(&valid, now));
        // Stage 2: spatial density
        issues.extend(self.heat.update(&valid));
        // Stage 3: fading trails
        issues.extend(self.trails.update(&valid));

        self.tick_count += 1;
        TickReport {
            timestamp: now,
            accepted: valid.len(),
            issues,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn occupancy(&self) -> Occupancy {
        OccupancyAggregator::occupancy(&self.dwell)
    }

    pub fn time_history(&self) -> TimeHistory {
        self.dwell.time_history()
    }

    pub fn dwell(&self) -> &DwellTimeAccumulator {
        &self.dwell
    }

    pub fn heat(&self) -> &SpatialHeatAccumulator {
        &self.heat
    }

    pub fn trails(&self) -> &TrailHistory {
        &self.trails
    }

    /// Clears the heat grid. Dwell history and trails are kept.
    pub fn reset_heatmap(&mut self) {
        self.heat.reset();
    }

    /// Writes a dwell clock above every entity present in the latest tick.
    pub fn draw_time(&self, frame: &mut RgbImage, text_size: f32, text_thickness: u32, palette: &dyn Palette) {
        time_label::annotate(frame, self.dwell.current(), text_size, text_thickness, palette);
    }

    pub fn heatmap_render(&self, frame: &RgbImage, output_size: (u32, u32)) -> RgbImage {
        self.heat.render(frame, output_size)
    }

    pub fn trail_render(&self, frame: &RgbImage, palette: &dyn Palette) -> RgbImage {
        self.trails.render(frame, palette)
    }

    /// Dashboard figures as of `now`. Histograms are rebuilt at most once per
    /// `dashboard_interval`.
    pub fn dashboard(&mut self, now: f64) -> &DashboardSnapshot {
        self.dashboard.update(&self.dwell, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::palette::HuePalette;
    use image::Rgb;

    fn monitor() -> OccupancyMonitor {
        OccupancyMonitor::new(MonitorConfig::with_frame_size(100, 100)).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let mut cfg = MonitorConfig::with_frame_size(0, 10);
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyFrame { .. })));

        cfg = MonitorConfig::default();
        cfg.still_time_threshold = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDuration { .. })));

        cfg = MonitorConfig::default();
        cfg.trail.decay = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidDecay(1.5)));

        cfg = MonitorConfig::default();
        cfg.heat.radius = 0;
        assert!(OccupancyMonitor::new(cfg).is_err());

        cfg = MonitorConfig::default();
        cfg.trail.history_size = usize::MAX;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TooLarge { field: "trail.history_size", .. })
        ));
        cfg.trail.history_size = MAX_TRAIL_HISTORY;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_fields_default_when_missing() {
        let cfg: MonitorConfig =
            serde_json::from_str(r#"{"frame_width": 640, "frame_height": 480, "trail": {"history_size": 5}}"#)
                .unwrap();
        assert_eq!(cfg.frame_width, 640);
        assert_eq!(cfg.still_time_threshold, 10.0);
        assert_eq!(cfg.trail.history_size, 5);
        assert_eq!(cfg.trail.decay, 0.95);
        assert_eq!(cfg.heat.radius, 10);
    }

    #[test]
    fn bad_observation_does_not_stop_the_tick() {
        let mut m = monitor();
        let report = m.update(
            &[
                Observation::with_points(1, vec![]),
                Observation::with_box(2, 10.0, 10.0, 20.0, 20.0),
                Observation::with_box(3, 200.0, 200.0, 220.0, 220.0),
            ],
            0.0,
        );
        assert_eq!(report.accepted, 2);
        assert_eq!(report.issues.len(), 2);
        assert!(matches!(report.issues[0], ObservationError::UnsupportedGeometry { id: 1, .. }));
        assert!(matches!(report.issues[1], ObservationError::OutOfBounds { id: 3, .. }));

        // Out-of-bounds only skips heat: dwell and trail still know id 3.
        assert!(m.dwell().record(3).is_some());
        assert!(m.trails().trail(3).is_some());
        assert!(m.dwell().record(1).is_none());
        assert_eq!(m.occupancy(), Occupancy { current_occupancy: 2, total_visitors: 3 });
    }

    #[test]
    fn non_finite_timestamp_is_reported_and_does_not_poison_dwell() {
        let mut m = monitor();
        let obs = [Observation::with_box(1, 40.0, 40.0, 60.0, 60.0)];
        m.update(&obs, 0.0);
        let report = m.update(&obs, f64::NAN);
        assert!(matches!(
            report.issues.as_slice(),
            [ObservationError::InvalidTimestamp { id: 1, .. }]
        ));
        assert_eq!(m.trails().trail(1).unwrap().len(), 2);

        assert!(m.update(&obs, 2.0).is_clean());
        m.update(&obs, 3.0);
        let record = m.dwell().record(1).unwrap();
        assert_eq!(record.total_time, 3.0);
        assert!(record.still_time <= record.total_time);
    }

    #[test]
    fn queries_reflect_latest_tick() {
        let mut m = monitor();
        m.update(
            &[
                Observation::with_box(1, 0.0, 0.0, 10.0, 10.0),
                Observation::with_box(3, 20.0, 20.0, 30.0, 30.0),
                Observation::with_box(7, 40.0, 40.0, 50.0, 50.0),
            ],
            0.0,
        );
        let report = m.update(
            &[
                Observation::with_box(3, 20.0, 20.0, 30.0, 30.0),
                Observation::with_box(7, 40.0, 40.0, 50.0, 50.0),
            ],
            1.0,
        );
        assert!(report.is_clean());
        assert_eq!(m.occupancy(), Occupancy { current_occupancy: 2, total_visitors: 7 });
        assert_eq!(m.time_history().total_times, vec![0.0, 1.0, 1.0]);
        assert!(m.trails().trail(1).is_none());
        assert_eq!(m.tick_count(), 2);
    }

    #[test]
    fn renders_keep_frame_size_and_draw_time_marks_frame() {
        let mut m = monitor();
        for t in 0..3 {
            m.update(&[Observation::with_box(1, 40.0, 40.0, 60.0, 60.0)], t as f64);
        }
        let frame = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let palette = HuePalette::default();

        assert_eq!(m.heatmap_render(&frame, (100, 100)).dimensions(), (100, 100));
        assert_eq!(m.heatmap_render(&frame, (50, 40)).dimensions(), (50, 40));
        assert_ne!(m.trail_render(&frame, &palette), frame);

        let mut annotated = frame.clone();
        m.draw_time(&mut annotated, 0.5, 1, &palette);
        assert_ne!(annotated, frame);
    }

    #[test]
    fn reset_heatmap_keeps_dwell() {
        let mut m = monitor();
        m.update(&[Observation::with_box(1, 40.0, 40.0, 60.0, 60.0)], 0.0);
        m.update(&[Observation::with_box(1, 40.0, 40.0, 60.0, 60.0)], 1.0);
        m.reset_heatmap();
        assert!(m.heat().cells().iter().all(|&c| c == 0.0));
        assert_eq!(m.dwell().record(1).unwrap().total_time, 1.0);
    }
}
