// THEORY:
// Every failure the analytic core can meet in steady state is local to a single
// observation or to construction-time configuration. Observation errors are never
// propagated out of `update`: they are collected into the tick report and logged,
// and the remaining observations are still processed.

use thiserror::Error;

/// Why a single observation could not be (fully) applied during a tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    /// The geometry estimate cannot yield a centroid or box (empty point set,
    /// NaN/inf coordinates). The observation is skipped by every component.
    #[error("unsupported geometry for id {id}: {reason}")]
    UnsupportedGeometry { id: u64, reason: &'static str },

    /// The centroid fell outside the heat grid. Only heat accumulation skips it.
    #[error("centroid ({x}, {y}) of id {id} is outside the {width}x{height} heat grid")]
    OutOfBounds {
        id: u64,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    /// The tick timestamp was NaN or infinite. The dwell accumulator ignores the tick
    /// for this identity; heat and trails still use the observation.
    #[error("non-finite timestamp {timestamp} for id {id}")]
    InvalidTimestamp { id: u64, timestamp: f64 },

    /// The reference box has a non-positive area, so no overlap ratio exists.
    /// The entity is treated as moving for this tick.
    #[error("degenerate reference box for id {id} (area {area})")]
    DegenerateGeometry { id: u64, area: f64 },
}

impl ObservationError {
    pub fn id(&self) -> u64 {
        match self {
            Self::UnsupportedGeometry { id, .. }
            | Self::OutOfBounds { id, .. }
            | Self::InvalidTimestamp { id, .. }
            | Self::DegenerateGeometry { id, .. } => *id,
        }
    }
}

/// Rejected monitor configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("frame size must be non-zero, got {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },

    #[error("{field} must be a finite, non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: usize,
        max: usize,
    },

    #[error("trail decay must be in (0, 1], got {0}")]
    InvalidDecay(f32),
}

/// Failures of the multi-stream driver.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    #[error("stream '{0}' is already registered")]
    DuplicateStream(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("stream worker for '{stream}' failed: {reason}")]
    Worker { stream: String, reason: String },
}
