pub mod dashboard;
pub mod dwell;
pub mod geometry;
pub mod heat_grid;
pub mod occupancy;
pub mod palette;
pub mod time_label;
pub mod trail;
pub mod utils;
