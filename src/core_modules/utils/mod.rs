mod image_helper;

pub use image_helper::image_helper::{load, save};
