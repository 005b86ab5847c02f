// THEORY:
// The `TrailHistory` keeps a short, fading memory of where each currently visible
// entity has just been. Unlike the dwell history it is deliberately forgetful: an
// identity that is missing from a tick loses its whole trail.
//
// Each trail is a bounded deque of centroids, newest at the front. Rendering walks a
// trail from newest to oldest and shrinks the marker geometrically at every step.

use crate::core_modules::geometry::{Observation, Point};
use crate::core_modules::palette::Palette;
use crate::error::ObservationError;
use image::RgbImage;
use imageproc::drawing::draw_hollow_circle_mut;
use std::collections::{BTreeMap, VecDeque};

/// Upper bound on the points reserved up front for a new trail.
const PREALLOCATED_POINTS: usize = 64;

/// Bounded per-identity centroid history.
pub struct TrailHistory {
    history_size: usize,
    radius: u32,
    thickness: u32,
    decay: f32,
    trails: BTreeMap<u64, VecDeque<Point>>,
}

impl TrailHistory {
    pub fn new(history_size: usize, radius: u32, thickness: u32, decay: f32) -> Self {
        Self {
            history_size,
            radius,
            thickness,
            decay,
            trails: BTreeMap::new(),
        }
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Pushes every observation's centroid and forgets identities not seen this tick.
    pub fn update(&mut self, observations: &[Observation]) -> Vec<ObservationError> {
        let mut issues = Vec::new();
        let mut next = BTreeMap::new();

        for obs in observations {
            let centroid = match obs.centroid() {
                Ok(c) => c,
                Err(err) => {
                    issues.push(err);
                    continue;
                }
            };
            let mut trail = next
                .remove(&obs.id)
                .or_else(|| self.trails.remove(&obs.id))
                .unwrap_or_else(|| VecDeque::with_capacity(self.history_size.min(PREALLOCATED_POINTS)));
            trail.push_front(centroid);
            trail.truncate(self.history_size);
            next.insert(obs.id, trail);
        }

        self.trails = next;
        issues
    }

    /// Centroids for `id`, newest first.
    pub fn trail(&self, id: u64) -> Option<&VecDeque<Point>> {
        self.trails.get(&id)
    }

    pub fn identities(&self) -> impl Iterator<Item = u64> + '_ {
        self.trails.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.trails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    /// Marker radius for the point `step` positions back from the newest.
    pub fn marker_radius(&self, step: usize) -> i32 {
        (self.radius as f32 * self.decay.powi(step as i32)).ceil() as i32
    }

    /// Draws the trails onto a copy of `frame`.
    pub fn render(&self, frame: &RgbImage, palette: &dyn Palette) -> RgbImage {
        let mut out = frame.clone();
        self.draw(&mut out, palette);
        out
    }

    /// Draws the trails onto `frame` in place.
    pub fn draw(&self, frame: &mut RgbImage, palette: &dyn Palette) {
        let inner = (self.thickness / 2) as i32;
        for (&id, trail) in &self.trails {
            let color = palette.color(id);
            for (step, point) in trail.iter().enumerate() {
                let center = (point.x.floor() as i32, point.y.floor() as i32);
                let radius = self.marker_radius(step);
                for ring in 0..self.thickness.max(1) as i32 {
                    let r = radius - inner + ring;
                    if r >= 0 {
                        draw_hollow_circle_mut(frame, center, r, color);
                    }
                }
            }
        }
    }
}
