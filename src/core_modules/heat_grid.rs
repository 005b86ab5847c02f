// THEORY:
// The `SpatialHeatAccumulator` is the long-term spatial memory of the engine. Where the
// dwell accumulator remembers *how long* entities stayed, the heat grid remembers
// *where* they stayed.
//
// Key architectural principles:
// 1.  **Precomputed Kernel**: A single radial kernel (a filled disk weighted by an
//     inverted distance gradient, normalized to [0, 1]) is built once at construction
//     and never changes. Every stamp is a copy-add of this kernel.
// 2.  **Pure Accumulation**: Grid cells only ever grow. There is no decay; only an
//     explicit `reset` brings the grid back to zero.
// 3.  **Boundary Safety**: A stamp overlapping a frame edge is clipped on the grid side
//     and the kernel side by the same amount, so the kernel-to-cell correspondence is
//     preserved and nothing is written out of bounds. A centroid outside the frame is
//     skipped altogether.
// 4.  **Read-Only Rendering**: `render` is a pure function of the grid: min-max
//     normalization, histogram equalization, JET coloring and a 50/50 blend over the
//     frame.

use crate::core_modules::geometry::Observation;
use crate::error::ObservationError;
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use tracing::debug;

/// The square stamp added to the grid for every observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    side: usize,
    values: Vec<f32>,
}

impl Kernel {
    /// Builds a `2 * radius` square kernel holding a gradient-filled disk.
    pub fn radial(radius: u32) -> Self {
        let side = 2 * radius as usize;
        let center = radius as f32 - 0.5;
        let distance = |row: usize, col: usize| {
            let dx = col as f32 - center;
            let dy = row as f32 - center;
            (dx * dx + dy * dy).sqrt()
        };

        // Farthest cell from the center is any corner.
        let max_distance = distance(0, 0);
        let mut values = Vec::with_capacity(side * side);
        for row in 0..side {
            for col in 0..side {
                let d = distance(row, col);
                let inside = d <= radius as f32;
                values.push(if inside { max_distance - d } else { 0.0 });
            }
        }

        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        if range > f32::EPSILON {
            for v in &mut values {
                *v = (*v - min) / range;
            }
        } else {
            // Too small to carry a gradient; stamp a flat block.
            values.iter_mut().for_each(|v| *v = 1.0);
        }

        Self { side, values }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn value(&self, col: usize, row: usize) -> f32 {
        self.values[row * self.side + col]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// One axis of a clipped stamp: grid range `[start, end)` and the kernel offset of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    kernel_offset: usize,
}

fn clip_span(center: i64, radius: i64, limit: usize) -> Span {
    let mut start = center - radius;
    let mut end = center + radius;
    let mut kernel_offset = 0;
    if start < 0 {
        kernel_offset = (-start) as usize;
        start = 0;
    }
    if end > limit as i64 {
        end = limit as i64;
    }
    Span {
        start: start as usize,
        end: end as usize,
        kernel_offset,
    }
}

/// Persistent density grid the size of the frame.
pub struct SpatialHeatAccumulator {
    width: u32,
    height: u32,
    radius: u32,
    kernel: Kernel,
    cells: Vec<f32>,
}

impl SpatialHeatAccumulator {
    pub fn new(width: u32, height: u32, radius: u32) -> Self {
        Self {
            width,
            height,
            radius,
            kernel: Kernel::radial(radius),
            cells: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Row-major cell values.
    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn value(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.cells[y as usize * self.width as usize + x as usize])
    }

    /// Zeroes every cell. The kernel is kept.
    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0.0);
    }

    /// Stamps the kernel at each observation's centroid.
    ///
    /// Returns the observations that were skipped.
    pub fn update(&mut self, observations: &[Observation]) -> Vec<ObservationError> {
        let mut issues = Vec::new();
        for obs in observations {
            let centroid = match obs.centroid() {
                Ok(c) => c,
                Err(err) => {
                    issues.push(err);
                    continue;
                }
            };
            let x = centroid.x.floor() as i64;
            let y = centroid.y.floor() as i64;
            if let Err(err) = self.stamp(obs.id, x, y) {
                debug!(%err, "heat stamp skipped");
                issues.push(err);
            }
        }
        issues
    }

    fn stamp(&mut self, id: u64, x: i64, y: i64) -> Result<(), ObservationError> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return Err(ObservationError::OutOfBounds {
                id,
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }

        let r = self.radius as i64;
        let cols = clip_span(x, r, self.width as usize);
        let rows = clip_span(y, r, self.height as usize);
        let grid_width = self.width as usize;

        for (i, gy) in (rows.start..rows.end).enumerate() {
            let ky = rows.kernel_offset + i;
            let row = &mut self.cells[gy * grid_width..(gy + 1) * grid_width];
            for (j, gx) in (cols.start..cols.end).enumerate() {
                row[gx] += self.kernel.value(cols.kernel_offset + j, ky);
            }
        }
        Ok(())
    }

    /// Colors the grid and blends it over `frame`, resized to `output_size` if that
    /// differs from the frame's size.
    pub fn render(&self, frame: &RgbImage, output_size: (u32, u32)) -> RgbImage {
        let mut colored = self.color_map();
        if colored.dimensions() != frame.dimensions() {
            debug!(
                grid = ?colored.dimensions(),
                frame = ?frame.dimensions(),
                "heat grid and frame differ in size, scaling grid"
            );
            colored = imageops::resize(&colored, frame.width(), frame.height(), FilterType::Triangle);
        }

        let blended = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let f = frame.get_pixel(x, y).0;
            let c = colored.get_pixel(x, y).0;
            Rgb([blend(f[0], c[0]), blend(f[1], c[1]), blend(f[2], c[2])])
        });

        if output_size == blended.dimensions() {
            blended
        } else {
            imageops::resize(&blended, output_size.0, output_size.1, FilterType::Triangle)
        }
    }

    /// Normalized, equalized grayscale view of the grid.
    pub fn intensity(&self) -> GrayImage {
        match self.normalized() {
            Some(gray) => imageproc::contrast::equalize_histogram(&gray),
            // Equalizing a single-level image would push it to white.
            None => GrayImage::new(self.width, self.height),
        }
    }

    /// Grid stretched to 0..=255, fractions truncated. `None` for a flat grid.
    fn normalized(&self) -> Option<GrayImage> {
        let min = self.cells.iter().copied().fold(f32::INFINITY, f32::min);
        let max = self.cells.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        if !(range > 0.0) {
            return None;
        }
        Some(GrayImage::from_fn(self.width, self.height, |x, y| {
            let v = self.cells[y as usize * self.width as usize + x as usize];
            image::Luma([((v - min) / range * 255.0) as u8])
        }))
    }

    fn color_map(&self) -> RgbImage {
        let gray = self.intensity();
        RgbImage::from_fn(self.width, self.height, |x, y| jet(gray.get_pixel(x, y).0[0]))
    }
}

fn blend(a: u8, b: u8) -> u8 {
    ((a as f32 + b as f32) * 0.5).round() as u8
}

/// Blue -> cyan -> yellow -> red ramp.
fn jet(level: u8) -> Rgb<u8> {
    let x = level as f32 / 255.0;
    let channel = |offset: f32| ((1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}
