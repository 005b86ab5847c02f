// THEORY:
// Identity-to-color mapping used by the overlay renderers. The engine never picks
// colors itself: callers pass anything implementing `Palette`, including a plain
// `Fn(u64) -> Rgb<u8>` closure. `HuePalette` is the stock choice.

use image::Rgb;

pub trait Palette {
    fn color(&self, id: u64) -> Rgb<u8>;
}

impl<F> Palette for F
where
    F: Fn(u64) -> Rgb<u8>,
{
    fn color(&self, id: u64) -> Rgb<u8> {
        self(id)
    }
}

/// Spreads identities around the hue circle by golden-ratio steps, so consecutive
/// identities get clearly different colors without a lookup table.
#[derive(Debug, Clone, Copy)]
pub struct HuePalette {
    pub saturation: f32,
    pub value: f32,
}

impl Default for HuePalette {
    fn default() -> Self {
        Self {
            saturation: 0.85,
            value: 0.95,
        }
    }
}

const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;

impl Palette for HuePalette {
    fn color(&self, id: u64) -> Rgb<u8> {
        let hue = ((id as f64 * GOLDEN_RATIO_CONJUGATE).fract() * 360.0) as f32;
        hsv_to_rgb(hue, self.saturation, self.value)
    }
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
    let c = value * saturation;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}
