// THEORY:
// Time labels are the only text the engine draws on a frame: a dwell clock above each
// visible entity, with the still clock prepended while the entity is classified as
// still. Only digits, ':' and '/' are ever needed, so the labels are drawn with a
// small built-in block font rather than a font file.

use crate::core_modules::dwell::DwellRecord;
use crate::core_modules::palette::Palette;
use image::{Rgb, RgbImage};

/// Formats seconds as `mm:ss`, or `h:mm:ss` from one hour on. Fractions are floored.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (h, rem) = (total / 3600, total % 3600);
    let (m, s) = (rem / 60, rem % 60);
    if h == 0 {
        format!("{m:02}:{s:02}")
    } else {
        format!("{h}:{m:02}:{s:02}")
    }
}

/// `"{still}/{total}"` while still, otherwise `"{total}"`.
pub fn label_for(record: &DwellRecord) -> String {
    let total = format_time(record.total_time);
    if record.is_still {
        format!("{}/{}", format_time(record.still_time), total)
    } else {
        total
    }
}

/// Writes a label above each record's latest box, centered on it and kept inside the
/// frame horizontally.
pub fn annotate<'a>(
    frame: &mut RgbImage,
    records: impl IntoIterator<Item = &'a DwellRecord>,
    text_size: f32,
    text_thickness: u32,
    palette: &dyn Palette,
) {
    let frame_width = frame.width() as i64;
    for record in records {
        let text = label_for(record);
        let (text_w, _) = glyphs::measure(&text, text_size, text_thickness);

        let bbox = record.last_box;
        let center_x = bbox.centroid().x;
        let mut x = (center_x - text_w as f64 / 2.0) as i64;
        x = x.min(frame_width - text_w as i64);
        x = x.max(0);
        let baseline = bbox.top_left.y as i64;

        glyphs::draw(
            frame,
            &text,
            (x, baseline),
            text_size,
            text_thickness,
            palette.color(record.id),
        );
    }
}

pub mod glyphs {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    const GLYPH_W: u32 = 5;
    const GLYPH_H: u32 = 7;

    /// 5x7 bitmaps, one byte per row, most significant of the low five bits leftmost.
    fn bitmap(c: char) -> Option<[u8; 7]> {
        Some(match c {
            '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
            '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
            '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
            '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
            '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
            '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
            '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
            '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
            '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
            ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
            '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
            _ => return None,
        })
    }

    /// Largest pixel size of one glyph dot, and largest extra stroke width.
    const MAX_SCALE: u32 = 256;

    fn scale(text_size: f32) -> u32 {
        ((text_size * 3.0).round() as u32).clamp(1, MAX_SCALE)
    }

    fn stroke_growth(thickness: u32) -> u32 {
        thickness.saturating_sub(1).min(MAX_SCALE)
    }

    /// Width and height in pixels of `text` at the given size and stroke thickness.
    pub fn measure(text: &str, text_size: f32, thickness: u32) -> (u32, u32) {
        let s = scale(text_size);
        let grow = stroke_growth(thickness);
        let n = text.chars().count() as u32;
        if n == 0 {
            return (0, 0);
        }
        let advance = (GLYPH_W + 1) * s;
        (
            n.saturating_mul(advance).saturating_sub(s).saturating_add(grow),
            (GLYPH_H * s).saturating_add(grow),
        )
    }

    /// Draws `text` with its bottom-left corner at `origin`. Pixels outside the frame
    /// are clipped; unknown characters leave a blank cell.
    pub fn draw(
        frame: &mut RgbImage,
        text: &str,
        origin: (i64, i64),
        text_size: f32,
        thickness: u32,
        color: Rgb<u8>,
    ) {
        let s = scale(text_size);
        let grow = stroke_growth(thickness);
        let (width, height) = measure(text, text_size, thickness);
        let top = origin.1.saturating_sub(height as i64);
        let right = origin.0.saturating_add(width as i64);
        if origin.1 < 0 || top >= frame.height() as i64 || right < 0 || origin.0 >= frame.width() as i64 {
            return;
        }
        let dot = s + grow;

        for (i, c) in text.chars().enumerate() {
            let Some(rows) = bitmap(c) else { continue };
            let left = origin.0 + (i as i64) * ((GLYPH_W + 1) * s) as i64;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                        continue;
                    }
                    let x = left + (col * s) as i64;
                    let y = top + (row as u32 * s) as i64;
                    draw_filled_rect_mut(
                        frame,
                        Rect::at(x as i32, y as i32).of_size(dot, dot),
                        color,
                    );
                }
            }
        }
    }
}
