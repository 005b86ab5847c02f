pub mod image_helper {
    use image::{ImageEncoder, ImageError, RgbImage};
    use std::path::Path;

    /// Writes an RGB frame as PNG.
    pub fn save(path: impl AsRef<Path>, frame: &RgbImage) -> Result<(), ImageError> {
        let output = std::io::BufWriter::new(std::fs::File::create(path)?);
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )?;

        Ok(())
    }

    /// Reads any supported image file as an RGB frame.
    pub fn load(path: impl AsRef<Path>) -> Result<RgbImage, ImageError> {
        Ok(image::open(path)?.to_rgb8())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use image::{Rgb, RgbImage};

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dwell_vision_{}_{name}", std::process::id()))
    }

    #[test]
    fn save_white_file() {
        let frame = RgbImage::from_pixel(50, 30, Rgb([255, 255, 255]));
        let path = scratch("white_file.png");

        save(&path, &frame).expect("Error Saving File.");
        let back = load(&path).expect("Error Loading File.");
        assert_eq!(back, frame);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn save_gradient_file() {
        let frame = RgbImage::from_fn(64, 16, |x, y| {
            let intensity = ((x + y * 64) % 255) as u8;
            Rgb([intensity, intensity, intensity])
        });
        let path = scratch("gradient_file.png");

        save(&path, &frame).expect("Error Saving File.");
        let back = load(&path).expect("Error Loading File.");
        assert_eq!(back.dimensions(), (64, 16));
        assert_eq!(back.get_pixel(10, 1), frame.get_pixel(10, 1));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(scratch("does_not_exist.png")).is_err());
    }
}
