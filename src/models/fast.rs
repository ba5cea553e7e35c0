//! Weight-free fast-tier matte model
//!
//! The fast tier must be available from process start with no lazy load,
//! so it cannot depend on weight files. It estimates the background color
//! from the image border and rates each pixel by its distance from that
//! color, min-max normalized into a matte. Crude next to the neural pro
//! tier, but deterministic and always ready.

use crate::error::Result;
use crate::models::MaskModel;
use crate::status::{ModelStatus, StatusHandle};
use crate::types::AlphaMatte;
use image::DynamicImage;

/// Fraction of the shorter image side sampled as the border band
const BORDER_BAND: f32 = 0.04;

/// Always-ready heuristic matte model backing the fast tier
#[derive(Debug)]
pub struct HeuristicMatteModel {
    identity: String,
    status: StatusHandle,
}

impl HeuristicMatteModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity: "heuristic-border-matte".to_string(),
            status: StatusHandle::ready("cpu"),
        }
    }

    /// Mean RGB of the pixels in the border band
    fn border_mean(rgb: &image::Rgb32FImage, band: u32) -> [f32; 3] {
        let (width, height) = rgb.dimensions();
        let mut sum = [0.0f64; 3];
        let mut count = 0u64;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let in_band =
                x < band || y < band || x >= width.saturating_sub(band) || y >= height.saturating_sub(band);
            if in_band {
                sum[0] += f64::from(pixel[0]);
                sum[1] += f64::from(pixel[1]);
                sum[2] += f64::from(pixel[2]);
                count += 1;
            }
        }
        if count == 0 {
            return [0.0; 3];
        }
        [
            (sum[0] / count as f64) as f32,
            (sum[1] / count as f64) as f32,
            (sum[2] / count as f64) as f32,
        ]
    }
}

impl Default for HeuristicMatteModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskModel for HeuristicMatteModel {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn ensure_loaded(&self) -> Result<()> {
        // Nothing to load; the model is constructed ready.
        Ok(())
    }

    fn predict_mask(&self, image: &DynamicImage) -> Result<AlphaMatte> {
        let rgb = image.to_rgb32f();
        let (width, height) = rgb.dimensions();
        let band = ((width.min(height) as f32 * BORDER_BAND).ceil() as u32).max(1);
        let background = Self::border_mean(&rgb, band);

        let mut distances = Vec::with_capacity((width as usize) * (height as usize));
        let mut max_distance = 0.0f32;
        for pixel in rgb.pixels() {
            let dr = pixel[0] - background[0];
            let dg = pixel[1] - background[1];
            let db = pixel[2] - background[2];
            let distance = (dr * dr + dg * dg + db * db).sqrt();
            max_distance = max_distance.max(distance);
            distances.push(distance);
        }

        // Constant image: nothing distinguishable from background.
        if max_distance <= f32::EPSILON {
            return AlphaMatte::new(vec![0.0; distances.len()], width, height);
        }

        for d in &mut distances {
            *d /= max_distance;
        }
        Ok(AlphaMatte::new(distances, width, height)?.clipped())
    }

    fn status(&self) -> ModelStatus {
        self.status.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ModelState;
    use image::RgbImage;

    fn image_with_centered_square() -> DynamicImage {
        let mut img = RgbImage::from_pixel(32, 32, image::Rgb([10, 10, 10]));
        for y in 12..20 {
            for x in 12..20 {
                img.put_pixel(x, y, image::Rgb([240, 240, 240]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_always_ready() {
        let model = HeuristicMatteModel::new();
        assert!(model.ensure_loaded().is_ok());
        let status = model.status();
        assert_eq!(status.state, ModelState::Ready);
        assert!(status.ready);
    }

    #[test]
    fn test_matte_matches_input_dimensions() {
        let model = HeuristicMatteModel::new();
        let matte = model.predict_mask(&image_with_centered_square()).unwrap();
        assert_eq!(matte.dimensions(), (32, 32));
    }

    #[test]
    fn test_foreground_scores_above_background() {
        let model = HeuristicMatteModel::new();
        let matte = model.predict_mask(&image_with_centered_square()).unwrap();
        assert!(matte.get(16, 16) > matte.get(1, 1));
        assert!(matte.get(16, 16) > 0.9);
    }

    #[test]
    fn test_constant_image_yields_zero_matte() {
        let model = HeuristicMatteModel::new();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([50, 50, 50])));
        let matte = model.predict_mask(&img).unwrap();
        assert!(matte.data.iter().all(|v| *v == 0.0));
    }
}
