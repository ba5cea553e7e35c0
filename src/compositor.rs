//! Matte scoring, refinement and straight-alpha PNG encoding
//!
//! Pure functions over [`AlphaMatte`] values; nothing here touches model
//! state or the filesystem.

use crate::error::{CutoutError, Result};
use crate::types::AlphaMatte;
use image::codecs::png::PngEncoder;
use image::{imageops, DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

/// Candidates scoring below this are untrustworthy and trigger fallback
pub const MIN_ACCEPTED_SCORE: f32 = 0.15;

/// Default feathering sigma for single-matte compositing
pub const FEATHER_SIGMA: f32 = 0.7;

/// One scored pro-tier rendering
#[derive(Debug, Clone)]
pub struct MatteCandidate {
    /// Short label used in score logs
    pub label: &'static str,
    pub matte: AlphaMatte,
    pub score: f32,
}

impl MatteCandidate {
    /// Score a matte and wrap it as a candidate
    #[must_use]
    pub fn scored(label: &'static str, matte: AlphaMatte) -> Self {
        let score = alpha_score(&matte);
        Self {
            label,
            matte,
            score,
        }
    }
}

/// Scalar quality score for an alpha matte
///
/// `0.65 * coverage + 0.35 * std(alpha)`, where coverage rewards mattes
/// that are neither nearly all-foreground nor all-background, and the
/// standard deviation term rewards sharp foreground/background separation
/// over uniform gray.
#[must_use]
pub fn alpha_score(matte: &AlphaMatte) -> f32 {
    let mean = matte.mean();
    let std = matte.std_dev();
    let coverage = (1.0 - (mean - 0.5).abs() * 2.0).clamp(0.0, 1.0);
    (0.65 * coverage + 0.35 * std).clamp(0.0, 1.0)
}

/// Pick the highest-scoring candidate, rejecting low-confidence results
///
/// Returns `None` when the list is empty or the best score is below
/// [`MIN_ACCEPTED_SCORE`]; callers fall back to the fast tier in that case.
#[must_use]
pub fn select_best(candidates: &[MatteCandidate]) -> Option<&MatteCandidate> {
    let best = candidates
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))?;
    if best.score < MIN_ACCEPTED_SCORE {
        return None;
    }
    Some(best)
}

/// Light Gaussian smoothing to soften matte edges
#[must_use]
pub fn feather(matte: &AlphaMatte, sigma: f32) -> AlphaMatte {
    let blurred = imageops::blur(&matte.to_luma_f32(), sigma);
    AlphaMatte::from_luma_f32(blurred).clipped()
}

/// Edge refinement: keep an eroded sure-foreground core, blend in a
/// feathered halo, and slightly lift midtones
#[must_use]
pub fn refine(matte: &AlphaMatte) -> AlphaMatte {
    let (width, height) = matte.dimensions();
    let eroded = erode3x3(matte);
    let feathered = feather(matte, FEATHER_SIGMA);

    let combined = AlphaMatte::from_fn(width, height, |x, y| {
        let core = eroded.get(x, y);
        let halo = feathered.get(x, y) * 0.98;
        core.max(halo).clamp(0.0, 1.0).powf(0.9)
    });
    combined.clipped()
}

/// 3x3 minimum filter (morphological erosion on a float matte)
fn erode3x3(matte: &AlphaMatte) -> AlphaMatte {
    let (width, height) = matte.dimensions();
    AlphaMatte::from_fn(width, height, |x, y| {
        let mut min = f32::INFINITY;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && ny >= 0 && nx < i64::from(width) && ny < i64::from(height) {
                    min = min.min(matte.get(nx as u32, ny as u32));
                }
            }
        }
        if min.is_finite() {
            min
        } else {
            0.0
        }
    })
}

/// Encode a straight-alpha RGBA PNG
///
/// Color channels are the original RGB untouched (no premultiplication);
/// the alpha channel is `round(clip(a, 0, 1) * 255)`, round-half-up.
///
/// # Errors
/// - `Internal` when the matte dimensions do not match the image
/// - `Image` on PNG encoding failures
pub fn encode_straight_rgba(image: &DynamicImage, matte: &AlphaMatte) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    if matte.dimensions() != (width, height) {
        return Err(CutoutError::internal(format!(
            "matte dimensions {:?} do not match image {}x{}",
            matte.dimensions(),
            width,
            height
        )));
    }

    let rgb = image.to_rgb8();
    let mut rgba = RgbaImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let alpha = (matte.get(x, y).clamp(0.0, 1.0) * 255.0).round() as u8;
        rgba.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], alpha]));
    }

    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer).write_image(
        rgba.as_raw(),
        width,
        height,
        ExtendedColorType::Rgba8,
    )?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_straight_alpha_encoding_exact() {
        let mut rgb = RgbImage::new(2, 2);
        rgb.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        rgb.put_pixel(0, 1, image::Rgb([0, 0, 255]));
        rgb.put_pixel(1, 1, image::Rgb([255, 255, 0]));
        let image = DynamicImage::ImageRgb8(rgb.clone());
        let matte = AlphaMatte::new(vec![1.0, 0.5, 0.0, 1.0], 2, 2).unwrap();

        let png = encode_straight_rgba(&image, &matte).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();

        // Color channels untouched, alpha = round(a * 255), half-up
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 255, 0, 128]);
        assert_eq!(decoded.get_pixel(0, 1).0, [0, 0, 255, 0]);
        assert_eq!(decoded.get_pixel(1, 1).0, [255, 255, 0, 255]);
    }

    #[test]
    fn test_encode_rejects_dimension_mismatch() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let matte = AlphaMatte::new(vec![0.0; 4], 2, 2).unwrap();
        assert!(encode_straight_rgba(&image, &matte).is_err());
    }

    #[test]
    fn test_score_rewards_higher_std_at_equal_mean() {
        // Both mean 0.5; the bimodal matte has higher standard deviation
        let bimodal = AlphaMatte::new(vec![0.0, 1.0, 0.0, 1.0], 2, 2).unwrap();
        let flat = AlphaMatte::new(vec![0.5, 0.5, 0.5, 0.5], 2, 2).unwrap();
        assert!((bimodal.mean() - flat.mean()).abs() < 1e-6);
        assert!(alpha_score(&bimodal) > alpha_score(&flat));
    }

    #[test]
    fn test_score_rewards_mean_closer_to_half_at_equal_std() {
        // Zero std in both; means 0.5 vs 0.9
        let balanced = AlphaMatte::new(vec![0.5; 4], 2, 2).unwrap();
        let skewed = AlphaMatte::new(vec![0.9; 4], 2, 2).unwrap();
        assert!((balanced.std_dev() - skewed.std_dev()).abs() < 1e-6);
        assert!(alpha_score(&balanced) > alpha_score(&skewed));
    }

    #[test]
    fn test_zero_variance_mask_scores_at_coverage_bound() {
        let all_fg = AlphaMatte::new(vec![1.0; 4], 2, 2).unwrap();
        let all_bg = AlphaMatte::new(vec![0.0; 4], 2, 2).unwrap();
        assert_eq!(alpha_score(&all_fg), 0.0);
        assert_eq!(alpha_score(&all_bg), 0.0);
    }

    #[test]
    fn test_select_best_rejects_low_confidence() {
        let weak = MatteCandidate::scored("weak", AlphaMatte::new(vec![0.0; 4], 2, 2).unwrap());
        assert!(weak.score < MIN_ACCEPTED_SCORE);
        // Even as the only candidate it must not be selected
        assert!(select_best(&[weak]).is_none());
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn test_select_best_picks_highest_score() {
        let strong = MatteCandidate::scored(
            "strong",
            AlphaMatte::new(vec![0.0, 1.0, 0.0, 1.0], 2, 2).unwrap(),
        );
        let weak = MatteCandidate::scored("weak", AlphaMatte::new(vec![0.4; 4], 2, 2).unwrap());
        let candidates = [weak, strong];
        let best = select_best(&candidates).unwrap();
        assert_eq!(best.label, "strong");
    }

    #[test]
    fn test_feather_preserves_dimensions_and_range() {
        let matte = AlphaMatte::from_fn(8, 8, |x, _| if x < 4 { 1.0 } else { 0.0 });
        let soft = feather(&matte, FEATHER_SIGMA);
        assert_eq!(soft.dimensions(), (8, 8));
        assert!(soft.data.iter().all(|v| (0.0..=1.0).contains(v)));
        // The hard edge is softened
        assert!(soft.get(4, 4) > 0.0);
    }

    #[test]
    fn test_refine_keeps_solid_core() {
        let matte = AlphaMatte::from_fn(9, 9, |x, y| {
            if (2..7).contains(&x) && (2..7).contains(&y) {
                1.0
            } else {
                0.0
            }
        });
        let refined = refine(&matte);
        assert_eq!(refined.dimensions(), (9, 9));
        assert!(refined.get(4, 4) > 0.9);
        assert!(refined.get(0, 0) < 0.1);
    }
}
