//! Core data types shared across the pipeline

use crate::error::{CutoutError, Result};
use image::{imageops, ImageBuffer, Luma};

/// Single-channel float matte, values in `[0, 1]`
///
/// Row-major, one value per pixel. Produced by mask models and consumed by
/// the compositor; always resized back to the source image's exact pixel
/// dimensions before compositing.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMatte {
    /// Foreground probability per pixel, row-major
    pub data: Vec<f32>,
    width: u32,
    height: u32,
}

impl AlphaMatte {
    /// Create a matte from raw values
    ///
    /// # Errors
    ///
    /// Returns `CutoutError::Internal` when `data.len()` does not match the
    /// given dimensions.
    pub fn new(data: Vec<f32>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(CutoutError::internal(format!(
                "matte data length {} does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a matte by evaluating a function at every pixel
    pub fn from_fn<F: FnMut(u32, u32) -> f32>(width: u32, height: u32, mut f: F) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Matte dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Value at (x, y); zero outside bounds
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        let idx = (y as usize) * (self.width as usize) + (x as usize);
        self.data.get(idx).copied().unwrap_or(0.0)
    }

    /// Mean alpha over all pixels
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Population standard deviation of the alpha values
    #[must_use]
    pub fn std_dev(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .data
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f32>()
            / self.data.len() as f32;
        variance.sqrt()
    }

    /// Clamp every value into `[0, 1]`
    #[must_use]
    pub fn clipped(mut self) -> Self {
        for v in &mut self.data {
            *v = v.clamp(0.0, 1.0);
        }
        self
    }

    /// Resize to exact target dimensions using cubic interpolation
    #[must_use]
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        let buffer = self.to_luma_f32();
        let resized = imageops::resize(&buffer, width, height, imageops::FilterType::CatmullRom);
        Self {
            data: resized.into_raw(),
            width,
            height,
        }
    }

    /// View as a `Luma<f32>` image buffer (copies)
    #[must_use]
    pub fn to_luma_f32(&self) -> ImageBuffer<Luma<f32>, Vec<f32>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| ImageBuffer::new(self.width, self.height))
    }

    /// Rebuild a matte from a `Luma<f32>` buffer
    #[must_use]
    pub fn from_luma_f32(buffer: ImageBuffer<Luma<f32>, Vec<f32>>) -> Self {
        let (width, height) = buffer.dimensions();
        Self {
            data: buffer.into_raw(),
            width,
            height,
        }
    }
}

/// Result of one `remove_background` request
#[derive(Debug, Clone)]
pub struct RemovalOutcome {
    /// Straight-alpha RGBA PNG bytes, same dimensions as the input
    pub png_bytes: Vec<u8>,
    /// Whether the fast tier was substituted for the requested pro tier
    pub used_fallback: bool,
}
