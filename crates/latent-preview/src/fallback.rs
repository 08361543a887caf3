//! Linear latent-to-RGB projection
//!
//! Used when the primary decoder cannot run. Each latent pixel is projected
//! onto RGB with a small factor matrix, so the result costs next to nothing
//! but is only as sharp as the latent grid.

use crate::{FallbackPrimitive, Latent, PreviewError, PreviewImage, Result};

/// Projection factors for 4-channel SD1.x latents, one RGB row per channel
pub const SD15_FACTORS: [[f32; 3]; 4] = [
    [0.3512, 0.2297, 0.3227],
    [0.3250, 0.4974, 0.2350],
    [-0.2829, 0.1762, 0.2721],
    [-0.2120, -0.2616, -0.7177],
];

/// Projection factors for 4-channel SDXL latents
pub const SDXL_FACTORS: [[f32; 3]; 4] = [
    [0.3651, 0.4232, 0.4341],
    [-0.2533, -0.0042, 0.1068],
    [0.1076, 0.1111, -0.0362],
    [-0.3165, -0.2492, -0.2188],
];

/// Per-channel RGB bias for SDXL latents
pub const SDXL_BIAS: [f32; 3] = [0.1084, -0.0175, -0.0011];

/// Cheap fallback previewer
#[derive(Debug, Clone)]
pub struct Latent2Rgb {
    factors: Vec<[f32; 3]>,
    bias: [f32; 3],
}

impl Default for Latent2Rgb {
    fn default() -> Self {
        Self::sd15()
    }
}

impl Latent2Rgb {
    /// Custom projection
    pub fn new(factors: Vec<[f32; 3]>, bias: [f32; 3]) -> Self {
        Self { factors, bias }
    }

    /// SD1.x projection
    pub fn sd15() -> Self {
        Self::new(SD15_FACTORS.to_vec(), [0.0; 3])
    }

    /// SDXL projection
    pub fn sdxl() -> Self {
        Self::new(SDXL_FACTORS.to_vec(), SDXL_BIAS)
    }

    /// Latent channels this projection expects
    pub fn channels(&self) -> usize {
        self.factors.len()
    }

    /// Project at latent resolution
    pub fn project(&self, latent: &Latent) -> Result<PreviewImage> {
        if latent.channels() != self.factors.len() {
            return Err(PreviewError::Decode(format!(
                "latent2rgb expects {} channels, latent has {}",
                self.factors.len(),
                latent.channels()
            )));
        }

        let (width, height) = latent.dims();
        let mut image = PreviewImage::blank(width, height);
        for y in 0..height {
            for x in 0..width {
                let mut rgb = self.bias;
                for (c, row) in self.factors.iter().enumerate() {
                    let v = latent.at(c, x, y);
                    rgb[0] += v * row[0];
                    rgb[1] += v * row[1];
                    rgb[2] += v * row[2];
                }
                image.put_pixel(x, y, [to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), 255]);
            }
        }
        Ok(image)
    }
}

/// Map [-1, 1] to [0, 255]
fn to_u8(v: f32) -> u8 {
    (((v + 1.0) * 0.5).clamp(0.0, 1.0) * 255.0).round() as u8
}

impl FallbackPrimitive for Latent2Rgb {
    fn fallback_decode(&self, latent: &Latent, target: (u32, u32)) -> Result<PreviewImage> {
        Ok(self.project(latent)?.resize(target.0, target.1))
    }
}
