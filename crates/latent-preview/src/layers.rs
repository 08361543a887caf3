//! Decoder upscale-stage skipping
//!
//! Each decoder upscale stage doubles spatial resolution. Skipping stages
//! from the end of the decoder makes it cheaper at the cost of a smaller
//! native output, which is fine as long as the preview gets downscaled
//! anyway.

use crate::{PreviewError, Result, SkipPolicy};
use serde::{Deserialize, Serialize};

/// Resolution factor of a single upscale stage
pub const STAGE_UPSCALE_FACTOR: u32 = 2;

/// Static description of the primary decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderDescriptor {
    /// Number of upscale stages in the decoder
    pub upscale_layers: u32,
}

impl Default for DecoderDescriptor {
    fn default() -> Self {
        // 8x latent-to-pixel decoders
        Self { upscale_layers: 3 }
    }
}

impl DecoderDescriptor {
    /// Create a descriptor
    pub fn new(upscale_layers: u32) -> Self {
        Self { upscale_layers }
    }

    /// Fail if the decoder has nothing to plan with
    pub fn validate(&self) -> Result<()> {
        if self.upscale_layers == 0 {
            return Err(PreviewError::Planner(
                "decoder reports no upscale layers".into(),
            ));
        }
        Ok(())
    }

    /// Native output size for a latent of `latent_dims` when `skip` stages are bypassed
    pub fn native_size(&self, latent_dims: (u32, u32), skip: u32) -> (u32, u32) {
        let active = self.upscale_layers.saturating_sub(skip);
        let scale = STAGE_UPSCALE_FACTOR.saturating_pow(active);
        (
            latent_dims.0.saturating_mul(scale),
            latent_dims.1.saturating_mul(scale),
        )
    }
}

/// Computes how many upscale stages to bypass for a requested preview size
#[derive(Debug, Clone, Copy)]
pub struct LayerSkipPlanner {
    descriptor: DecoderDescriptor,
}

impl LayerSkipPlanner {
    /// Create a planner for a decoder
    pub fn new(descriptor: DecoderDescriptor) -> Result<Self> {
        descriptor.validate()?;
        Ok(Self { descriptor })
    }

    /// Decoder this planner works for
    pub fn descriptor(&self) -> DecoderDescriptor {
        self.descriptor
    }

    /// Plan the skip count for `target` (the size the decoded item will be shown at).
    pub fn plan(&self, target: (u32, u32), latent_dims: (u32, u32), policy: SkipPolicy) -> u32 {
        let layers = self.descriptor.upscale_layers;
        match policy {
            SkipPolicy::Fixed(n) => n.min(layers),
            SkipPolicy::Conservative => self.max_skip_above(latent_dims, target),
            SkipPolicy::Aggressive => {
                let floor = (target.0.div_ceil(2).max(1), target.1.div_ceil(2).max(1));
                self.max_skip_above(latent_dims, floor)
            }
        }
    }

    /// Most stages that can be skipped while native output stays >= `floor` on both axes.
    fn max_skip_above(&self, latent_dims: (u32, u32), floor: (u32, u32)) -> u32 {
        (0..=self.descriptor.upscale_layers)
            .rev()
            .find(|&skip| {
                let (w, h) = self.descriptor.native_size(latent_dims, skip);
                w >= floor.0 && h >= floor.1
            })
            .unwrap_or(0)
    }
}
