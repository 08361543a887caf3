//! Latent Preview Decoding
//!
//! Turn mid-generation latents into a small composite preview image on
//! every sampler step, without ever slowing generation down for long.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Preview Pipeline (per step)                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Sampler step ──> ThrottleGate ──(suppressed)──> keep previous   │
//! │                        │                                         │
//! │                        ↓                                         │
//! │                   BatchSampler     batch 10, max 4               │
//! │                        │           -> [0, 3, 6, 9], 2 columns    │
//! │                        ↓                                         │
//! │                 LayerSkipPlanner   cell 384px, latent 128px      │
//! │                        │           -> skip 1 of 3 stages         │
//! │                        ↓                                         │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │  for each item:                                           │   │
//! │  │    primary decode ──(OOM)──> Latent2Rgb fallback          │   │
//! │  │          │                          │                     │   │
//! │  │          └──────────┬───────────────┘                     │   │
//! │  │                     ↓                                     │   │
//! │  │               resize to cell ──> tile into composite      │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                        ↓                                         │
//! │                 host display sink                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Out-of-memory policy
//!
//! | oom_retry | oom_fallback | After an OOM |
//! |-----------|--------------|--------------|
//! | true | latent2rgb | fallback this cycle, primary again next cycle |
//! | true | none | no preview this cycle, primary again next cycle |
//! | false | latent2rgb | fallback for the rest of the session |
//! | false | none | no previews for the rest of the session |

mod batch;
mod config;
mod decoder;
mod error;
mod fallback;
mod image;
mod latent;
mod layers;
mod session;
mod throttle;

pub use batch::{BatchPlan, BatchSampler};
pub use config::{
    CompileOptions, CompileSetting, OomFallback, RawCompile, RawOptions, Settings, SkipPolicy,
};
pub use decoder::{
    DecodePrimitive, DecodeRequest, FallbackPrimitive, PreviewDecoder, PreviewOutcome,
};
pub use error::{PreviewError, Result};
pub use fallback::{Latent2Rgb, SD15_FACTORS, SDXL_BIAS, SDXL_FACTORS};
pub use image::{fit_within, PreviewImage};
pub use latent::{Latent, LatentBatch};
pub use layers::{DecoderDescriptor, LayerSkipPlanner, STAGE_UPSCALE_FACTOR};
pub use session::{CancelHandle, PreviewSession, PreviewStats};
pub use throttle::{ThrottleDecision, ThrottleGate};

pub use config::{
    DEFAULT_MAX_BATCH, DEFAULT_MAX_BATCH_COLS, DEFAULT_MAX_SIZE, DEFAULT_THROTTLE_SECS,
};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        DecodePrimitive, DecodeRequest, DecoderDescriptor, FallbackPrimitive, Latent,
        Latent2Rgb, LatentBatch, PreviewDecoder, PreviewImage, PreviewOutcome, PreviewSession,
        Result, Settings,
    };
}
