//! Preview decoding pipeline
//!
//! [`PreviewDecoder`] runs once per sampler step. It checks the throttle,
//! picks batch items, plans the decoder depth, decodes each item through the
//! primary primitive (or the fallback, per the out-of-memory policy) and
//! tiles the results into one composite image.

use crate::{
    fit_within, BatchPlan, BatchSampler, CompileSetting, DecoderDescriptor, Latent, LatentBatch,
    LayerSkipPlanner, OomFallback, PreviewError, PreviewImage, PreviewSession, Result, Settings,
    ThrottleDecision,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything the primary decoder needs for one item
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    /// Latent to decode
    pub latent: &'a Latent,
    /// Size the result will be shown at
    pub target: (u32, u32),
    /// Upscale stages to bypass
    pub skip_layers: u32,
    /// Device override
    pub device: Option<&'a str>,
    /// Compiled variant to use
    pub compile: &'a CompileSetting,
}

/// Full-quality latent decoder (e.g. a tiny autoencoder)
///
/// Implementations report memory exhaustion as
/// [`PreviewError::OutOfMemory`]; every other error is treated as a plain
/// decode failure and not retried. The returned image may be any size, it is
/// resampled to the request target.
pub trait DecodePrimitive {
    /// Decode one latent
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<PreviewImage>;
}

/// Cheap, memory-light decoder used after out-of-memory failures
pub trait FallbackPrimitive {
    /// Decode one latent at roughly `target` size
    fn fallback_decode(&self, latent: &Latent, target: (u32, u32)) -> Result<PreviewImage>;
}

/// Result of one preview step
#[derive(Debug)]
pub enum PreviewOutcome {
    /// Previewer switched off, the host's own previewer applies
    Disabled,
    /// Too soon after the last preview, keep showing it
    Throttled,
    /// Nothing to show (empty batch, or primary given up with no fallback)
    Skipped,
    /// Generation was interrupted mid-cycle
    Cancelled,
    /// Decoding failed; generation continues without a new preview
    Failed(PreviewError),
    /// New composite preview
    Emitted(PreviewImage),
}

impl PreviewOutcome {
    /// Whether a new image was produced
    pub fn is_emitted(&self) -> bool {
        matches!(self, PreviewOutcome::Emitted(_))
    }

    /// The new image, if any
    pub fn image(&self) -> Option<&PreviewImage> {
        match self {
            PreviewOutcome::Emitted(image) => Some(image),
            _ => None,
        }
    }

    /// Take the new image, if any
    pub fn into_image(self) -> Option<PreviewImage> {
        match self {
            PreviewOutcome::Emitted(image) => Some(image),
            _ => None,
        }
    }
}

/// Throttled, fallback-aware batch preview decoder
#[derive(Debug)]
pub struct PreviewDecoder<P, F> {
    settings: Settings,
    planner: LayerSkipPlanner,
    sampler: BatchSampler,
    primary: P,
    fallback: F,
}

impl<P: DecodePrimitive, F: FallbackPrimitive> PreviewDecoder<P, F> {
    /// Create a decoder; fails if the decoder descriptor is malformed
    pub fn new(
        settings: Settings,
        descriptor: DecoderDescriptor,
        primary: P,
        fallback: F,
    ) -> Result<Self> {
        let planner = LayerSkipPlanner::new(descriptor)?;
        let sampler = BatchSampler::new(
            settings.max_batch(),
            settings.max_batch_cols(),
            settings.maxed_batch_step_mode(),
        );
        Ok(Self {
            settings,
            planner,
            sampler,
            primary,
            fallback,
        })
    }

    /// Active settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Batch sampler built from the settings
    pub fn sampler(&self) -> &BatchSampler {
        &self.sampler
    }

    /// Layer skip planner
    pub fn planner(&self) -> &LayerSkipPlanner {
        &self.planner
    }

    /// Size of one grid cell for `plan` and latents of `latent_dims`
    pub fn cell_size(&self, plan: &BatchPlan, latent_dims: (u32, u32)) -> (u32, u32) {
        let columns = plan.columns.max(1) as u32;
        let rows = plan.rows().max(1) as u32;
        let bound = (
            (self.settings.max_width() / columns).max(1),
            (self.settings.max_height() / rows).max(1),
        );
        let native = self.planner.descriptor().native_size(latent_dims, 0);
        fit_within(native, bound)
    }

    /// Run one preview step, timed by the session clock
    pub fn step(&self, session: &mut PreviewSession, batch: &LatentBatch) -> PreviewOutcome {
        let now = session.elapsed();
        self.step_at(session, batch, now)
    }

    /// Like [`step`](Self::step), but hands decode errors back to the caller
    pub fn try_step(
        &self,
        session: &mut PreviewSession,
        batch: &LatentBatch,
    ) -> Result<PreviewOutcome> {
        let now = session.elapsed();
        self.try_step_at(session, batch, now)
    }

    /// Run one preview step at `now` (offset from the session epoch).
    ///
    /// Never fails: per-cycle errors are logged and reported as
    /// [`PreviewOutcome::Failed`].
    pub fn step_at(
        &self,
        session: &mut PreviewSession,
        batch: &LatentBatch,
        now: Duration,
    ) -> PreviewOutcome {
        match self.try_step_at(session, batch, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Preview cycle failed, keeping previous preview");
                PreviewOutcome::Failed(e)
            }
        }
    }

    /// Like [`step_at`](Self::step_at), but hands decode errors back to the caller
    pub fn try_step_at(
        &self,
        session: &mut PreviewSession,
        batch: &LatentBatch,
        now: Duration,
    ) -> Result<PreviewOutcome> {
        session.stats_mut().invocations += 1;

        if !self.settings.enabled() {
            return Ok(PreviewOutcome::Disabled);
        }

        if let ThrottleDecision::Suppress { remaining } = session.throttle().check(now) {
            session.stats_mut().throttled += 1;
            debug!(remaining_ms = remaining.as_millis() as u64, "Preview throttled");
            return Ok(PreviewOutcome::Throttled);
        }

        let start = Instant::now();
        match self.render(session, batch) {
            Ok(Some(image)) => {
                session.throttle_mut().mark_emitted(now);
                let stats = session.stats_mut();
                stats.emitted += 1;
                stats.last_decode_time_ms = start.elapsed().as_millis() as u32;
                debug!(
                    width = image.width,
                    height = image.height,
                    decode_ms = stats.last_decode_time_ms,
                    "Emitted preview"
                );
                Ok(PreviewOutcome::Emitted(image))
            }
            Ok(None) => Ok(PreviewOutcome::Skipped),
            Err(PreviewError::Cancelled) => {
                debug!("Preview cycle cancelled");
                Ok(PreviewOutcome::Cancelled)
            }
            Err(e) => {
                session.stats_mut().failures += 1;
                Err(e)
            }
        }
    }

    /// Decode the selected items into a composite
    fn render(
        &self,
        session: &mut PreviewSession,
        batch: &LatentBatch,
    ) -> Result<Option<PreviewImage>> {
        if session.is_cancelled() {
            return Err(PreviewError::Cancelled);
        }

        let plan = self.sampler.plan(batch.len());
        let Some(latent_dims) = batch.dims().filter(|_| !plan.is_empty()) else {
            return Ok(None);
        };

        // Primary given up on for this session
        let mut use_fallback = !self.settings.oom_retry() && session.is_degraded();
        if use_fallback && self.settings.oom_fallback() == OomFallback::None {
            debug!("Primary decoder disabled after out-of-memory and no fallback configured");
            return Ok(None);
        }

        let cell = self.cell_size(&plan, latent_dims);
        let skip_layers = self
            .planner
            .plan(cell, latent_dims, self.settings.skip_upscale_layers());

        let mut composite = PreviewImage::blank(
            cell.0 * plan.columns as u32,
            cell.1 * plan.rows() as u32,
        );

        for (n, &index) in plan.selected_indices.iter().enumerate() {
            if session.is_cancelled() {
                return Err(PreviewError::Cancelled);
            }

            let latent = batch
                .get(index)
                .ok_or_else(|| PreviewError::Decode(format!("batch index {index} out of range")))?;

            let mut item = self.decode_item(session, latent, cell, skip_layers, &mut use_fallback)?;
            if item.dims() != cell {
                item = item.resize(cell.0, cell.1);
            }

            let (col, row) = plan.cell(n);
            composite.blit(&item, col as u32 * cell.0, row as u32 * cell.1);
        }

        Ok(Some(composite))
    }

    /// Decode one item, applying the out-of-memory policy
    fn decode_item(
        &self,
        session: &mut PreviewSession,
        latent: &Latent,
        target: (u32, u32),
        skip_layers: u32,
        use_fallback: &mut bool,
    ) -> Result<PreviewImage> {
        if *use_fallback {
            return self.run_fallback(session, latent, target);
        }

        let request = DecodeRequest {
            latent,
            target,
            skip_layers,
            device: self.settings.preview_device(),
            compile: self.settings.compile_previewer(),
        };

        match self.primary.decode(&request) {
            Ok(image) => Ok(image),
            Err(e) if e.is_out_of_memory() => {
                session.stats_mut().oom_events += 1;
                warn!(error = %e, "Preview decoder ran out of memory");

                if !self.settings.oom_retry() && !session.is_degraded() {
                    session.mark_degraded();
                    info!("Switching previews to fallback for the rest of this session");
                }

                match self.settings.oom_fallback() {
                    OomFallback::None => Err(e),
                    OomFallback::Latent2Rgb => {
                        *use_fallback = true;
                        self.run_fallback(session, latent, target)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    fn run_fallback(
        &self,
        session: &mut PreviewSession,
        latent: &Latent,
        target: (u32, u32),
    ) -> Result<PreviewImage> {
        session.stats_mut().fallback_decodes += 1;
        self.fallback.fallback_decode(latent, target)
    }
}
