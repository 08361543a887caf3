//! Per-generation preview state
//!
//! Everything that changes between preview cycles lives here rather than in
//! process-wide globals: the throttle gate, the sticky out-of-memory flag,
//! the cancel flag and counters. Each generation run (or each stream, when
//! several run side by side) owns its own session.

use crate::{Settings, ThrottleGate};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters for one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewStats {
    /// Preview steps requested
    pub invocations: u64,
    /// Composites produced
    pub emitted: u64,
    /// Steps skipped by the throttle
    pub throttled: u64,
    /// Items decoded by the fallback primitive
    pub fallback_decodes: u64,
    /// Out-of-memory failures from the primary primitive
    pub oom_events: u64,
    /// Cycles that ended without a preview because of an error
    pub failures: u64,
    /// Wall time of the last emitted cycle
    pub last_decode_time_ms: u32,
}

impl PreviewStats {
    /// Fraction of steps that produced a preview
    pub fn emit_rate(&self) -> f32 {
        if self.invocations == 0 {
            0.0
        } else {
            self.emitted as f32 / self.invocations as f32
        }
    }
}

/// Interrupts an in-flight preview cycle from anywhere
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Mutable preview state for one generation run
#[derive(Debug)]
pub struct PreviewSession {
    epoch: Instant,
    throttle: ThrottleGate,
    degraded: bool,
    cancelled: Arc<AtomicBool>,
    stats: PreviewStats,
}

impl PreviewSession {
    /// Start a session using the configured throttle interval
    pub fn new(settings: &Settings) -> Self {
        Self::with_throttle(settings.throttle())
    }

    /// Start a session with an explicit throttle interval
    pub fn with_throttle(interval: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            throttle: ThrottleGate::new(interval),
            degraded: false,
            cancelled: Arc::new(AtomicBool::new(false)),
            stats: PreviewStats::default(),
        }
    }

    /// Time since the session started
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Throttle gate
    pub fn throttle(&self) -> &ThrottleGate {
        &self.throttle
    }

    pub(crate) fn throttle_mut(&mut self) -> &mut ThrottleGate {
        &mut self.throttle
    }

    /// Whether the primary decoder has been given up on
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub(crate) fn mark_degraded(&mut self) {
        self.degraded = true;
    }

    /// Cancel the current cycle
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Handle for cancelling from another thread or callback
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so later steps preview again
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Session counters
    pub fn stats(&self) -> &PreviewStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut PreviewStats {
        &mut self.stats
    }
}
