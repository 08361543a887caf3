//! Preview rate limiting

use std::time::Duration;

/// Outcome of a throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Emit a preview this cycle
    Allow,
    /// Skip this cycle, keep showing the previous preview
    Suppress {
        /// Time until the gate opens again
        remaining: Duration,
    },
}

impl ThrottleDecision {
    /// Whether emission is allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allow)
    }
}

/// Allows at most one preview per interval
///
/// Timestamps are offsets from the owning session's epoch. Before the first
/// emission the last emit time is treated as negative infinity, so the first
/// check always passes.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    interval: Duration,
    last_emit: Option<Duration>,
}

impl ThrottleGate {
    /// Create a gate; a zero interval disables throttling
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Check without recording anything
    pub fn check(&self, now: Duration) -> ThrottleDecision {
        if self.interval.is_zero() {
            return ThrottleDecision::Allow;
        }
        match self.last_emit {
            None => ThrottleDecision::Allow,
            Some(last) => {
                let elapsed = now.saturating_sub(last);
                if elapsed >= self.interval {
                    ThrottleDecision::Allow
                } else {
                    ThrottleDecision::Suppress {
                        remaining: self.interval - elapsed,
                    }
                }
            }
        }
    }

    /// Whether a preview may be emitted at `now`
    pub fn ready(&self, now: Duration) -> bool {
        self.check(now).is_allowed()
    }

    /// Record an emission at `now`
    pub fn mark_emitted(&mut self, now: Duration) {
        self.last_emit = Some(now);
    }

    /// Check and, if allowed, record an emission at `now`
    pub fn try_acquire(&mut self, now: Duration) -> bool {
        let allowed = self.ready(now);
        if allowed {
            self.mark_emitted(now);
        }
        allowed
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time of the last recorded emission
    pub fn last_emit(&self) -> Option<Duration> {
        self.last_emit
    }
}
