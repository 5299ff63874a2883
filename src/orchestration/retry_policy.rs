//! Retry decisions per step kind.
//!
//! Only Gate, Download, Upload and Register are retried, and only for
//! transient errors. Convert and Cleanup always get a single attempt no matter
//! what the configuration says.

use crate::config::{RetryConfig, StepRetryConfig};
use crate::error::{ErrorCategory, StepError};
use crate::state_machine::StepKind;
use std::time::Duration;

/// Why no further attempt will be made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The error category is not retryable, or the step never retries
    NotRetryable,
    AttemptsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    fn settings(&self, kind: StepKind) -> Option<&StepRetryConfig> {
        self.config.for_step(kind)
    }

    /// Total attempts a step may make, first attempt included
    pub fn max_attempts(&self, kind: StepKind) -> u32 {
        self.settings(kind)
            .map(|settings| settings.max_attempts.max(1))
            .unwrap_or(1)
    }

    /// Decide what happens after `attempt` (1-based) failed with `error`
    pub fn decide(&self, kind: StepKind, error: &StepError, attempt: u32) -> RetryDecision {
        if error.category() != ErrorCategory::Transient || self.settings(kind).is_none() {
            return RetryDecision::GiveUp(GiveUpReason::NotRetryable);
        }
        if attempt >= self.max_attempts(kind) {
            return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted);
        }
        RetryDecision::RetryAfter(self.backoff_delay(kind, attempt))
    }

    /// Exponential backoff for the attempt that just failed, jittered and capped
    pub fn backoff_delay(&self, kind: StepKind, attempt: u32) -> Duration {
        let Some(settings) = self.settings(kind) else {
            return Duration::ZERO;
        };

        let base = Duration::from_millis(settings.base_delay_ms);
        let max = Duration::from_millis(settings.max_delay_ms);
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = settings.backoff_multiplier.powi(exponent);

        // Duration::mul_f64 panics on overflow, so cap before multiplying
        let delay = if !factor.is_finite() || base.as_secs_f64() * factor >= max.as_secs_f64() {
            max
        } else {
            base.mul_f64(factor)
        };

        let jittered = if settings.jitter_enabled && settings.max_jitter > 0.0 {
            let jitter = fastrand::f64() * settings.max_jitter;
            delay.mul_f64(1.0 + jitter)
        } else {
            delay
        };

        jittered.min(max)
    }
}
