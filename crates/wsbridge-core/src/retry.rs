//! Reconnect configuration and backoff calculation.
//!
//! Sync-only building blocks; the relay crate draws the randomness and does
//! the sleeping.
//!
//! - [`RetryConfig`]: attempt budget, backoff bounds, jitter
//! - [`calculate_backoff_delay_with_random`]: exponential backoff with jitter

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default reconnect attempts after a disconnect.
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for reconnecting after the upstream goes away.
///
/// The first attempt is made immediately. Attempt `n` (1-based, `n > 1`)
/// waits `base_delay_ms * 2^(n-2)` capped at `max_delay_ms`, with jitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of reconnect attempts (default: 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Delay before the given zero-based attempt. Attempt 0 never waits.
    ///
    /// `random` should be a value in `[0.0, 1.0)` from a PRNG.
    #[must_use]
    pub fn delay_before(&self, attempt: u32, random: f64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(calculate_backoff_delay_with_random(
            attempt - 1,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate exponential backoff delay with explicit randomness.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random * 2 - 1) * jitter)`
///
/// A jitter factor of 0.2 varies the delay by ±20%.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // Maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- RetryConfig --

    #[test]
    fn retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_config_serde_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{"maxRetries": 4}"#).unwrap();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn first_attempt_is_immediate() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_before(0, 0.9), Duration::ZERO);
    }

    #[test]
    fn later_attempts_back_off() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };
        assert_eq!(config.delay_before(1, 0.5), Duration::from_millis(100));
        assert_eq!(config.delay_before(2, 0.5), Duration::from_millis(200));
        assert_eq!(config.delay_before(3, 0.5), Duration::from_millis(400));
        assert_eq!(config.delay_before(10, 0.5), Duration::from_millis(1000));
    }

    // -- calculate_backoff_delay_with_random --

    #[test]
    fn backoff_with_random_zero() {
        // random = 0.0 → jitter = 1 - 0.2 = 0.8
        let delay = calculate_backoff_delay_with_random(0, 1000, 60_000, 0.2, 0.0);
        assert_eq!(delay, 800);
    }

    #[test]
    fn backoff_with_random_half() {
        let delay = calculate_backoff_delay_with_random(0, 1000, 60_000, 0.2, 0.5);
        assert_eq!(delay, 1000);
    }

    #[test]
    fn backoff_with_random_capped() {
        let delay = calculate_backoff_delay_with_random(20, 1000, 60_000, 0.2, 0.5);
        assert_eq!(delay, 60_000);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        let delay = calculate_backoff_delay_with_random(100, 1000, 60_000, 0.2, 1.0);
        assert!(delay <= 72_000);
    }
}
