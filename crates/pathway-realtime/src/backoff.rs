//! Reconnect delay calculation.

use std::time::Duration;

use pathway_settings::RealtimeSettings;
use rand::Rng;

/// Delay before reconnect attempt `attempt` (zero-based).
///
/// `min(max_delay, base_delay * 2^attempt)`, then varied by ±`jitter_factor`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn reconnect_delay(attempt: u32, settings: &RealtimeSettings) -> Duration {
    let base = settings.reconnect_base_delay_ms as f64;
    let exp = base * 2.0_f64.powi(attempt.min(30) as i32);
    let capped = exp.min(settings.reconnect_max_delay_ms as f64);

    let jitter_range = capped * settings.jitter_factor.clamp(0.0, 1.0);
    let jitter = if jitter_range > 0.0 {
        rand::rng().random_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    Duration::from_millis((capped + jitter).max(0.0) as u64)
}
