use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential reconnect schedule with proportional jitter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f32,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl BackoffConfig {
    pub const fn signaling_default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter_ratio: 0.25,
            max_attempts: 5,
        }
    }

    pub fn allows(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u128 << attempt.min(31);
        let raw_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(factor)
            .min(self.max_delay.as_millis()) as u64;

        Duration::from_millis(raw_ms.saturating_add(jitter_millis(raw_ms, self.jitter_ratio)))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::signaling_default()
    }
}

fn jitter_millis(base_ms: u64, jitter_ratio: f32) -> u64 {
    let max_jitter = (base_ms as f32 * jitter_ratio.max(0.0)).round() as u64;
    if max_jitter == 0 {
        return 0;
    }

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);

    seed % (max_jitter + 1)
}
