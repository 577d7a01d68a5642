use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Limits applied to every request an [`crate::ApiClient`] sends.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub default_cooldown: Duration,
    /// Minimum spacing between requests to one endpoint, keyed by path
    /// (e.g. `/api/job/list`). Falls back to `default_cooldown`.
    pub cooldowns: HashMap<String, Duration>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            default_cooldown: Duration::ZERO,
            cooldowns: HashMap::new(),
        }
    }
}

impl GovernorConfig {
    pub fn with_cooldown(mut self, path: impl Into<String>, cooldown: Duration) -> Self {
        self.cooldowns.insert(path.into(), cooldown);
        self
    }

    pub fn cooldown_for(&self, path: &str) -> Duration {
        self.cooldowns
            .get(path)
            .copied()
            .unwrap_or(self.default_cooldown)
    }

    /// Upper bound of the wait before retry number `attempt` (0-based):
    /// `min(max_backoff, base_backoff * 2^attempt)`.
    pub fn backoff_cap(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Full jitter: uniform in `[0, backoff_cap(attempt)]`.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let cap = self.backoff_cap(attempt).as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }

    /// Longest `Retry-After` the client will honour.
    pub fn max_retry_after(&self) -> Duration {
        self.max_backoff.saturating_mul(4)
    }

    /// Wait before retry `attempt`: the server's hint clamped to
    /// [`Self::max_retry_after`], or jittered backoff without one.
    pub fn retry_delay(&self, hint: Option<Duration>, attempt: u32) -> Duration {
        match hint {
            Some(hint) => hint.min(self.max_retry_after()),
            None => self.jittered_backoff(attempt),
        }
    }
}

/// Parses a `Retry-After` header given in whole seconds. HTTP dates are not
/// honoured and fall back to computed backoff.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Tracks when each endpoint may next be hit.
#[derive(Debug, Default)]
pub struct Cooldowns {
    next_allowed: Mutex<HashMap<String, Instant>>,
}

impl Cooldowns {
    /// Reserves the next slot for `endpoint` and sleeps until it opens.
    /// Concurrent callers queue one `cooldown` apart.
    pub async fn wait_turn(&self, endpoint: &str, cooldown: Duration) {
        if cooldown.is_zero() {
            return;
        }
        let ready_at = {
            let mut slots = self.next_allowed.lock().await;
            let now = Instant::now();
            let ready_at = slots
                .get(endpoint)
                .copied()
                .filter(|at| *at > now)
                .unwrap_or(now);
            slots.insert(endpoint.to_string(), ready_at + cooldown);
            ready_at
        };
        tokio::time::sleep_until(ready_at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_backoff_cap_doubles_then_saturates() {
        let config = GovernorConfig::default();
        assert_eq!(config.backoff_cap(0), Duration::from_millis(500));
        assert_eq!(config.backoff_cap(1), Duration::from_secs(1));
        assert_eq!(config.backoff_cap(3), Duration::from_secs(4));
        assert_eq!(config.backoff_cap(5), Duration::from_secs(8));
        assert_eq!(config.backoff_cap(64), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let config = GovernorConfig::default();
        for attempt in 0..6 {
            assert!(config.jittered_backoff(attempt) <= config.backoff_cap(attempt));
        }
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_retry_after_hint_is_clamped() {
        let config = GovernorConfig::default();
        assert_eq!(
            config.retry_delay(Some(Duration::from_secs(2)), 0),
            Duration::from_secs(2)
        );
        assert_eq!(
            config.retry_delay(Some(Duration::from_secs(86_400)), 0),
            Duration::from_secs(32)
        );
        assert!(config.retry_delay(None, 1) <= config.backoff_cap(1));
    }

    #[test]
    fn test_cooldown_lookup() {
        let config = GovernorConfig::default().with_cooldown("/api/job/list", Duration::from_secs(2));
        assert_eq!(config.cooldown_for("/api/job/list"), Duration::from_secs(2));
        assert_eq!(config.cooldown_for("/api/jobs"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_spaces_requests() {
        let cooldowns = Cooldowns::default();
        let start = Instant::now();
        cooldowns.wait_turn("/a", Duration::from_secs(1)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        cooldowns.wait_turn("/a", Duration::from_secs(1)).await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        // Other endpoints are unaffected.
        let before = Instant::now();
        cooldowns.wait_turn("/b", Duration::from_secs(1)).await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
