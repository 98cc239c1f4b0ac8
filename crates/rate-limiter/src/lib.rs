use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

/// Rate limiter configuration, env-overridable at bootstrap
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per user within one window
    pub max_requests: usize,
    /// Sliding window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let max_requests = std::env::var("RATE_LIMIT_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5usize);
        let window_secs = std::env::var("RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60u64);

        tracing::info!(
            "Rate limiter: max {} requests per {}s window",
            max_requests,
            window_secs
        );

        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Denied { retry_after: Duration },
}

/// Per-user sliding-window admission control.
///
/// Each user owns an ordered sequence of recent admission timestamps.
/// Purge, count and append happen under the DashMap entry lock, so two
/// concurrent checks for one user can never both observe "under quota".
pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    max_requests: usize,
    window: chrono::Duration,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: config.max_requests,
            window: chrono::Duration::from_std(config.window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        }
    }

    /// Admission check for one user. First request from an unknown user is
    /// always allowed.
    pub fn check(&self, user_id: &str) -> RateLimitDecision {
        self.check_at(user_id, Utc::now())
    }

    fn check_at(&self, user_id: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut entry = self.windows.entry(user_id.to_string()).or_default();
        let timestamps = entry.value_mut();

        let cutoff = now - self.window;
        while let Some(&front) = timestamps.front() {
            if front <= cutoff {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < self.max_requests {
            timestamps.push_back(now);
            return RateLimitDecision::Allowed;
        }

        // Oldest retained timestamp leaves the window first
        let oldest = *timestamps.front().expect("window is non-empty when full");
        let retry_after = (oldest + self.window - now)
            .to_std()
            .unwrap_or(Duration::ZERO);

        tracing::debug!(
            "Rate limit hit for user {}: {} in window, retry in {:.1}s",
            user_id,
            timestamps.len(),
            retry_after.as_secs_f64()
        );

        RateLimitDecision::Denied { retry_after }
    }

    /// Drop users whose entire window has gone stale. Called periodically
    /// by a background task.
    pub fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        self.windows
            .retain(|_, timestamps| timestamps.back().is_some_and(|&ts| ts > cutoff));
    }

    /// Current windows, for optional persistence across restarts.
    pub fn snapshot(&self) -> Vec<(String, Vec<DateTime<Utc>>)> {
        self.windows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().copied().collect()))
            .collect()
    }

    /// Restore windows saved by `snapshot`. Stale timestamps are purged on
    /// the next check for that user.
    pub fn hydrate(&self, windows: Vec<(String, Vec<DateTime<Utc>>)>) {
        for (user_id, timestamps) in windows {
            self.windows.insert(user_id, timestamps.into_iter().collect());
        }
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: usize, window_secs: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn admits_up_to_limit_then_denies() {
        let limiter = limiter(3, 60);
        let now = Utc::now();

        for _ in 0..3 {
            assert_eq!(limiter.check_at("u1", now), RateLimitDecision::Allowed);
        }
        assert!(matches!(
            limiter.check_at("u1", now),
            RateLimitDecision::Denied { .. }
        ));
    }

    #[test]
    fn denial_carries_time_until_oldest_exits_window() {
        let limiter = limiter(2, 60);
        let start = Utc::now();

        limiter.check_at("u1", start);
        limiter.check_at("u1", start + chrono::Duration::seconds(10));

        match limiter.check_at("u1", start + chrono::Duration::seconds(20)) {
            RateLimitDecision::Denied { retry_after } => {
                // Oldest was admitted at t=0 in a 60s window, so 40s remain
                assert_eq!(retry_after.as_secs(), 40);
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn stale_timestamps_are_purged_before_each_decision() {
        let limiter = limiter(2, 60);
        let start = Utc::now();

        limiter.check_at("u1", start);
        limiter.check_at("u1", start + chrono::Duration::seconds(1));

        // Both prior admissions have left the window
        let later = start + chrono::Duration::seconds(61);
        assert_eq!(limiter.check_at("u1", later), RateLimitDecision::Allowed);
    }

    #[test]
    fn at_most_limit_admissions_in_any_sliding_window() {
        let limiter = limiter(5, 60);
        let start = Utc::now();
        let mut admitted: Vec<DateTime<Utc>> = Vec::new();

        // One attempt every 7 seconds for 200 seconds
        for i in 0..30 {
            let now = start + chrono::Duration::seconds(i * 7);
            if limiter.check_at("u1", now) == RateLimitDecision::Allowed {
                admitted.push(now);
            }
        }

        for (i, &ts) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|&&t| t - ts < chrono::Duration::seconds(60))
                .count();
            assert!(in_window <= 5, "window starting at {} held {}", ts, in_window);
        }
    }

    #[test]
    fn users_are_limited_independently() {
        let limiter = limiter(1, 60);
        let now = Utc::now();

        assert_eq!(limiter.check_at("u1", now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at("u2", now), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check_at("u1", now),
            RateLimitDecision::Denied { .. }
        ));
    }

    #[test]
    fn cleanup_drops_fully_stale_users() {
        let limiter = limiter(5, 1);
        limiter.check_at("u1", Utc::now() - chrono::Duration::seconds(10));
        assert_eq!(limiter.tracked_users(), 1);
        limiter.cleanup();
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn hydrated_windows_keep_counting() {
        let limiter = limiter(2, 60);
        let now = Utc::now();
        limiter.hydrate(vec![("u1".to_string(), vec![now])]);

        assert_eq!(limiter.check_at("u1", now), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check_at("u1", now),
            RateLimitDecision::Denied { .. }
        ));
    }
}
