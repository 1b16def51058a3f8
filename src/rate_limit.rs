use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Sliding-window limit on image synthesis calls, keyed by owner.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_day(limit: u32) -> Self {
        Self::new(limit, DAY)
    }

    /// Records a hit for `owner_id`, or returns how long until one is allowed.
    pub async fn check(&self, owner_id: &str) -> Result<(), Duration> {
        self.check_at(owner_id, Instant::now()).await
    }

    async fn check_at(&self, owner_id: &str, now: Instant) -> Result<(), Duration> {
        let mut hits = self.hits.lock().await;
        // owners whose newest hit has aged out carry no state
        hits.retain(|_, window| window.back().is_some_and(|last| now.duration_since(*last) < self.window));
        let window = hits.entry(owner_id.to_string()).or_default();

        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.limit {
            let retry_after = window
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            tracing::warn!(owner_id, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            if window.is_empty() {
                hits.remove(owner_id);
            }
            return Err(retry_after);
        }

        window.push_back(now);
        Ok(())
    }

    #[cfg(test)]
    async fn tracked_owners(&self) -> usize {
        self.hits.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("u1", now).await.is_ok());
        }
        let retry = limiter.check_at("u1", now + Duration::from_secs(10)).await.unwrap_err();
        assert_eq!(retry, Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_owners_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at("u1", now).await.is_ok());
        assert!(limiter.check_at("u1", now).await.is_err());
        assert!(limiter.check_at("u2", now).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("u1", start).await.is_ok());
        assert!(limiter.check_at("u1", start + Duration::from_secs(30)).await.is_ok());
        assert!(limiter.check_at("u1", start + Duration::from_secs(59)).await.is_err());
        // first hit has aged out
        assert!(limiter.check_at("u1", start + Duration::from_secs(60)).await.is_ok());
        assert!(limiter.check_at("u1", start + Duration::from_secs(61)).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_limit_rejects() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        assert_eq!(limiter.check("u1").await.unwrap_err(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_idle_owners_are_forgotten() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("u1", start).await.is_ok());
        assert!(limiter.check_at("u2", start + Duration::from_secs(30)).await.is_ok());
        assert_eq!(limiter.tracked_owners().await, 2);

        assert!(limiter.check_at("u3", start + Duration::from_secs(90)).await.is_ok());
        assert_eq!(limiter.tracked_owners().await, 1);
    }

    #[tokio::test]
    async fn test_zero_limit_keeps_no_state() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        assert!(limiter.check("u1").await.is_err());
        assert_eq!(limiter.tracked_owners().await, 0);
    }
}
