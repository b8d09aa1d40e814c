//! In-memory sliding-window rate limiter for the token endpoint, keyed by
//! source IP.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_hits: usize,
    window: Duration,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_hits: usize, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Ten requests per fifteen minutes per source.
    pub fn token_endpoint() -> Self {
        Self::new(10, Duration::from_secs(15 * 60))
    }

    /// Records a hit for `key`. Err carries how long until the oldest hit in
    /// the window expires.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = hits.entry(key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);

        if entry.len() >= self.max_hits {
            let oldest = entry[0];
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }
        entry.push(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleventh_hit_is_limited() {
        let limiter = RateLimiter::new(10, Duration::from_secs(900));
        for _ in 0..10 {
            assert!(limiter.check("1.2.3.4").is_ok());
        }
        assert!(limiter.check("1.2.3.4").is_err());
        // a different source is unaffected
        assert!(limiter.check("5.6.7.8").is_ok());
    }

    #[test]
    fn hits_expire_with_the_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("a").is_ok());
    }
}
