//! Token-bucket rate limiting for the manual trigger.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One token bucket.
///
/// The allowance replenishes continuously at `rate / per` tokens per
/// second, capped at `rate`; each accepted request costs one token.
/// Invariant: `0 <= allowance <= rate` across `request` calls.
#[derive(Debug, Clone)]
pub struct RateLimit {
    rate: f64,
    per: f64,
    allowance: f64,
    last_request: f64,
}

impl RateLimit {
    pub fn new(rate: f64, per: f64) -> Self {
        Self {
            rate,
            per,
            allowance: rate,
            last_request: 0.0,
        }
    }

    /// Try to take one token. Rejection costs nothing, but the replenish
    /// timestamp still advances.
    pub fn request(&mut self, now: f64) -> bool {
        let time_passed = now - self.last_request;
        self.last_request = now;
        self.allowance += time_passed * (self.rate / self.per);
        if self.allowance > self.rate {
            self.allowance = self.rate;
        }
        if self.allowance < 1.0 {
            false
        } else {
            self.allowance -= 1.0;
            true
        }
    }

    /// Return the token taken by an accepted request, for when a later
    /// gate rejected the action anyway.
    pub fn refund(&mut self) {
        self.allowance += 1.0;
    }

    #[cfg(test)]
    fn allowance(&self) -> f64 {
        self.allowance
    }
}

/// Lazily-keyed token buckets sharing one configuration.
///
/// The bot keeps two of these: one keyed by user id, one by room id.
pub struct RateLimiter {
    buckets: Mutex<HashMap<Arc<str>, RateLimit>>,
    rate: f64,
    per: f64,
}

impl RateLimiter {
    pub fn new(rate: f64, per: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate,
            per,
        }
    }

    /// Take one token from the bucket for `key`, creating a full bucket on
    /// first use.
    pub async fn request(&self, key: &Arc<str>, now: f64) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(key.clone())
            .or_insert_with(|| RateLimit::new(self.rate, self.per))
            .request(now)
    }

    /// Refund one token to an existing bucket.
    pub async fn refund(&self, key: &Arc<str>) {
        if let Some(bucket) = self.buckets.lock().await.get_mut(key) {
            bucket.refund();
        }
    }

    #[cfg(test)]
    pub async fn allowance(&self, key: &Arc<str>) -> Option<f64> {
        self.buckets.lock().await.get(key).map(RateLimit::allowance)
    }
}
