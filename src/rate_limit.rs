//! Per-IP token-bucket rate limiting, mirroring
//! `middleware/rate_limit.py`'s in-memory `_Bucket` map: continuous refill,
//! 429 + `Retry-After` on exhaustion.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::error::VigilError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window_seconds: u64) -> Self {
        let window = window_seconds.max(1) as f64;
        RateLimiter {
            capacity: capacity as f64,
            refill_per_sec: capacity as f64 / window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Ok(())` if a token was available and consumed, or
    /// `Err(retry_after_secs)` when the bucket is empty.
    fn try_acquire(&self, ip: IpAddr) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            let deficit = 1.0 - bucket.tokens;
            let retry_after = (deficit / self.refill_per_sec).ceil() as u64;
            return Err(retry_after.max(1));
        }
        bucket.tokens -= 1.0;
        Ok(())
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<std::sync::Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, VigilError> {
    match limiter.try_acquire(addr.ip()) {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after_secs) => Err(VigilError::RateLimited { retry_after_secs }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_after_capacity_exhausted() {
        let limiter = RateLimiter::new(2, 60);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.try_acquire(ip).is_ok());
        assert!(limiter.try_acquire(ip).is_ok());
        assert!(limiter.try_acquire(ip).is_err());
    }

    #[test]
    fn separate_ips_have_separate_buckets() {
        let limiter = RateLimiter::new(1, 60);
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.try_acquire(a).is_ok());
        assert!(limiter.try_acquire(b).is_ok());
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(1, 60);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.try_acquire(ip).is_ok());
        assert!(limiter.try_acquire(ip).is_err());
        {
            let mut buckets = limiter.buckets.lock().unwrap();
            let bucket = buckets.get_mut(&ip).unwrap();
            bucket.last_refill -= Duration::from_secs(120);
        }
        assert!(limiter.try_acquire(ip).is_ok());
    }
}
