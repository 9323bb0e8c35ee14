use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-adapter outbound quota. `None` or `0` QPS means unthrottled.
#[derive(Clone, Default)]
pub struct Throttle {
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl Throttle {
    pub fn per_second(qps: Option<u32>) -> Self {
        let limiter = qps
            .and_then(NonZeroU32::new)
            .map(|qps| Arc::new(RateLimiter::direct(Quota::per_second(qps))));
        Self { limiter }
    }

    pub fn is_limited(&self) -> bool {
        self.limiter.is_some()
    }

    /// Waits until the quota allows one more call.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("limited", &self.is_limited())
            .finish()
    }
}
