//! Per-API request rate limiting.
//!
//! Three tiers: requests-per-minute is a token bucket whose `wait` blocks
//! until a token refills; requests-per-hour and requests-per-day are fixed
//! windows that reject immediately once exhausted, since blocking for up to
//! a day would never be useful to a caller.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::errors::GatewayError;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTier {
    Rpm,
    Rph,
    Rpd,
}

impl fmt::Display for RateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rpm => "rpm",
            Self::Rph => "rph",
            Self::Rpd => "rpd",
        })
    }
}

pub struct RateLimiter {
    rpm: u32,
    rph: u32,
    rpd: u32,
    inner: Mutex<Inner>,
}

struct Inner {
    tokens: f64,
    last_refill: Instant,
    hour: Window,
    day: Window,
}

struct Window {
    count: u32,
    started: Instant,
}

impl RateLimiter {
    /// A tier with limit 0 is disabled.
    pub fn new(rpm: u32, rph: u32, rpd: u32) -> Self {
        let now = Instant::now();
        Self {
            rpm,
            rph,
            rpd,
            inner: Mutex::new(Inner {
                tokens: rpm as f64,
                last_refill: now,
                hour: Window { count: 0, started: now },
                day: Window { count: 0, started: now },
            }),
        }
    }

    /// Acquire permission for one request.
    ///
    /// Blocks while the minute bucket refills; returns
    /// [`GatewayError::RateLimited`] immediately when an hour or day window
    /// is exhausted. Callers bound the blocking with their request deadline.
    pub async fn wait(&self) -> Result<(), GatewayError> {
        loop {
            let sleep_for = {
                let now = Instant::now();
                let mut inner = self.inner.lock();

                if self.rpm > 0 {
                    let elapsed = now.duration_since(inner.last_refill).as_secs_f64();
                    inner.tokens =
                        (inner.tokens + elapsed * self.rpm as f64 / 60.0).min(self.rpm as f64);
                    inner.last_refill = now;
                }

                if self.rph > 0 {
                    if now.duration_since(inner.hour.started) >= HOUR {
                        inner.hour = Window { count: 0, started: now };
                    }
                    if inner.hour.count >= self.rph {
                        let retry_after =
                            HOUR.saturating_sub(now.duration_since(inner.hour.started));
                        return Err(GatewayError::RateLimited {
                            tier: RateTier::Rph,
                            retry_after,
                        });
                    }
                }

                if self.rpd > 0 {
                    if now.duration_since(inner.day.started) >= DAY {
                        inner.day = Window { count: 0, started: now };
                    }
                    if inner.day.count >= self.rpd {
                        let retry_after =
                            DAY.saturating_sub(now.duration_since(inner.day.started));
                        return Err(GatewayError::RateLimited {
                            tier: RateTier::Rpd,
                            retry_after,
                        });
                    }
                }

                if self.rpm == 0 || inner.tokens >= 1.0 {
                    if self.rpm > 0 {
                        inner.tokens -= 1.0;
                    }
                    if self.rph > 0 {
                        inner.hour.count += 1;
                    }
                    if self.rpd > 0 {
                        inner.day.count += 1;
                    }
                    return Ok(());
                }

                Duration::from_secs_f64((1.0 - inner.tokens) * 60.0 / self.rpm as f64)
            };
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rpm_allows_burst_then_blocks() {
        let limiter = RateLimiter::new(5, 0, 0);
        for _ in 0..5 {
            limiter.wait().await.unwrap();
        }
        // The bucket is empty; a short deadline elapses before a refill.
        let blocked =
            tokio::time::timeout(Duration::from_millis(10), limiter.wait()).await;
        assert!(blocked.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rpm_refills_over_time() {
        let limiter = RateLimiter::new(5, 0, 0);
        for _ in 0..5 {
            limiter.wait().await.unwrap();
        }
        // One token refills every 12 seconds at rpm=5.
        let allowed =
            tokio::time::timeout(Duration::from_secs(13), limiter.wait()).await;
        assert!(matches!(allowed, Ok(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn rph_rejects_immediately_when_exhausted() {
        let limiter = RateLimiter::new(0, 3, 0);
        for _ in 0..3 {
            limiter.wait().await.unwrap();
        }
        let start = Instant::now();
        let result = limiter.wait().await;
        // No blocking: the rejection is immediate even on paused time.
        assert!(start.elapsed() < Duration::from_millis(100));
        match result {
            Err(GatewayError::RateLimited { tier, retry_after }) => {
                assert_eq!(tier, RateTier::Rph);
                assert!(retry_after <= HOUR);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rph_window_resets() {
        let limiter = RateLimiter::new(0, 2, 0);
        limiter.wait().await.unwrap();
        limiter.wait().await.unwrap();
        assert!(limiter.wait().await.is_err());
        tokio::time::advance(HOUR + Duration::from_secs(1)).await;
        assert!(limiter.wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn rpd_tier_is_reported() {
        let limiter = RateLimiter::new(0, 0, 1);
        limiter.wait().await.unwrap();
        match limiter.wait().await {
            Err(GatewayError::RateLimited { tier, .. }) => assert_eq!(tier, RateTier::Rpd),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_limiter_never_blocks() {
        let limiter = RateLimiter::new(0, 0, 0);
        for _ in 0..100 {
            limiter.wait().await.unwrap();
        }
    }
}
