//! Per-API circuit breaker.
//!
//! Closed → Open after `failure_threshold` consecutive failures; Open →
//! HalfOpen once the cooldown elapses, admitting exactly one probe. A
//! successful probe closes the circuit and resets the counters; a failed
//! probe re-opens it with a fresh cooldown. Concurrent callers during the
//! probe are rejected with a fresh cooldown rather than queued.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::errors::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    api: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_fails: u32,
    total_failures: u64,
    total_successes: u64,
    last_failure: Option<String>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// A point-in-time copy of the breaker state for admin reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerSnapshot {
    pub api: String,
    pub state: &'static str,
    pub consecutive_fails: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub last_failure: Option<String>,
}

impl CircuitBreaker {
    pub fn new(api: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            api: api.into(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_fails: 0,
                total_failures: 0,
                total_successes: 0,
                last_failure: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Ask permission to issue a request.
    pub fn allow(&self) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(self.open_error(&inner, self.cooldown.saturating_sub(elapsed)))
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    // A probe is already out; restart the cooldown so the
                    // herd backs off.
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    Err(self.open_error(&inner, self.cooldown))
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;
        inner.consecutive_fails = 0;
        inner.probe_in_flight = false;
        if inner.state != BreakerState::Closed {
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.last_failure = None;
        }
    }

    pub fn record_failure(&self, error: &str) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.consecutive_fails += 1;
        inner.last_failure = Some(error.to_string());
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            BreakerState::Closed if inner.consecutive_fails >= self.failure_threshold => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            api: self.api.clone(),
            state: match inner.state {
                BreakerState::Closed => "closed",
                BreakerState::Open => "open",
                BreakerState::HalfOpen => "half_open",
            },
            consecutive_fails: inner.consecutive_fails,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            last_failure: inner.last_failure.clone(),
        }
    }

    fn open_error(&self, inner: &Inner, retry_in: Duration) -> GatewayError {
        GatewayError::CircuitOpen {
            api: self.api.clone(),
            retry_in,
            last_error: inner.last_failure.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(60);

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("billing", 3, COOLDOWN)
    }

    #[tokio::test(start_paused = true)]
    async fn trips_after_threshold_consecutive_failures() {
        let breaker = breaker();
        breaker.allow().unwrap();
        breaker.record_failure("boom");
        breaker.allow().unwrap();
        breaker.record_failure("boom");
        assert!(breaker.allow().is_ok());
        breaker.record_failure("boom");

        match breaker.allow() {
            Err(GatewayError::CircuitOpen { retry_in, last_error, .. }) => {
                assert!(retry_in <= COOLDOWN);
                assert_eq!(last_error.as_deref(), Some("boom"));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_probe_closes_the_circuit() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure("boom");
        }
        assert!(breaker.allow().is_err());

        tokio::time::advance(COOLDOWN + Duration::from_secs(1)).await;
        // First caller after cooldown is the probe.
        breaker.allow().unwrap();
        breaker.record_success();

        assert!(breaker.allow().is_ok());
        assert_eq!(breaker.snapshot().state, "closed");
        assert_eq!(breaker.snapshot().consecutive_fails, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_with_fresh_cooldown() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure("boom");
        }
        tokio::time::advance(COOLDOWN + Duration::from_secs(1)).await;
        breaker.allow().unwrap();
        breaker.record_failure("still down");

        match breaker.allow() {
            Err(GatewayError::CircuitOpen { retry_in, .. }) => {
                assert!(retry_in > COOLDOWN - Duration::from_secs(2));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_rejected_during_probe() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure("boom");
        }
        tokio::time::advance(COOLDOWN + Duration::from_secs(1)).await;
        breaker.allow().unwrap();
        // Second caller while the probe is in flight: rejected, cooldown
        // restarted.
        assert!(breaker.allow().is_err());
        assert_eq!(breaker.snapshot().state, "open");
    }

    #[tokio::test(start_paused = true)]
    async fn success_interrupts_failure_streak() {
        let breaker = breaker();
        breaker.record_failure("a");
        breaker.record_failure("b");
        breaker.record_success();
        breaker.record_failure("c");
        breaker.record_failure("d");
        assert!(breaker.allow().is_ok());
    }
}
