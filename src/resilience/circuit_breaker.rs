//! # Rate-Limit Circuit Breaker
//!
//! Process-wide guard against the remote service's rate limiting. Every worker
//! consults the same instance before a remote call; a rate-limit response
//! opens a pause window that grows exponentially with consecutive failures.
//!
//! The breaker never fails a call. It only delays callers, cooperatively, so a
//! paused worker does not occupy the runtime.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::BreakerConfig;
use crate::logging::log_breaker_event;

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub remaining_pause: Duration,
}

impl CircuitBreakerState {
    pub fn is_paused(&self) -> bool {
        !self.remaining_pause.is_zero()
    }
}

#[derive(Debug, Default)]
struct BreakerInner {
    pause_until: Option<Instant>,
    consecutive_failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging
    name: String,
    base_delay: Duration,
    max_delay: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::with_delays(name, config.base_delay(), config.max_delay())
    }

    pub fn with_delays(name: impl Into<String>, base_delay: Duration, max_delay: Duration) -> Self {
        let name = name.into();
        info!(
            component = %name,
            base_delay_ms = base_delay.as_millis() as u64,
            max_delay_ms = max_delay.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );
        Self {
            name,
            base_delay,
            max_delay,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Block until any active pause window has elapsed; returns the time waited.
    ///
    /// Re-checks after each sleep, so a pause extended while waiting is honoured.
    pub async fn wait_if_needed(&self) -> Duration {
        let started = Instant::now();
        loop {
            let pause_until = self.inner.lock().pause_until;
            match pause_until {
                Some(until) if until > Instant::now() => {
                    debug!(
                        component = %self.name,
                        remaining_ms = (until - Instant::now()).as_millis() as u64,
                        "⏸️ Waiting for rate-limit pause"
                    );
                    tokio::time::sleep_until(until).await;
                }
                _ => break,
            }
        }
        started.elapsed()
    }

    /// Record a rate-limit response and extend the pause window.
    ///
    /// Returns the delay computed for this failure.
    pub fn trigger_rate_limit(&self) -> Duration {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let delay = self.delay_for(inner.consecutive_failures);
        let candidate = Instant::now() + delay;

        // pause_until is monotonic: a new trigger never shortens an active window
        inner.pause_until = Some(match inner.pause_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });

        log_breaker_event("rate_limited", inner.consecutive_failures, delay.as_millis());
        delay
    }

    /// Record `hits` rate-limit responses, one trigger each.
    pub fn record_rate_limits(&self, hits: u32) {
        for _ in 0..hits {
            self.trigger_rate_limit();
        }
    }

    /// Record a successful request; lowers the failure count by at most one.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.consecutive_failures > 0 {
            inner.consecutive_failures -= 1;
            debug!(
                component = %self.name,
                consecutive_failures = inner.consecutive_failures,
                "🟢 Rate-limit failure count lowered"
            );
        }
    }

    /// Backoff for the given failure count: `min(base * 2^(n-1), max)`
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(consecutive_failures - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn state(&self) -> CircuitBreakerState {
        let inner = self.inner.lock();
        let remaining_pause = inner
            .pause_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);
        CircuitBreakerState {
            consecutive_failures: inner.consecutive_failures,
            remaining_pause,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
