//! Circuit breaker for calls to one external dependency.
//!
//! # States
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls fail fast with `CIRCUIT_BREAKER_OPEN`
//! - Half-open: entered lazily by the first call after the cooldown; that
//!   call runs as a probe against a freshly reset breaker
//!
//! # State Transitions
//! ```text
//! Closed → Closed: success (failure count reset to 0)
//! Closed → Open:   failure_count >= threshold
//! Open → probe:    first call at/after next_attempt_time
//! probe → Closed:  probe succeeds, even if a call admitted before the
//!                  circuit opened failed meanwhile and reopened it
//! probe → Closed(1 failure) or Open: probe fails, counted like any closed failure
//! ```
//!
//! With `single_probe` enabled only one probe may be in flight; concurrent
//! callers keep getting `CIRCUIT_BREAKER_OPEN` until it completes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use stratus_core::IntegrationError;
use stratus_core::ports::Clock;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub threshold: u32,
    /// How long the circuit stays open before a probe is allowed.
    pub reset_timeout: Duration,
    /// Allow at most one probe at a time after the cooldown.
    pub single_probe: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout: Duration::from_secs(60),
            single_probe: true,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            threshold: std::env::var("CIRCUIT_BREAKER_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.threshold),
            reset_timeout: std::env::var("CIRCUIT_BREAKER_RESET_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.reset_timeout),
            single_probe: std::env::var("CIRCUIT_BREAKER_SINGLE_PROBE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(default.single_probe),
        }
    }
}

/// Externally visible circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    /// Open, but the cooldown has elapsed; the next call will probe.
    HalfOpen,
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct BreakerState {
    is_open: bool,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Three-state guard around one logical dependency.
///
/// Share one instance (via `Arc`) between every call site that talks to the
/// same dependency so they all observe the open state.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    reset_timeout: TimeDelta,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let reset_timeout = TimeDelta::from_std(config.reset_timeout).unwrap_or(TimeDelta::MAX);
        Self {
            name: name.into(),
            config: CircuitBreakerConfig {
                threshold: config.threshold.max(1),
                ..config
            },
            reset_timeout,
            clock,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` through the breaker.
    ///
    /// While open, `op` is not invoked and `CircuitOpen` is returned.
    /// Every error returned by `op` counts as a failure.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, IntegrationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, IntegrationError>>,
    {
        let permit = self.admit()?;

        let result = op().await;
        match &result {
            Ok(_) => self.record_success(permit.is_probe()),
            Err(err) => self.record_failure(err),
        }
        result
    }

    /// Force the breaker closed.
    pub fn reset(&self) {
        *self.lock() = BreakerState::default();
        tracing::info!(service = %self.name, "Circuit breaker manually reset");
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = self.clock.now();
        let state = self.lock();
        let circuit_state = match (state.is_open, state.next_attempt_time) {
            (true, Some(next)) if now >= next => CircuitState::HalfOpen,
            (true, _) => CircuitState::Open,
            (false, _) if state.probe_in_flight => CircuitState::HalfOpen,
            (false, _) => CircuitState::Closed,
        };

        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: circuit_state,
            failure_count: state.failure_count,
            last_failure_time: state.last_failure_time,
            next_attempt_time: state.next_attempt_time,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_error(&self, retry_at: DateTime<Utc>) -> IntegrationError {
        IntegrationError::CircuitOpen {
            service: self.name.clone(),
            retry_at,
        }
    }

    fn admit(&self) -> Result<ProbePermit<'_>, IntegrationError> {
        let now = self.clock.now();
        let mut state = self.lock();

        if state.is_open {
            let next_attempt = state.next_attempt_time.unwrap_or(now);
            if now < next_attempt {
                return Err(self.open_error(next_attempt));
            }

            // Cooldown elapsed: reset and let this call through as the probe.
            state.is_open = false;
            state.failure_count = 0;
            tracing::info!(service = %self.name, "Circuit breaker cooldown elapsed, probing");

            if self.config.single_probe {
                state.probe_in_flight = true;
                return Ok(ProbePermit {
                    breaker: Some(self),
                });
            }
        } else if state.probe_in_flight {
            let retry_at = state.next_attempt_time.unwrap_or(now);
            return Err(self.open_error(retry_at));
        }

        Ok(ProbePermit { breaker: None })
    }

    fn record_success(&self, probe: bool) {
        let mut state = self.lock();
        if state.failure_count > 0 || state.probe_in_flight {
            tracing::info!(service = %self.name, "Circuit breaker closed");
        }
        state.failure_count = 0;
        if probe {
            state.is_open = false;
        }
    }

    fn record_failure(&self, err: &IntegrationError) {
        let now = self.clock.now();
        let mut state = self.lock();

        state.failure_count += 1;
        state.last_failure_time = Some(now);

        if !state.is_open && state.failure_count >= self.config.threshold {
            state.is_open = true;
            state.next_attempt_time = Some(
                now.checked_add_signed(self.reset_timeout)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
            tracing::warn!(
                service = %self.name,
                failures = state.failure_count,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                error = %err,
                "Circuit breaker opened"
            );
        }
    }
}

/// Releases the single-probe gate when the probe completes or is dropped.
struct ProbePermit<'a> {
    breaker: Option<&'a CircuitBreaker>,
}

impl ProbePermit<'_> {
    fn is_probe(&self) -> bool {
        self.breaker.is_some()
    }
}

impl Drop for ProbePermit<'_> {
    fn drop(&mut self) {
        if let Some(breaker) = self.breaker {
            breaker.lock().probe_in_flight = false;
        }
    }
}

/// Breakers keyed by dependency name, created on first use.
///
/// Owned by the composition root and handed to integration clients so that
/// unrelated call sites to the same dependency share one breaker.
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// The breaker guarding `name`, created with the registry's configuration.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with(name, self.config.clone())
    }

    /// Like `get`, but uses `config` if the breaker does not exist yet.
    pub fn get_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config, self.clock.clone())))
            .clone()
    }

    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut snapshots: Vec<_> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
