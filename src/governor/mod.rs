//! RPC access governor
//!
//! Persisted rate limiter plus circuit breaker shared by every upstream
//! RPC call. The counter resets exactly once per rolling window; a tripped
//! breaker rejects unconditionally until its cooldown expires. When the
//! durable store is unreachable the governor keeps counting in-process and
//! flags every decision as degraded.

pub mod store;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::GovernorConfig;
use crate::error::Result;

pub use store::{FileStateStore, MemoryStateStore, RateLimitState, RateLimitStore, UsageRecord};

/// Outcome of a single `check_and_reserve` call
#[derive(Debug, Clone)]
pub struct GovernorDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    /// True when the decision was made against the in-process fallback
    /// counter because the durable store failed
    pub degraded: bool,
}

struct GovernorInner {
    /// In-process copy, authoritative while the store is unreachable
    fallback: RateLimitState,
    degraded: bool,
}

/// Shared rate limiter + circuit breaker
pub struct RpcGovernor {
    config: GovernorConfig,
    store: Arc<dyn RateLimitStore>,
    inner: Mutex<GovernorInner>,
}

impl RpcGovernor {
    pub fn new(config: GovernorConfig, store: Arc<dyn RateLimitStore>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            config,
            store,
            inner: Mutex::new(GovernorInner {
                fallback: RateLimitState::fresh(now),
                degraded: false,
            }),
        }
    }

    /// Atomically reserve one upstream call.
    ///
    /// The read-modify-write runs under one lock so concurrent trades in
    /// this process serialize here; cross-process safety relies on the
    /// store's last-writer-wins upsert, which is acceptable at 60s window
    /// granularity.
    pub async fn check_and_reserve(&self) -> Result<GovernorDecision> {
        let now = chrono::Utc::now().timestamp();
        let mut inner = self.inner.lock().await;

        let (mut state, mut degraded) = match self.store.load().await {
            Ok(Some(state)) => (state, false),
            Ok(None) => (RateLimitState::fresh(now), false),
            Err(e) => {
                warn!("rate-limit store unreachable, using in-process fallback: {}", e);
                (inner.fallback.clone(), true)
            }
        };

        // Breaker first: it rejects regardless of counter state
        if state.circuit_breaker_active {
            if now < state.circuit_breaker_until {
                let decision = GovernorDecision {
                    allowed: false,
                    reason: Some("circuit_breaker".to_string()),
                    degraded,
                };
                self.finish(&mut inner, state, degraded, &decision).await;
                return Ok(decision);
            }
            state.circuit_breaker_active = false;
            state.circuit_breaker_until = 0;
            debug!("circuit breaker cooldown elapsed, resuming calls");
        }

        // Roll the window over exactly once when it ages out
        if now - state.window_start >= self.config.window_secs as i64 {
            state.window_start = now;
            state.call_count = 0;
        }

        let decision = if state.call_count >= self.config.max_calls_per_window {
            GovernorDecision {
                allowed: false,
                reason: Some("rate_limit".to_string()),
                degraded,
            }
        } else {
            state.call_count += 1;
            GovernorDecision {
                allowed: true,
                reason: None,
                degraded,
            }
        };

        if !degraded {
            if let Err(e) = self.store.save(&state).await {
                warn!("failed to persist rate-limit state: {}", e);
                degraded = true;
            }
        }

        self.finish(&mut inner, state, degraded, &decision).await;

        Ok(GovernorDecision {
            degraded,
            ..decision
        })
    }

    /// Trip the circuit breaker. Invoked by any caller observing an
    /// upstream 429; all calls are rejected for the configured cooldown.
    pub async fn trip_breaker(&self) {
        let now = chrono::Utc::now().timestamp();
        let mut inner = self.inner.lock().await;

        let mut state = match self.store.load().await {
            Ok(Some(state)) => state,
            _ => inner.fallback.clone(),
        };

        state.circuit_breaker_active = true;
        state.circuit_breaker_until = now + self.config.breaker_cooldown_secs as i64;

        warn!(
            until = state.circuit_breaker_until,
            "circuit breaker tripped after upstream 429"
        );

        if let Err(e) = self.store.save(&state).await {
            warn!("failed to persist tripped breaker: {}", e);
            inner.degraded = true;
        }
        inner.fallback = state;
    }

    /// Persist a usage sample off the critical path. Spawned; never blocks
    /// or fails the caller.
    pub fn record_outcome(&self, decision: &GovernorDecision, call_count: u32) {
        let store = Arc::clone(&self.store);
        let record = UsageRecord {
            at: chrono::Utc::now(),
            allowed: decision.allowed,
            reason: decision.reason.clone(),
            call_count,
            degraded: decision.degraded,
        };

        tokio::spawn(async move {
            if let Err(e) = store.append_usage(&record).await {
                debug!("usage telemetry write failed (ignored): {}", e);
            }
        });
    }

    /// Current call count, primarily for telemetry
    pub async fn current_count(&self) -> u32 {
        self.inner.lock().await.fallback.call_count
    }

    async fn finish(
        &self,
        inner: &mut GovernorInner,
        state: RateLimitState,
        degraded: bool,
        decision: &GovernorDecision,
    ) {
        inner.fallback = state;
        inner.degraded = degraded;
        self.record_outcome(decision, inner.fallback.call_count);
    }
}
