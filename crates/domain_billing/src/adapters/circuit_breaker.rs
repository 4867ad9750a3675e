//! Circuit breaker shared by the HTTP adapters
//!
//! After `failure_threshold` consecutive transport failures the circuit
//! opens and calls fail fast with `ServiceUnavailable`. Once
//! `reset_timeout_secs` have passed, requests are let through again
//! (half-open); `success_threshold` successes close it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use core_kernel::{CircuitBreakerConfig, PortError};

#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    service: &'static str,
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    is_open: AtomicBool,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub(crate) fn new(service: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            service,
            config,
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            is_open: AtomicBool::new(false),
            opened_at: RwLock::new(None),
        }
    }

    pub(crate) async fn is_available(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return true;
        }

        let opened_at = self.opened_at.read().await;
        match *opened_at {
            Some(at) => at.elapsed() >= Duration::from_secs(self.config.reset_timeout_secs),
            None => true,
        }
    }

    /// Fails fast while the circuit is open
    pub(crate) async fn guard(&self) -> Result<(), PortError> {
        if self.is_available().await {
            Ok(())
        } else {
            Err(PortError::ServiceUnavailable {
                service: format!("{} (circuit open)", self.service),
            })
        }
    }

    pub(crate) fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        if !self.is_open.load(Ordering::Relaxed) {
            return;
        }
        let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= u64::from(self.config.success_threshold) {
            self.is_open.store(false, Ordering::Relaxed);
            self.success_count.store(0, Ordering::Relaxed);
            tracing::info!(service = self.service, "Circuit closed");
        }
    }

    pub(crate) async fn record_failure(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= u64::from(self.config.failure_threshold) {
            if !self.is_open.swap(true, Ordering::Relaxed) {
                tracing::warn!(service = self.service, failures, "Circuit opened");
            }
            *self.opened_at.write().await = Some(Instant::now());
        }
    }

    /// Records the result of a call; only transient errors count as failures
    pub(crate) async fn observe<T>(&self, result: &Result<T, PortError>) {
        match result {
            Ok(_) => self.record_success(),
            Err(e) if e.is_transient() => self.record_failure().await,
            Err(_) => self.record_success(),
        }
    }
}
