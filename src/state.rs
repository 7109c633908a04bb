//! # Application State Management
//!
//! Shared state reachable from every request handler: the runtime
//! configuration, the call registry, and coarse service metrics.
//!
//! Config and metrics sit behind `Arc<RwLock<_>>` so many handlers can
//! read concurrently while updates stay exclusive. The registry carries
//! its own interior locking, so it is shared as a plain `Arc`.

use crate::call::CallRegistry;
use crate::config::AppConfig;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state, cloned into every worker.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// Live call sessions, keyed by call id
    pub registry: Arc<CallRegistry>,

    /// Service metrics, updated by middleware and the relay
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (for uptime reporting)
    pub start_time: Instant,
}

/// Coarse service metrics.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total HTTP requests processed since startup
    pub request_count: u64,

    /// Total failed requests since startup
    pub error_count: u64,

    /// Currently connected media-stream calls
    pub active_calls: u32,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            registry: Arc::new(CallRegistry::new()),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration. Cloning releases the
    /// read lock immediately.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().unwrap().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().unwrap().error_count += 1;
    }

    pub fn increment_active_calls(&self) {
        self.metrics.write().unwrap().active_calls += 1;
    }

    /// Decrement the active-call counter, guarding against underflow if
    /// teardown runs twice for one connection.
    pub fn decrement_active_calls(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_calls > 0 {
            metrics.active_calls -= 1;
        }
    }

    /// Consistent snapshot of current metrics for the status endpoint.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState::new(AppConfig::default())
    }

    #[test]
    fn test_counters() {
        let state = test_state();
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_active_calls_never_underflow() {
        let state = test_state();
        state.decrement_active_calls();
        assert_eq!(state.get_metrics_snapshot().active_calls, 0);

        state.increment_active_calls();
        state.decrement_active_calls();
        state.decrement_active_calls();
        assert_eq!(state.get_metrics_snapshot().active_calls, 0);
    }
}
