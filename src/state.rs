//! # Application State Management
//!
//! Shared state accessed by every HTTP request handler and the WebSocket
//! route: the runtime-updatable configuration, process-level request
//! metrics, the session registry, and the server start time.
//!
//! ## Thread Safety:
//! All mutable data sits behind `Arc<RwLock<..>>`: many readers or one
//! writer. The session registry does its own locking and is touched only at
//! session create/remove and by observability reads, never on the audio hot
//! path.

use crate::config::AppConfig;
use crate::session::registry::SessionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Process-level request metrics
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Live voice sessions keyed by session id
    pub registry: Arc<SessionRegistry>,

    /// When the server started
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP traffic.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Current number of active voice sessions
    pub active_sessions: u32,

    /// Detailed metrics per API endpoint, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            config.performance.max_concurrent_sessions,
        ));
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            registry,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately; `AppConfig` is cheap to
    /// clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Increment the active sessions gauge (a voice session was created).
    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    /// Decrement the active sessions gauge (a voice session ended).
    ///
    /// Guarded against underflow so teardown paths that run twice cannot
    /// wrap the counter.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Get a consistent snapshot of current metrics for the /metrics endpoint.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let state = AppState::new(AppConfig::default());
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_session_gauge_never_underflows() {
        let state = AppState::new(AppConfig::default());
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);

        state.increment_active_sessions();
        state.decrement_active_sessions();
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.error_count, 1);
        assert!((metric.average_duration_ms() - 20.0).abs() < f64::EPSILON);
        assert!((metric.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_registry_capacity_follows_config() {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = 3;
        let state = AppState::new(config);
        assert_eq!(state.registry.capacity(), 3);
    }
}
