//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Login flow
    pub static ref LOGINS_STARTED_TOTAL: IntCounter = IntCounter::new(
        "profilegate_logins_started_total",
        "Total number of redirects to the provider consent screen"
    ).expect("metric can be created");
    pub static ref LOGINS_COMPLETED_TOTAL: IntCounter = IntCounter::new(
        "profilegate_logins_completed_total",
        "Total number of successful authorization code exchanges"
    ).expect("metric can be created");
    pub static ref CODE_EXCHANGE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "profilegate_code_exchange_failures_total",
        "Total number of failed authorization code exchanges"
    ).expect("metric can be created");

    // Provider calls
    pub static ref USERINFO_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilegate_userinfo_requests_total", "Total number of user info lookups"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref PROVIDER_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "profilegate_provider_request_duration_seconds",
            "OAuth2 provider request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    ).expect("metric can be created");

    // Sessions
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "profilegate_sessions_active",
        "Number of live sessions, refreshed on session create, destroy and lookup miss"
    ).expect("metric can be created");
    pub static ref SESSIONS_DESTROYED_TOTAL: IntCounter = IntCounter::new(
        "profilegate_sessions_destroyed_total",
        "Total number of explicitly destroyed sessions"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilegate_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(LOGINS_STARTED_TOTAL.clone()))
            .expect("LOGINS_STARTED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LOGINS_COMPLETED_TOTAL.clone()))
            .expect("LOGINS_COMPLETED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CODE_EXCHANGE_FAILURES_TOTAL.clone()))
            .expect("CODE_EXCHANGE_FAILURES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(USERINFO_REQUESTS_TOTAL.clone()))
            .expect("USERINFO_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(PROVIDER_REQUEST_DURATION_SECONDS.clone()))
            .expect("PROVIDER_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(SESSIONS_ACTIVE.clone()))
            .expect("SESSIONS_ACTIVE can be registered");
        REGISTRY
            .register(Box::new(SESSIONS_DESTROYED_TOTAL.clone()))
            .expect("SESSIONS_DESTROYED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
