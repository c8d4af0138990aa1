//! API layer
//!
//! HTTP handlers for:
//! - Index (client id)
//! - Protected profile
//! - Metrics (Prometheus)

mod index;
pub mod metrics;
mod profile;

pub use index::index;
pub use metrics::metrics_router;
pub use profile::protected_router;
