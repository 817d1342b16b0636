//! chainwatch-observability — Prometheus counters, tracing initialization,
//! and the health/metrics HTTP surface.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::{serve, HealthState, Probe};
pub use metrics::WatchMetrics;
pub use tracing_setup::init_tracing;
