//! Tracing / logging initialisation helpers.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialise tracing with a level directive string (`"info"`,
/// `"debug,sqlx=warn"`, …) and optional JSON output.
/// Call once at application startup.
pub fn init_tracing(level: &str, json: bool) {
    let level = if level.is_empty() { "info" } else { level };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
