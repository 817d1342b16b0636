//! Prometheus counters for the run loop.

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Central metrics handle.
pub struct WatchMetrics {
    registry: Registry,
    pub blocks_processed: IntCounter,
    pub alerts_sent: IntCounter,
    pub alerts_dropped: IntCounter,
    pub errors: IntCounter,
}

impl WatchMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let blocks_processed = IntCounter::new(
            "chainwatch_blocks_processed_total",
            "Total number of blocks processed",
        )
        .expect("valid metric definition");
        let alerts_sent = IntCounter::new(
            "chainwatch_alerts_sent_total",
            "Total number of alerts sent to sinks",
        )
        .expect("valid metric definition");
        let alerts_dropped = IntCounter::new(
            "chainwatch_alerts_dropped_total",
            "Total number of alerts dropped (predicates/dedupe/rate-limit)",
        )
        .expect("valid metric definition");
        let errors = IntCounter::new(
            "chainwatch_errors_total",
            "Total number of errors encountered",
        )
        .expect("valid metric definition");

        for counter in [&blocks_processed, &alerts_sent, &alerts_dropped, &errors] {
            registry
                .register(Box::new(counter.clone()))
                .expect("unique metric registration");
        }

        Self {
            registry,
            blocks_processed,
            alerts_sent,
            alerts_dropped,
            errors,
        }
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for WatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_and_encode() {
        let metrics = WatchMetrics::new();
        metrics.blocks_processed.inc();
        metrics.alerts_sent.inc_by(3);

        let text = metrics.encode();
        assert!(text.contains("chainwatch_blocks_processed_total 1"));
        assert!(text.contains("chainwatch_alerts_sent_total 3"));
        assert!(text.contains("chainwatch_errors_total 0"));
    }
}
