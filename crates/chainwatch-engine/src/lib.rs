//! chainwatch-engine — wires scanners, predicates, dedupe, rate limiting,
//! and sinks into a single pass per tick.
//!
//! Per event the pipeline is:
//!
//! ```text
//! rule lookup → predicates → dedupe → rate limit → dry-run gate
//!             → alert row (exactly-once barrier) → sink fan-out + receipts
//! ```
//!
//! A reorg from any scanner is logged and the tick moves to the next
//! source; any other scanner error aborts the remainder of the tick and is
//! left to the run loop, which logs and continues next tick.

pub mod engine;

pub use engine::{Engine, TickStats};
