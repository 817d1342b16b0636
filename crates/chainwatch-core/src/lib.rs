//! chainwatch-core — shared foundation for the ChainWatch pipeline.
//!
//! # Architecture
//!
//! ```text
//! Engine ── tick ──► SourceScanner (evm / algorand)
//!    │                    │
//!    │                    └── NormalizedEvent { args: name → Value }
//!    ├── Predicate        (compiled from rule `where` expressions)
//!    ├── TokenBucket      (per-rule rate limiting)
//!    └── dedupe           (key rendering + TTL parsing)
//! ```
//!
//! Everything chain-specific lives in the scanner crates; this crate only
//! holds the vocabulary they share.

pub mod dedupe;
pub mod error;
pub mod event;
pub mod predicate;
pub mod ratelimit;
pub mod rule;
pub mod scanner;

pub use error::WatchError;
pub use event::{NormalizedEvent, Value};
pub use predicate::{all_predicates, compile_predicates, Predicate};
pub use ratelimit::TokenBucket;
pub use rule::{DedupeSpec, MatchSpec, RateLimitSpec, RuleSpec};
pub use scanner::{resolve_start, SourceScanner};
