//! chainwatch-algorand — Algorand source support: algod REST client,
//! msgpack block model, transaction matchers, and the round scanner.

pub mod block;
pub mod client;
pub mod matcher;
pub mod scanner;

pub use block::{decode_block, Block, SignedTxnInBlock, Transaction};
pub use client::{AlgodClient, HttpAlgodClient};
pub use matcher::RuleMatcher;
pub use scanner::{Scanner, CHAIN};
