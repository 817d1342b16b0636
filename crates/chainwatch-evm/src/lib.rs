//! chainwatch-evm — EVM source support: JSON-RPC client, ABI catalog,
//! log matching/decoding, and the confirmation-gated block scanner.

pub mod abi;
pub mod client;
pub mod matcher;
pub mod scanner;

pub use abi::{load_abi_dirs, AbiCatalog};
pub use client::{BlockHeader, EvmClient, HttpEvmClient, RawLog};
pub use matcher::RuleMatcher;
pub use scanner::{Scanner, CHAIN};
