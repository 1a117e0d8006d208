//! Durable nonce multisig client
//!
//! Builds a Solana transaction against a durable nonce so that it can be
//! partially signed by one party, carried as text to a second party, and
//! co-signed and submitted later without expiring.

pub mod config;
pub mod metrics;
pub mod multisig;
pub mod structured_logging;
pub mod test_utils;
pub mod tx_builder;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "nonce manager/mod.rs"]
pub mod nonce_manager;

#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

// Re-export commonly used types
pub use config::Config;
pub use multisig::{FlowError, FlowReport, MultisigFlow};
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
