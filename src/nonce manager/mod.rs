//! Nonce Manager Module
//!
//! Bootstrap and lifecycle of the single durable nonce account a multisig
//! transaction is built against.

// Submodules
pub mod nonce_account;
pub mod nonce_errors;
pub mod nonce_retry;

// Re-exports for convenience
pub use nonce_account::{
    close_nonce_account, create_nonce_account, decode_nonce_account, fetch_nonce_snapshot,
    nonce_account_len, wait_for_nonce_account, CreatedNonceAccount, NonceSnapshot,
};
pub use nonce_errors::{NonceError, NonceResult};
pub use nonce_retry::{poll_until_some, retry_with_backoff, PollConfig, PollOutcome, RetryConfig};
