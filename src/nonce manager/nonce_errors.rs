use crate::rpc_manager::RpcManagerError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::SignerError;
use thiserror::Error;

/// Nonce Manager specific errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NonceError {
    /// RPC operation failed
    #[error("RPC error: {message} (endpoint: {endpoint:?})")]
    Rpc {
        endpoint: Option<String>,
        message: String,
        retryable: bool,
    },

    /// Nonce account data is missing, malformed or uninitialized
    #[error("Nonce account error: {0}")]
    InvalidNonceAccount(String),

    /// The nonce account never became visible within the poll budget
    #[error("Nonce account {account} not visible after {attempts} attempts")]
    NotMaterialized { account: Pubkey, attempts: u32 },

    /// Timeout waiting for operation
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Signing error
    #[error("Signing error: {0}")]
    Signing(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NonceError {
    /// Check if this error is transient and retryable
    pub fn is_transient(&self) -> bool {
        match self {
            NonceError::Rpc { retryable, .. } => *retryable,
            NonceError::Timeout(_) => true,

            NonceError::InvalidNonceAccount(_) => false,
            NonceError::NotMaterialized { .. } => false,
            NonceError::Signing(_) => false,
            NonceError::Configuration(_) => false,
            NonceError::Internal(_) => false,
        }
    }
}

impl From<RpcManagerError> for NonceError {
    fn from(err: RpcManagerError) -> Self {
        NonceError::Rpc {
            endpoint: err.endpoint().map(str::to_string),
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

impl From<SignerError> for NonceError {
    fn from(err: SignerError) -> Self {
        NonceError::Signing(err.to_string())
    }
}

/// Result type for nonce operations
pub type NonceResult<T> = Result<T, NonceError>;
