//! Error types for the Transaction Builder
//!
//! Covers instruction construction, ordering validation, partial signing,
//! wire (de)serialization and submission of multisig transactions.

use crate::nonce_manager::NonceError;
use crate::rpc_manager::RpcManagerError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Error type for all transaction builder operations
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild {
        /// The program ID that failed to build an instruction
        program: String,
        /// Detailed reason for the failure
        reason: String,
    },

    /// Invalid instruction order or structure
    ///
    /// Durable nonce transactions require advance_nonce_account first.
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    /// Failed to sign the transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// A signer that the message does not require tried to sign
    #[error("Unexpected signer {0}: not a required signer of this transaction")]
    UnexpectedSigner(Pubkey),

    /// Submission attempted while required signatures are still missing
    #[error("Transaction is missing {} signature(s): {missing:?}", .missing.len())]
    MissingSignatures { missing: Vec<Pubkey> },

    /// Wire or transport encoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The transaction was not built against the expected nonce
    #[error("Nonce mismatch: transaction uses {found}, expected {expected}")]
    NonceMismatch {
        expected: solana_sdk::hash::Hash,
        found: solana_sdk::hash::Hash,
    },

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// RPC client error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    /// Nonce account lookup failed
    #[error("Nonce error: {0}")]
    Nonce(#[from] NonceError),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(err) => err.is_retryable(),
            Self::Nonce(err) => err.is_transient(),

            Self::InstructionBuild { .. } => false,
            Self::InvalidInstructionOrder(_) => false,
            Self::Signing(_) => false,
            Self::UnexpectedSigner(_) => false,
            Self::MissingSignatures { .. } => false,
            Self::Serialization(_) => false,
            Self::NonceMismatch { .. } => false,
            Self::Configuration(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::InstructionBuild { .. } => "instruction",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Signing(_) | Self::UnexpectedSigner(_) | Self::MissingSignatures { .. } => {
                "signing"
            }
            Self::Serialization(_) => "serialization",
            Self::NonceMismatch { .. } | Self::Nonce(_) => "nonce",
            Self::Configuration(_) => "config",
            Self::Rpc(_) => "rpc",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    /// Create an instruction build error for a specific program
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid instruction order error
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }

    pub fn serialization(reason: impl std::fmt::Display) -> Self {
        Self::Serialization(reason.to_string())
    }
}

impl From<solana_sdk::signature::SignerError> for TransactionBuilderError {
    fn from(err: solana_sdk::signature::SignerError) -> Self {
        Self::Signing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::InstructionBuild {
            program: "mint_nft".to_string(),
            reason: "invalid accounts".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Instruction build error (program=mint_nft): invalid accounts"
        );

        let missing = vec![Pubkey::new_unique()];
        let err = TransactionBuilderError::MissingSignatures { missing };
        assert!(err.to_string().starts_with("Transaction is missing 1 signature(s)"));
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransactionBuilderError::Rpc(RpcManagerError::Timeout {
            endpoint: "test".to_string()
        })
        .is_retryable());
        assert!(!TransactionBuilderError::Rpc(RpcManagerError::BlockhashNotFound {
            endpoint: "test".to_string()
        })
        .is_retryable());

        assert!(!TransactionBuilderError::Signing("test".to_string()).is_retryable());
        assert!(!TransactionBuilderError::invalid_order("test").is_retryable());
        assert!(!TransactionBuilderError::MissingSignatures { missing: vec![] }.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            TransactionBuilderError::UnexpectedSigner(Pubkey::new_unique()).category(),
            "signing"
        );
        assert_eq!(
            TransactionBuilderError::invalid_order("x").category(),
            "validation"
        );
        assert_eq!(
            TransactionBuilderError::Nonce(NonceError::Timeout(1)).category(),
            "nonce"
        );
    }

    #[test]
    fn test_signer_error_conversion() {
        let err: TransactionBuilderError =
            solana_sdk::signature::SignerError::KeypairPubkeyMismatch.into();
        assert!(matches!(err, TransactionBuilderError::Signing(_)));
    }
}
