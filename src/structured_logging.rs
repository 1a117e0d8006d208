//! Structured logging for a single flow run

use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature};
use uuid::Uuid;

/// Structured logger tagging every event with the flow's correlation id
#[derive(Debug, Clone)]
pub struct FlowLogger {
    context_id: String,
}

impl FlowLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    /// Logger with a fresh random correlation id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_flow_started(&self, endpoint: &str, admin: &Pubkey, second: &Pubkey) {
        tracing::info!(
            context_id = %self.context_id,
            endpoint = %endpoint,
            admin = %admin,
            second = %second,
            "Multisig flow started"
        );
    }

    pub fn log_nonce_created(&self, nonce_account: &Pubkey, signature: &Signature) {
        tracing::info!(
            context_id = %self.context_id,
            nonce_account = %nonce_account,
            signature = %signature,
            "Nonce account created"
        );
    }

    pub fn log_nonce_ready(&self, nonce_account: &Pubkey, nonce: &Hash, attempts: u32) {
        tracing::info!(
            context_id = %self.context_id,
            nonce_account = %nonce_account,
            nonce = %nonce,
            attempts = %attempts,
            "Nonce account ready"
        );
    }

    pub fn log_tx_assembled(&self, mint: &Pubkey, missing_signers: usize) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            missing_signers = %missing_signers,
            "Partially signed transaction assembled"
        );
    }

    pub fn log_transport(&self, encoding: &str, length: usize) {
        tracing::debug!(
            context_id = %self.context_id,
            encoding = %encoding,
            length = %length,
            "Partial transaction encoded for transport"
        );
    }

    pub fn log_cosigned(&self, signer: &Pubkey) {
        tracing::info!(
            context_id = %self.context_id,
            signer = %signer,
            "Transaction co-signed"
        );
    }

    pub fn log_submitted(&self, signature: &Signature, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            signature = %signature,
            latency_ms = %latency_ms,
            "Transaction submitted"
        );
    }

    pub fn log_nonce_closed(&self, nonce_account: &Pubkey, signature: &Signature) {
        tracing::info!(
            context_id = %self.context_id,
            nonce_account = %nonce_account,
            signature = %signature,
            "Nonce account closed"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            message = %message,
            "Warning"
        );
    }

    pub fn error(&self, message: &str) {
        tracing::error!(
            context_id = %self.context_id,
            message = %message,
            "Error"
        );
    }
}
