//! RPC Manager Module
//!
//! The cluster seam used by every on-chain step of the multisig flow. The
//! production implementation wraps the non-blocking Solana `RpcClient`; tests
//! substitute an in-memory cluster.

use async_trait::async_trait;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::{self, Transaction},
};

// Submodules
pub mod rpc_cluster;
pub mod rpc_errors;

// Re-exports for convenience
pub use rpc_cluster::RpcCluster;
pub use rpc_errors::{RpcManagerError, RpcResult};

/// Operations the flow needs from a Solana cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Endpoint identifier used in logs and error context
    fn endpoint(&self) -> &str;

    async fn get_latest_blockhash(&self) -> RpcResult<Hash>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64>;

    /// Fetch an account; `Ok(None)` means the cluster does not (yet) see it
    async fn get_account(&self, pubkey: &Pubkey) -> RpcResult<Option<Account>>;

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64>;

    /// Submit and wait for the configured commitment
    async fn send_and_confirm_transaction(&self, tx: &Transaction) -> RpcResult<Signature>;

    /// Submit the raw transaction and return its signature without waiting
    async fn send_transaction(&self, tx: &Transaction) -> RpcResult<Signature>;

    /// Processing result of `signature`; `Ok(None)` when the cluster has not seen it
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> RpcResult<Option<transaction::Result<()>>>;
}
