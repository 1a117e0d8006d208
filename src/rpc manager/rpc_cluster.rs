use super::rpc_errors::{RpcManagerError, RpcResult};
use super::ClusterClient;
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{self, Transaction},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// `ClusterClient` backed by a JSON-RPC endpoint
pub struct RpcCluster {
    client: Arc<RpcClient>,
    endpoint: String,
    commitment: CommitmentConfig,
}

impl RpcCluster {
    pub fn new(endpoint: &str, commitment: CommitmentConfig, timeout: Duration) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            endpoint.to_string(),
            timeout,
            commitment,
        );
        Self {
            client: Arc::new(client),
            endpoint: endpoint.to_string(),
            commitment,
        }
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.endpoint)
    }
}

#[async_trait]
impl ClusterClient for RpcCluster {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_latest_blockhash(&self) -> RpcResult<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64> {
        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_account(&self, pubkey: &Pubkey) -> RpcResult<Option<Account>> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, self.commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        debug!(account = %pubkey, slot = response.context.slot, found = response.value.is_some(), "Fetched account");
        Ok(response.value)
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64> {
        self.client
            .get_balance(pubkey)
            .await
            .map_err(|e| self.map_err(e))
    }

    #[instrument(skip(self, tx), fields(endpoint = %self.endpoint))]
    async fn send_and_confirm_transaction(&self, tx: &Transaction) -> RpcResult<Signature> {
        self.client
            .send_and_confirm_transaction(tx)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> RpcResult<Option<transaction::Result<()>>> {
        self.client
            .get_signature_status(signature)
            .await
            .map_err(|e| self.map_err(e))
    }

    #[instrument(skip(self, tx), fields(endpoint = %self.endpoint))]
    async fn send_transaction(&self, tx: &Transaction) -> RpcResult<Signature> {
        self.client
            .send_transaction(tx)
            .await
            .map_err(|e| self.map_err(e))
    }
}
