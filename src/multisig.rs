//! Two-signer durable nonce flow
//!
//! Runs the whole exchange in one process: the admin side bootstraps a nonce
//! account and assembles the partially signed mint transaction, then the
//! transaction crosses a text transport to the second signer, who verifies
//! it, co-signs and submits.

use crate::config::Config;
use crate::nonce_manager::{
    close_nonce_account, create_nonce_account, wait_for_nonce_account, NonceError,
};
use crate::rpc_manager::ClusterClient;
use crate::structured_logging::FlowLogger;
use crate::tx_builder::{
    cosign, expect_nonce, submit, NonceTxBuilder, PartialTransaction, TransactionBuilderError,
};
use crate::wallet::SignerSet;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Nonce step failed: {0}")]
    Nonce(#[from] NonceError),

    #[error("Transaction step failed: {0}")]
    Transaction(#[from] TransactionBuilderError),
}

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct FlowReport {
    /// Correlation id shared by every log line of the run
    pub context_id: String,
    pub nonce_account: Pubkey,
    pub nonce_creation_sig: Signature,
    /// Account reads until the nonce account became visible
    pub poll_attempts: u32,
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub submitted_sig: Signature,
    /// `None` when closing was disabled or failed
    pub close_sig: Option<Signature>,
}

pub struct MultisigFlow {
    cluster: Arc<dyn ClusterClient>,
    signers: SignerSet,
    config: Config,
}

impl MultisigFlow {
    pub fn new(cluster: Arc<dyn ClusterClient>, signers: SignerSet, config: Config) -> Self {
        Self {
            cluster,
            signers,
            config,
        }
    }

    pub fn signers(&self) -> &SignerSet {
        &self.signers
    }

    pub async fn run(&self) -> Result<FlowReport, FlowError> {
        let logger = FlowLogger::generate();
        match self.run_with(&logger).await {
            Ok(report) => Ok(report),
            Err(err) => {
                logger.error(&err.to_string());
                Err(err)
            }
        }
    }

    async fn run_with(&self, logger: &FlowLogger) -> Result<FlowReport, FlowError> {
        let cluster = self.cluster.as_ref();
        let admin = &self.signers.admin;
        let admin_pubkey = self.signers.admin_pubkey();
        let second_pubkey = self.signers.second_pubkey();
        let retry = self.config.retry_config();
        let encoding = self.config.flow.transport_encoding;

        logger.log_flow_started(cluster.endpoint(), &admin_pubkey, &second_pubkey);

        // Admin side
        let created = create_nonce_account(cluster, admin, &admin_pubkey, &retry).await?;
        logger.log_nonce_created(&created.pubkey, &created.signature);

        let (snapshot, poll_attempts) =
            wait_for_nonce_account(cluster, &created.pubkey, &self.config.poll_config()).await?;
        logger.log_nonce_ready(&snapshot.pubkey, &snapshot.nonce, poll_attempts);

        let assembled = NonceTxBuilder::new(self.signers.program_id).assemble_mint(
            &snapshot,
            admin,
            &second_pubkey,
        )?;
        logger.log_tx_assembled(
            &assembled.accounts.mint,
            assembled.partial.missing_signers().len(),
        );

        let wire = assembled.partial.encode(encoding)?;
        logger.log_transport(&encoding.to_string(), wire.len());

        // Second signer side
        let received = PartialTransaction::from_encoded(&wire, encoding)?;
        expect_nonce(&received, &snapshot.nonce)?;
        let cosigned = cosign(received, &self.signers.second)?;
        logger.log_cosigned(&second_pubkey);

        sleep(Duration::from_millis(self.config.flow.submit_delay_ms)).await;
        let started = Instant::now();
        let submitted_sig = submit(cluster, &cosigned).await?;
        logger.log_submitted(&submitted_sig, started.elapsed().as_millis() as u64);

        let close_sig = if self.config.flow.close_nonce_after_submit {
            match close_nonce_account(cluster, &created.pubkey, admin, &admin_pubkey, &retry).await
            {
                Ok(signature) => {
                    logger.log_nonce_closed(&created.pubkey, &signature);
                    Some(signature)
                }
                Err(err) => {
                    logger.warn(&format!(
                        "Failed to close nonce account {}: {}",
                        created.pubkey, err
                    ));
                    None
                }
            }
        } else {
            None
        };

        Ok(FlowReport {
            context_id: logger.context_id().to_string(),
            nonce_account: created.pubkey,
            nonce_creation_sig: created.signature,
            poll_attempts,
            mint: assembled.accounts.mint,
            token_account: assembled.accounts.token_account,
            submitted_sig,
            close_sig,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::metrics;
    use crate::nonce_manager::{fetch_nonce_snapshot, NonceSnapshot, RetryConfig};
    use crate::rpc_manager::RpcManagerError;
    use crate::test_utils::{MintGate, SimulatedCluster};
    use crate::tx_builder::{build_mint_instruction, MintAccounts};
    use solana_sdk::{
        signature::{Keypair, Signer},
        transaction::Transaction,
    };

    const FUNDING: u64 = 10_000_000_000;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.nonce.initial_delay_ms = 100;
        config.nonce.poll_interval_ms = 100;
        config.nonce.max_poll_attempts = 10;
        config.nonce.poll_timeout_secs = 5;
        config.flow.submit_delay_ms = 0;
        config.rpc.max_retries = 2;
        config
    }

    async fn setup(visibility_delay: u32) -> (SimulatedCluster, SignerSet) {
        let signers =
            SignerSet::new(Keypair::new(), Keypair::new(), Pubkey::new_unique()).unwrap();
        let cluster = SimulatedCluster::new();
        cluster.fund(&signers.admin_pubkey(), FUNDING).await;
        cluster.set_visibility_delay(visibility_delay).await;
        cluster
            .set_mint_gate(MintGate {
                program_id: signers.program_id,
                admin: signers.admin_pubkey(),
                second: signers.second_pubkey(),
            })
            .await;
        (cluster, signers)
    }

    async fn ready_nonce(cluster: &SimulatedCluster, admin: &Keypair) -> NonceSnapshot {
        let created =
            create_nonce_account(cluster, admin, &admin.pubkey(), &RetryConfig::no_retry())
                .await
                .unwrap();
        fetch_nonce_snapshot(cluster, &created.pubkey).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_completes_within_poll_budget() {
        let (cluster, signers) = setup(3).await;
        let flow = MultisigFlow::new(Arc::new(cluster.clone()), signers, test_config());

        let report = flow.run().await.unwrap();

        assert_eq!(report.poll_attempts, 4);
        assert!(report.poll_attempts <= test_config().nonce.max_poll_attempts);
        // Only the visibility poll reads accounts
        assert_eq!(cluster.account_reads().await, report.poll_attempts);
        assert_eq!(cluster.minted().await, vec![report.mint]);
        assert_eq!(
            cluster.processed().await,
            vec![report.nonce_creation_sig, report.submitted_sig]
        );
        assert!(report.close_sig.is_none());

        let expected = MintAccounts::derive(
            report.mint,
            flow.signers().admin_pubkey(),
            flow.signers().second_pubkey(),
        );
        assert_eq!(report.token_account, expected.token_account);

        // The submission consumed the nonce
        let after = fetch_nonce_snapshot(&cluster, &report.nonce_account)
            .await
            .unwrap();
        assert_eq!(after.authority, flow.signers().admin_pubkey());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_closes_nonce_account_when_enabled() {
        let (cluster, signers) = setup(0).await;
        let mut config = test_config();
        config.flow.close_nonce_after_submit = true;
        let flow = MultisigFlow::new(Arc::new(cluster.clone()), signers, config);
        let created_before = metrics().nonce_accounts_created.get();
        let closed_before = metrics().nonce_accounts_closed.get();

        let report = flow.run().await.unwrap();

        assert!(report.close_sig.is_some());
        assert!(cluster.account(&report.nonce_account).await.is_none());
        // Counters are process-global; other tests may bump them concurrently
        assert!(metrics().nonce_accounts_created.get() > created_before);
        assert!(metrics().nonce_accounts_closed.get() > closed_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_failure_keeps_submission() {
        let (cluster, signers) = setup(0).await;
        cluster.set_reject_withdrawals(true).await;
        let mut config = test_config();
        config.flow.close_nonce_after_submit = true;
        let flow = MultisigFlow::new(Arc::new(cluster.clone()), signers, config);

        let report = flow.run().await.unwrap();

        assert!(report.close_sig.is_none());
        assert!(cluster.processed().await.contains(&report.submitted_sig));
        assert!(cluster.account(&report.nonce_account).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_fails_when_nonce_never_appears() {
        let (cluster, signers) = setup(1_000).await;
        let flow = MultisigFlow::new(Arc::new(cluster.clone()), signers, test_config());

        let err = flow.run().await.unwrap_err();

        assert!(matches!(
            err,
            FlowError::Nonce(NonceError::NotMaterialized { attempts: 10, .. })
        ));
        assert!(cluster.minted().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_retries_transient_send_failures() {
        let (cluster, signers) = setup(0).await;
        cluster.fail_next_sends(1).await;
        let flow = MultisigFlow::new(Arc::new(cluster.clone()), signers, test_config());

        let report = flow.run().await.unwrap();
        assert_eq!(cluster.minted().await, vec![report.mint]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mint_rejected_for_unapproved_second_signer() {
        let (cluster, signers) = setup(0).await;
        cluster
            .set_mint_gate(MintGate {
                program_id: signers.program_id,
                admin: signers.admin_pubkey(),
                second: Pubkey::new_unique(),
            })
            .await;
        let flow = MultisigFlow::new(Arc::new(cluster.clone()), signers, test_config());

        let err = flow.run().await.unwrap_err();

        match err {
            FlowError::Transaction(TransactionBuilderError::Rpc(
                RpcManagerError::TransactionRejected { reason, .. },
            )) => assert!(reason.contains("Unapproved Second Signer")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cluster_rejects_stale_nonce() {
        let (cluster, signers) = setup(0).await;
        let snapshot = ready_nonce(&cluster, &signers.admin).await;
        let builder = NonceTxBuilder::new(signers.program_id);

        let first = builder
            .assemble_mint(&snapshot, &signers.admin, &signers.second_pubkey())
            .unwrap();
        let second = builder
            .assemble_mint(&snapshot, &signers.admin, &signers.second_pubkey())
            .unwrap();

        let first = cosign(first.partial, &signers.second).unwrap();
        submit(&cluster, &first).await.unwrap();

        // Same nonce, already advanced by the first submission
        let second = cosign(second.partial, &signers.second).unwrap();
        let err = submit(&cluster, &second).await.unwrap_err();
        assert!(err.to_string().contains("stale"));
        assert_eq!(cluster.minted().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cluster_rejects_nonce_that_does_not_match() {
        let (cluster, signers) = setup(0).await;
        let mut snapshot = ready_nonce(&cluster, &signers.admin).await;
        snapshot.nonce = solana_sdk::hash::Hash::new_unique();

        let assembled = NonceTxBuilder::new(signers.program_id)
            .assemble_mint(&snapshot, &signers.admin, &signers.second_pubkey())
            .unwrap();
        let signed = cosign(assembled.partial, &signers.second).unwrap();

        let err = submit(&cluster, &signed).await.unwrap_err();
        assert!(matches!(
            err,
            TransactionBuilderError::Rpc(RpcManagerError::TransactionRejected { .. })
        ));
        assert!(cluster.minted().await.is_empty());
    }

    #[tokio::test]
    async fn test_cluster_rejects_advance_out_of_order() {
        let (cluster, signers) = setup(0).await;
        let snapshot = ready_nonce(&cluster, &signers.admin).await;
        let mint = Keypair::new();
        let accounts = MintAccounts::derive(
            mint.pubkey(),
            signers.admin_pubkey(),
            signers.second_pubkey(),
        );
        let program_ix = build_mint_instruction(&signers.program_id, &accounts).unwrap();
        #[allow(deprecated)]
        let advance_ix = solana_sdk::system_instruction::advance_nonce_account(
            &snapshot.pubkey,
            &snapshot.authority,
        );

        let tx = Transaction::new_signed_with_payer(
            &[program_ix, advance_ix],
            Some(&signers.admin_pubkey()),
            &[&signers.admin, &mint, &signers.second],
            snapshot.nonce,
        );

        let err = cluster.send_transaction(&tx).await.unwrap_err();
        assert!(err.to_string().contains("expected position 0"));
        assert!(cluster.minted().await.is_empty());
    }
}
