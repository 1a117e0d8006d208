//! Durable nonce account lifecycle: create, wait, decode, close.

use super::nonce_errors::{NonceError, NonceResult};
use super::nonce_retry::{poll_until_some, retry_with_backoff, PollConfig, RetryConfig};
use crate::metrics::metrics;
use crate::rpc_manager::ClusterClient;

use solana_sdk::{
    account::Account,
    hash::Hash,
    nonce::state::{State, Versions},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
#[allow(deprecated)]
use solana_sdk::{system_instruction, system_program};
use tracing::{debug, info, instrument, warn};

/// Byte size of a nonce account
pub fn nonce_account_len() -> usize {
    State::size()
}

/// Decoded view of an initialized nonce account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSnapshot {
    pub pubkey: Pubkey,
    /// Account allowed to advance or withdraw the nonce
    pub authority: Pubkey,
    /// Value to use in place of a recent blockhash
    pub nonce: Hash,
    pub lamports_per_signature: u64,
}

/// Result of a confirmed nonce account creation
#[derive(Debug, Clone, Copy)]
pub struct CreatedNonceAccount {
    pub pubkey: Pubkey,
    pub signature: Signature,
    pub rent_lamports: u64,
}

/// Create and initialize a nonce account in one transaction.
///
/// The account is funded to the rent-exempt minimum and owned by the system
/// program; `authority` may advance or withdraw it.
#[instrument(skip(cluster, payer, retry), fields(endpoint = cluster.endpoint()))]
pub async fn create_nonce_account(
    cluster: &dyn ClusterClient,
    payer: &Keypair,
    authority: &Pubkey,
    retry: &RetryConfig,
) -> NonceResult<CreatedNonceAccount> {
    let nonce_keypair = Keypair::new();
    let nonce_pubkey = nonce_keypair.pubkey();
    let space = nonce_account_len();
    info!(nonce_account = %nonce_pubkey, size = space, "Creating nonce account");

    let rent_lamports = retry_with_backoff("get_minimum_balance_for_rent_exemption", retry, || async {
        cluster.get_minimum_balance_for_rent_exemption(space).await.map_err(NonceError::from)
    })
    .await?;

    #[allow(deprecated)]
    let instructions = system_instruction::create_nonce_account(
        &payer.pubkey(),
        &nonce_pubkey,
        authority,
        rent_lamports,
    );

    let blockhash = retry_with_backoff("get_latest_blockhash", retry, || async {
        cluster.get_latest_blockhash().await.map_err(NonceError::from)
    })
    .await?;

    let mut tx = Transaction::new_with_payer(&instructions, Some(&payer.pubkey()));
    tx.try_sign(&[payer, &nonce_keypair], blockhash)?;

    let signature = send_until_landed(cluster, &tx, "send_nonce_create_tx", retry).await?;
    metrics().nonce_accounts_created.inc();

    info!(
        nonce_account = %nonce_pubkey,
        signature = %signature,
        rent_lamports,
        "Nonce creation confirmed"
    );

    Ok(CreatedNonceAccount {
        pubkey: nonce_pubkey,
        signature,
        rent_lamports,
    })
}

/// Send and confirm `tx`, retrying transient failures.
///
/// A failed send may still have landed (a lost confirmation, or a resend
/// refused as already processed), so the signature status is checked before
/// an error is reported. Every attempt carries the same signature.
async fn send_until_landed(
    cluster: &dyn ClusterClient,
    tx: &Transaction,
    operation: &str,
    retry: &RetryConfig,
) -> NonceResult<Signature> {
    let signature = tx
        .signatures
        .first()
        .copied()
        .ok_or_else(|| NonceError::Internal("transaction has no signatures".to_string()))?;

    retry_with_backoff(operation, retry, || async {
        let err = match cluster.send_and_confirm_transaction(tx).await {
            Ok(signature) => return Ok(signature),
            Err(err) => err,
        };
        match cluster.get_signature_status(&signature).await {
            Ok(Some(Ok(()))) => {
                warn!(signature = %signature, error = %err, "Send reported an error but the transaction landed");
                Ok(signature)
            }
            Ok(Some(Err(tx_err))) => Err(NonceError::Rpc {
                endpoint: Some(cluster.endpoint().to_string()),
                message: format!("Transaction {} failed: {}", signature, tx_err),
                retryable: false,
            }),
            Ok(None) | Err(_) => Err(NonceError::from(err)),
        }
    })
    .await
}

/// Decode raw account data into a [`NonceSnapshot`]
pub fn decode_nonce_account(pubkey: &Pubkey, account: &Account) -> NonceResult<NonceSnapshot> {
    #[allow(deprecated)]
    let system_owner = system_program::id();
    if account.owner != system_owner {
        return Err(NonceError::InvalidNonceAccount(format!(
            "{} is owned by {}, expected the system program",
            pubkey, account.owner
        )));
    }
    if account.data.len() < nonce_account_len() {
        return Err(NonceError::InvalidNonceAccount(format!(
            "{} holds {} bytes, expected {}",
            pubkey,
            account.data.len(),
            nonce_account_len()
        )));
    }

    let versions: Versions = bincode::deserialize(&account.data)
        .map_err(|e| NonceError::InvalidNonceAccount(e.to_string()))?;

    match versions.state() {
        State::Uninitialized => Err(NonceError::InvalidNonceAccount(format!(
            "{} is uninitialized",
            pubkey
        ))),
        State::Initialized(data) => Ok(NonceSnapshot {
            pubkey: *pubkey,
            authority: data.authority,
            nonce: data.blockhash(),
            lamports_per_signature: data.get_lamports_per_signature(),
        }),
    }
}

/// Poll until the nonce account is visible, then decode it.
///
/// Returns the snapshot and the number of reads it took.
#[instrument(skip(cluster, poll), fields(endpoint = cluster.endpoint()))]
pub async fn wait_for_nonce_account(
    cluster: &dyn ClusterClient,
    pubkey: &Pubkey,
    poll: &PollConfig,
) -> NonceResult<(NonceSnapshot, u32)> {
    let outcome = poll_until_some(*pubkey, poll, || async {
        cluster.get_account(pubkey).await.map_err(NonceError::from)
    })
    .await?;

    let snapshot = decode_nonce_account(pubkey, &outcome.value)?;
    debug!(
        nonce_account = %pubkey,
        nonce = %snapshot.nonce,
        attempts = outcome.attempts,
        "Nonce account decoded"
    );
    Ok((snapshot, outcome.attempts))
}

/// Fetch the current on-chain nonce value
pub async fn fetch_nonce_snapshot(
    cluster: &dyn ClusterClient,
    pubkey: &Pubkey,
) -> NonceResult<NonceSnapshot> {
    let account = cluster
        .get_account(pubkey)
        .await?
        .ok_or_else(|| NonceError::InvalidNonceAccount(format!("{} not found", pubkey)))?;
    decode_nonce_account(pubkey, &account)
}

/// Withdraw the full balance of a nonce account to `recipient`, closing it
#[instrument(skip(cluster, authority, retry), fields(endpoint = cluster.endpoint()))]
pub async fn close_nonce_account(
    cluster: &dyn ClusterClient,
    nonce_pubkey: &Pubkey,
    authority: &Keypair,
    recipient: &Pubkey,
    retry: &RetryConfig,
) -> NonceResult<Signature> {
    let balance = retry_with_backoff("get_nonce_balance", retry, || async {
        cluster.get_balance(nonce_pubkey).await.map_err(NonceError::from)
    })
    .await?;

    #[allow(deprecated)]
    let withdraw_ix = system_instruction::withdraw_nonce_account(
        nonce_pubkey,
        &authority.pubkey(),
        recipient,
        balance,
    );

    let blockhash = retry_with_backoff("get_latest_blockhash", retry, || async {
        cluster.get_latest_blockhash().await.map_err(NonceError::from)
    })
    .await?;

    let mut tx = Transaction::new_with_payer(&[withdraw_ix], Some(&authority.pubkey()));
    tx.try_sign(&[authority], blockhash)?;

    let signature = send_until_landed(cluster, &tx, "send_nonce_close_tx", retry).await?;
    metrics().nonce_accounts_closed.inc();

    info!(
        nonce_account = %nonce_pubkey,
        recipient = %recipient,
        lamports = balance,
        signature = %signature,
        "Nonce account closed"
    );
    Ok(signature)
}
