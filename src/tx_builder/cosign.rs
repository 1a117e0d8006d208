//! Remote co-signing and submission
//!
//! The receiving party decodes the partial transaction, adds its own
//! signature against the embedded nonce, and submits once every slot is
//! filled.

use crate::metrics::metrics;
use crate::rpc_manager::ClusterClient;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::output::{PartialTransaction, TransportEncoding};
use solana_sdk::{
    hash::Hash,
    signature::{Keypair, Signature, Signer},
};
use tracing::{info, instrument, warn};

/// Add `signer`'s signature to a received partial transaction
pub fn cosign(
    partial: PartialTransaction,
    signer: &Keypair,
) -> Result<PartialTransaction, TransactionBuilderError> {
    let pubkey = signer.pubkey();
    if !partial.required_signers().contains(&pubkey) {
        return Err(TransactionBuilderError::UnexpectedSigner(pubkey));
    }

    // Signing with the embedded nonce keeps existing signatures intact
    let nonce = partial.nonce();
    let mut tx = partial.into_transaction();
    tx.try_partial_sign(&[signer], nonce)?;
    metrics().partial_signatures.inc();

    let partial = PartialTransaction::new(tx);
    info!(
        signer = %pubkey,
        missing = partial.missing_signers().len(),
        "Co-signed transaction"
    );
    Ok(partial)
}

/// Decode a transported transaction and co-sign it
pub fn cosign_encoded(
    text: &str,
    encoding: TransportEncoding,
    signer: &Keypair,
) -> Result<PartialTransaction, TransactionBuilderError> {
    let partial = PartialTransaction::from_encoded(text, encoding)?;
    cosign(partial, signer)
}

/// Confirm the transaction was built against `expected` before signing it
pub fn expect_nonce(
    partial: &PartialTransaction,
    expected: &Hash,
) -> Result<(), TransactionBuilderError> {
    if partial.nonce() != *expected {
        return Err(TransactionBuilderError::NonceMismatch {
            expected: *expected,
            found: partial.nonce(),
        });
    }
    Ok(())
}

/// Submit a fully signed transaction and return its signature
#[instrument(skip(cluster, partial), fields(endpoint = cluster.endpoint()))]
pub async fn submit(
    cluster: &dyn ClusterClient,
    partial: &PartialTransaction,
) -> Result<Signature, TransactionBuilderError> {
    let missing = partial.missing_signers();
    if !missing.is_empty() {
        return Err(TransactionBuilderError::MissingSignatures { missing });
    }
    partial.verify_present_signatures()?;

    match cluster.send_transaction(partial.transaction()).await {
        Ok(signature) => {
            metrics().transactions_submitted.inc();
            info!(signature = %signature, nonce = %partial.nonce(), "Transaction submitted");
            Ok(signature)
        }
        Err(err) => {
            metrics().transactions_failed.inc();
            warn!(error = %err, nonce = %partial.nonce(), "Transaction submission failed");
            Err(err.into())
        }
    }
}
