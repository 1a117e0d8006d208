//! Partially signed transaction, the unit carried between signers
//!
//! The wire bytes are the standard Solana legacy transaction encoding
//! (bincode). Unsigned slots hold the default (all-zero) signature, so the
//! bytes are valid to transmit before every party has signed.

use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::instructions::sanity_check_message_order;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};

/// Text encoding used to move a partial transaction between parties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportEncoding {
    #[default]
    Base58,
    Base64,
}

impl std::fmt::Display for TransportEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEncoding::Base58 => write!(f, "base58"),
            TransportEncoding::Base64 => write!(f, "base64"),
        }
    }
}

/// A durable-nonce transaction that may still lack signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTransaction {
    tx: Transaction,
}

impl PartialTransaction {
    pub fn new(tx: Transaction) -> Self {
        Self { tx }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_transaction(self) -> Transaction {
        self.tx
    }

    /// Nonce value the transaction was built against
    pub fn nonce(&self) -> Hash {
        self.tx.message.recent_blockhash
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.tx.message.account_keys.first()
    }

    /// Required signers, in signature-slot order
    pub fn required_signers(&self) -> &[Pubkey] {
        let count = self.tx.message.header.num_required_signatures as usize;
        &self.tx.message.account_keys[..count.min(self.tx.message.account_keys.len())]
    }

    /// Required signers whose slot is still empty
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.required_signers()
            .iter()
            .zip(self.tx.signatures.iter())
            .filter(|(_, sig)| **sig == Signature::default())
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.tx.is_signed()
    }

    /// Standard Solana wire encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionBuilderError> {
        bincode::serialize(&self.tx).map_err(TransactionBuilderError::serialization)
    }

    /// Decode wire bytes and validate structure and present signatures
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionBuilderError> {
        let tx: Transaction =
            bincode::deserialize(bytes).map_err(TransactionBuilderError::serialization)?;

        let required = tx.message.header.num_required_signatures as usize;
        if tx.signatures.len() != required {
            return Err(TransactionBuilderError::Serialization(format!(
                "signature count {} does not match required signers {}",
                tx.signatures.len(),
                required
            )));
        }
        sanity_check_message_order(&tx.message)?;

        let partial = Self { tx };
        partial.verify_present_signatures()?;
        Ok(partial)
    }

    pub fn encode(&self, encoding: TransportEncoding) -> Result<String, TransactionBuilderError> {
        let bytes = self.to_bytes()?;
        Ok(match encoding {
            TransportEncoding::Base58 => bs58::encode(bytes).into_string(),
            TransportEncoding::Base64 => BASE64.encode(bytes),
        })
    }

    pub fn from_encoded(
        text: &str,
        encoding: TransportEncoding,
    ) -> Result<Self, TransactionBuilderError> {
        let text = text.trim();
        let bytes = match encoding {
            TransportEncoding::Base58 => bs58::decode(text)
                .into_vec()
                .map_err(TransactionBuilderError::serialization)?,
            TransportEncoding::Base64 => BASE64
                .decode(text)
                .map_err(TransactionBuilderError::serialization)?,
        };
        Self::from_bytes(&bytes)
    }

    /// Every non-empty signature slot must verify against the message
    pub fn verify_present_signatures(&self) -> Result<(), TransactionBuilderError> {
        let results = self.tx.verify_with_results();
        for ((key, sig), ok) in self
            .required_signers()
            .iter()
            .zip(self.tx.signatures.iter())
            .zip(results)
        {
            if *sig != Signature::default() && !ok {
                return Err(TransactionBuilderError::Signing(format!(
                    "signature for {} does not verify",
                    key
                )));
            }
        }
        Ok(())
    }
}
