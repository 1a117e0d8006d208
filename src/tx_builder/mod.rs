//! Durable-nonce multisig transaction builder
//!
//! ## Architecture
//!
//! - **errors**: Error taxonomy for building, signing and submitting
//! - **instructions**: Mint account layout, nonce-first planning, order checks
//! - **builder**: Assembly against a nonce snapshot with local partial signing
//! - **output**: The partially signed transaction and its transport encodings
//! - **cosign**: Remote signature and submission
//!
//! ## Durable Nonce Rules
//!
//! - advance_nonce_account is always the first instruction
//! - The recent blockhash field holds the nonce value read before the advance
//! - Signatures are applied with `try_partial_sign`, so the wire bytes stay
//!   valid while slots are still empty
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use durable_multisig::tx_builder::{cosign, NonceTxBuilder, TransportEncoding};
//! # use durable_multisig::nonce_manager::NonceSnapshot;
//! # use solana_sdk::signature::{Keypair, Signer};
//! # fn example(snapshot: NonceSnapshot, admin: Keypair, second: Keypair, program_id: solana_sdk::pubkey::Pubkey)
//! #     -> Result<(), durable_multisig::tx_builder::TransactionBuilderError> {
//! let builder = NonceTxBuilder::new(program_id);
//! let assembled = builder.assemble_mint(&snapshot, &admin, &second.pubkey())?;
//!
//! // Carried to the second party as text
//! let text = assembled.partial.encode(TransportEncoding::Base58)?;
//!
//! let received = durable_multisig::tx_builder::PartialTransaction::from_encoded(&text, TransportEncoding::Base58)?;
//! let signed = cosign(received, &second)?;
//! assert!(signed.is_fully_signed());
//! # Ok(())
//! # }
//! ```

// Public API - Error types
pub mod errors;
pub use errors::TransactionBuilderError;

pub mod builder;
pub mod cosign;
pub mod instructions;
pub mod output;

// Re-export key types for convenience
pub use builder::{AssembledMint, NonceTxBuilder};
pub use cosign::{cosign, cosign_encoded, expect_nonce, submit};
pub use instructions::{
    build_mint_instruction, is_advance_nonce, plan_nonce_instructions, sanity_check_ix_order,
    sanity_check_message_order, InstructionPlan, MintAccounts,
};
pub use output::{PartialTransaction, TransportEncoding};
