//! Core durable-nonce transaction assembly

use crate::metrics::metrics;
use crate::nonce_manager::NonceSnapshot;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::instructions::{build_mint_instruction, plan_nonce_instructions, MintAccounts};
use crate::tx_builder::output::PartialTransaction;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use tracing::{debug, info};

/// Mint transaction after local signing
#[derive(Debug, Clone)]
pub struct AssembledMint {
    pub partial: PartialTransaction,
    pub accounts: MintAccounts,
}

/// Builds transactions that use a durable nonce in place of a recent blockhash
#[derive(Debug, Clone)]
pub struct NonceTxBuilder {
    program_id: Pubkey,
}

impl NonceTxBuilder {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Assemble the mint transaction and sign it with every key held locally.
    ///
    /// `admin` pays fees, is the nonce authority and the mint authority. A
    /// fresh mint keypair is generated and signs here; `second_signer` is left
    /// for the remote party.
    pub fn assemble_mint(
        &self,
        snapshot: &NonceSnapshot,
        admin: &Keypair,
        second_signer: &Pubkey,
    ) -> Result<AssembledMint, TransactionBuilderError> {
        let mint = Keypair::new();
        let accounts = MintAccounts::derive(mint.pubkey(), admin.pubkey(), *second_signer);
        info!(mint = %accounts.mint, token_account = %accounts.token_account, "New token");

        let program_ix = build_mint_instruction(&self.program_id, &accounts)?;
        let partial = self.assemble(snapshot, &admin.pubkey(), &[admin, &mint], program_ix)?;

        Ok(AssembledMint { partial, accounts })
    }

    /// Assemble `program_ix` behind an advance of `snapshot`'s nonce and apply
    /// `local_signers` as partial signatures.
    ///
    /// The nonce value in `snapshot` becomes the transaction's recent
    /// blockhash, so the snapshot must be the account's current state.
    pub fn assemble(
        &self,
        snapshot: &NonceSnapshot,
        fee_payer: &Pubkey,
        local_signers: &[&Keypair],
        program_ix: Instruction,
    ) -> Result<PartialTransaction, TransactionBuilderError> {
        let plan = plan_nonce_instructions(&snapshot.pubkey, &snapshot.authority, program_ix)?;
        let mut tx = Transaction::new_with_payer(&plan.instructions, Some(fee_payer));

        let required = &tx.message.account_keys[..tx.message.header.num_required_signatures as usize];
        if let Some(stranger) = local_signers
            .iter()
            .map(|signer| signer.pubkey())
            .find(|pubkey| !required.contains(pubkey))
        {
            return Err(TransactionBuilderError::UnexpectedSigner(stranger));
        }

        tx.try_partial_sign(local_signers, snapshot.nonce)?;
        metrics().partial_signatures.inc_by(local_signers.len() as u64);

        let partial = PartialTransaction::new(tx);
        debug!(
            nonce_account = %snapshot.pubkey,
            nonce = %snapshot.nonce,
            signed = local_signers.len(),
            missing = partial.missing_signers().len(),
            "Partially signed durable nonce transaction"
        );
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::instructions::is_advance_nonce;
    use solana_sdk::{hash::Hash, instruction::AccountMeta};

    fn snapshot_for(authority: &Pubkey) -> NonceSnapshot {
        NonceSnapshot {
            pubkey: Pubkey::new_unique(),
            authority: *authority,
            nonce: Hash::new_unique(),
            lamports_per_signature: 5_000,
        }
    }

    #[test]
    fn test_assemble_mint_uses_nonce_and_leaves_second_slot_empty() {
        let admin = Keypair::new();
        let second = Keypair::new();
        let snapshot = snapshot_for(&admin.pubkey());
        let builder = NonceTxBuilder::new(Pubkey::new_unique());

        let assembled = builder
            .assemble_mint(&snapshot, &admin, &second.pubkey())
            .unwrap();
        let tx = assembled.partial.transaction();

        assert_eq!(tx.message.recent_blockhash, snapshot.nonce);
        assert_eq!(assembled.partial.fee_payer(), Some(&admin.pubkey()));
        assert_eq!(assembled.partial.required_signers().len(), 3);
        assert_eq!(assembled.partial.missing_signers(), vec![second.pubkey()]);
        assert!(assembled.partial.verify_present_signatures().is_ok());

        let first = tx.message.instructions[0].program_id_index as usize;
        #[allow(deprecated)]
        let system_program_id = solana_sdk::system_program::id();
        assert_eq!(tx.message.account_keys[first], system_program_id);
        assert_eq!(assembled.accounts.mint_authority, admin.pubkey());
        assert_eq!(assembled.accounts.second_signer, second.pubkey());
    }

    #[test]
    fn test_assemble_rejects_signer_outside_message() {
        let admin = Keypair::new();
        let outsider = Keypair::new();
        let snapshot = snapshot_for(&admin.pubkey());
        let builder = NonceTxBuilder::new(Pubkey::new_unique());
        let ix = Instruction::new_with_bytes(
            *builder.program_id(),
            &[],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        );

        let err = builder
            .assemble(&snapshot, &admin.pubkey(), &[&admin, &outsider], ix)
            .unwrap_err();
        assert!(matches!(err, TransactionBuilderError::UnexpectedSigner(k) if k == outsider.pubkey()));
    }

    #[test]
    fn test_assemble_orders_advance_first() {
        let admin = Keypair::new();
        let snapshot = snapshot_for(&admin.pubkey());
        let builder = NonceTxBuilder::new(Pubkey::new_unique());
        let ix = Instruction::new_with_bytes(
            *builder.program_id(),
            &[7],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        );

        let partial = builder
            .assemble(&snapshot, &admin.pubkey(), &[&admin], ix)
            .unwrap();
        assert!(partial.is_fully_signed());

        let message = &partial.transaction().message;
        let first = &message.instructions[0];
        let advance = Instruction::new_with_bytes(
            message.account_keys[first.program_id_index as usize],
            &first.data,
            vec![],
        );
        assert!(is_advance_nonce(&advance));
    }
}
