//! Instruction planning and ordering validation
//!
//! Durable nonce transactions are laid out as:
//! 1. advance_nonce_account
//! 2. the mint program instruction
//!
//! The mint instruction carries a fixed account layout that the on-chain
//! program walks positionally, so the order in [`MintAccounts::to_account_metas`]
//! is part of the program's interface.

use crate::tx_builder::errors::TransactionBuilderError;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    sysvar,
};
#[allow(deprecated)]
use solana_sdk::{system_instruction, system_program};
use spl_associated_token_account::get_associated_token_address;

/// SystemInstruction::AdvanceNonceAccount discriminator (u32 little-endian)
const ADVANCE_NONCE_DISCRIMINATOR: [u8; 4] = [4, 0, 0, 0];

/// Accounts referenced by the mint program instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintAccounts {
    /// Freshly generated mint; signs so the program can create it
    pub mint: Pubkey,
    /// Associated token account of `mint_authority` for `mint`
    pub token_account: Pubkey,
    /// Mint authority, also the first multisig signer
    pub mint_authority: Pubkey,
    /// Second multisig signer
    pub second_signer: Pubkey,
}

impl MintAccounts {
    /// Number of accounts the program expects
    pub const ACCOUNT_COUNT: usize = 8;

    const MINT_INDEX: usize = 0;
    const MINT_AUTHORITY_INDEX: usize = 2;
    const SECOND_SIGNER_INDEX: usize = 7;

    /// Derive the layout, computing the associated token address
    pub fn derive(mint: Pubkey, mint_authority: Pubkey, second_signer: Pubkey) -> Self {
        Self {
            mint,
            token_account: get_associated_token_address(&mint_authority, &mint),
            mint_authority,
            second_signer,
        }
    }

    /// Account metas in program order
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        #[allow(deprecated)]
        let system_program_id = system_program::id();
        vec![
            AccountMeta::new(self.mint, true),
            AccountMeta::new(self.token_account, false),
            AccountMeta::new_readonly(self.mint_authority, true),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(system_program_id, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(self.second_signer, true),
        ]
    }

    /// Signer gate enforced by the mint program.
    ///
    /// The mint authority must be `admin`, the last account must be `second`,
    /// and both of them plus the mint must have signed.
    pub fn verify_signers(
        accounts: &[AccountMeta],
        admin: &Pubkey,
        second: &Pubkey,
    ) -> Result<(), TransactionBuilderError> {
        if accounts.len() < Self::ACCOUNT_COUNT {
            return Err(TransactionBuilderError::instruction_failed(
                "mint",
                format!(
                    "expected {} accounts, got {}",
                    Self::ACCOUNT_COUNT,
                    accounts.len()
                ),
            ));
        }

        let mint = &accounts[Self::MINT_INDEX];
        if !mint.is_signer {
            return Err(TransactionBuilderError::Signing(format!(
                "Mint {} did not sign",
                mint.pubkey
            )));
        }

        let authority = &accounts[Self::MINT_AUTHORITY_INDEX];
        if authority.pubkey != *admin || !authority.is_signer {
            return Err(TransactionBuilderError::Signing(format!(
                "Unapproved Admin/Mint Auth: {}",
                authority.pubkey
            )));
        }

        let second_signer = &accounts[Self::SECOND_SIGNER_INDEX];
        if second_signer.pubkey != *second || !second_signer.is_signer {
            return Err(TransactionBuilderError::Signing(format!(
                "Unapproved Second Signer: {}",
                second_signer.pubkey
            )));
        }

        Ok(())
    }
}

/// Build the mint program instruction (no instruction data)
pub fn build_mint_instruction(
    program_id: &Pubkey,
    accounts: &MintAccounts,
) -> Result<Instruction, TransactionBuilderError> {
    if *program_id == Pubkey::default() {
        return Err(TransactionBuilderError::instruction_failed(
            program_id.to_string(),
            "program id is unset",
        ));
    }
    if accounts.mint_authority == accounts.second_signer {
        return Err(TransactionBuilderError::instruction_failed(
            program_id.to_string(),
            "mint authority and second signer must be distinct",
        ));
    }

    Ok(Instruction::new_with_bytes(
        *program_id,
        &[],
        accounts.to_account_metas(),
    ))
}

/// Plan of instructions with ordering metadata
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    /// The ordered list of instructions for the transaction
    pub instructions: Vec<Instruction>,

    /// Whether this plan uses durable nonce
    /// - `true`: First instruction must be advance_nonce_account
    /// - `false`: Standard blockhash-based transaction
    pub is_durable: bool,
}

impl InstructionPlan {
    pub fn new(instructions: Vec<Instruction>, is_durable: bool) -> Self {
        Self {
            instructions,
            is_durable,
        }
    }
}

/// Place advance_nonce_account ahead of the program instruction
pub fn plan_nonce_instructions(
    nonce_account: &Pubkey,
    nonce_authority: &Pubkey,
    program_ix: Instruction,
) -> Result<InstructionPlan, TransactionBuilderError> {
    if program_ix.accounts.is_empty() {
        return Err(TransactionBuilderError::Configuration(
            "Program instruction has no accounts".to_string(),
        ));
    }
    if is_advance_nonce(&program_ix) {
        return Err(TransactionBuilderError::invalid_order(
            "Program instruction must not be an advance_nonce_account",
        ));
    }

    #[allow(deprecated)]
    let advance_ix = system_instruction::advance_nonce_account(nonce_account, nonce_authority);

    let plan = InstructionPlan::new(vec![advance_ix, program_ix], true);
    sanity_check_ix_order(&plan.instructions, plan.is_durable)?;
    Ok(plan)
}

/// Whether raw instruction parts encode advance_nonce_account
pub fn is_advance_nonce_data(program_id: &Pubkey, data: &[u8]) -> bool {
    #[allow(deprecated)]
    let system_program_id = system_program::id();
    *program_id == system_program_id
        && data.len() >= 4
        && data[..4] == ADVANCE_NONCE_DISCRIMINATOR
}

pub fn is_advance_nonce(ix: &Instruction) -> bool {
    is_advance_nonce_data(&ix.program_id, &ix.data)
}

/// Validate instruction ordering for durable nonce transactions
///
/// # Errors
///
/// Returns `TransactionBuilderError::InvalidInstructionOrder` if:
/// - Instruction list is empty
/// - Durable transaction doesn't start with advance_nonce
/// - Multiple advance_nonce instructions found
/// - advance_nonce found in non-durable transaction
pub fn sanity_check_ix_order(
    instructions: &[Instruction],
    is_durable: bool,
) -> Result<(), TransactionBuilderError> {
    let Some(first) = instructions.first() else {
        return Err(TransactionBuilderError::invalid_order(
            "Instruction list is empty",
        ));
    };

    if is_durable {
        if !is_advance_nonce(first) {
            return Err(TransactionBuilderError::invalid_order(format!(
                "Durable nonce transaction must start with advance_nonce_account, got program_id: {}",
                first.program_id
            )));
        }

        if let Some(idx) = instructions.iter().skip(1).position(is_advance_nonce) {
            return Err(TransactionBuilderError::invalid_order(format!(
                "Multiple advance_nonce_account instructions found (at position {}). Only one allowed at position 0",
                idx + 1
            )));
        }
    } else if let Some(idx) = instructions.iter().position(is_advance_nonce) {
        return Err(TransactionBuilderError::invalid_order(format!(
            "Non-durable transaction should not have advance_nonce_account (found at position {})",
            idx
        )));
    }

    Ok(())
}

/// Ordering check on a compiled message, for transactions received off the wire
pub fn sanity_check_message_order(message: &Message) -> Result<(), TransactionBuilderError> {
    let advance_positions: Vec<usize> = message
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, ix)| {
            message
                .account_keys
                .get(ix.program_id_index as usize)
                .is_some_and(|program_id| is_advance_nonce_data(program_id, &ix.data))
        })
        .map(|(idx, _)| idx)
        .collect();

    match advance_positions.as_slice() {
        [] => Err(TransactionBuilderError::invalid_order(
            "Durable nonce transaction must start with advance_nonce_account",
        )),
        [0] => Ok(()),
        [0, second, ..] => Err(TransactionBuilderError::invalid_order(format!(
            "Multiple advance_nonce_account instructions found (at position {}). Only one allowed at position 0",
            second
        ))),
        [first, ..] => Err(TransactionBuilderError::invalid_order(format!(
            "advance_nonce_account found at position {}, expected position 0",
            first
        ))),
    }
}
