//! Partial signing properties of durable nonce transactions

use durable_multisig::nonce_manager::NonceSnapshot;
use durable_multisig::tx_builder::{
    build_mint_instruction, cosign, cosign_encoded, expect_nonce, plan_nonce_instructions,
    sanity_check_ix_order, MintAccounts, NonceTxBuilder, PartialTransaction,
    TransactionBuilderError, TransportEncoding,
};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};

fn snapshot(authority: &Pubkey) -> NonceSnapshot {
    NonceSnapshot {
        pubkey: Pubkey::new_unique(),
        authority: *authority,
        nonce: Hash::new_unique(),
        lamports_per_signature: 5_000,
    }
}

#[test]
fn test_partial_then_cosign_matches_direct_signing() {
    let admin = Keypair::new();
    let second = Keypair::new();
    let mint = Keypair::new();
    let program_id = Pubkey::new_unique();
    let snapshot = snapshot(&admin.pubkey());
    let accounts = MintAccounts::derive(mint.pubkey(), admin.pubkey(), second.pubkey());

    let program_ix = build_mint_instruction(&program_id, &accounts).unwrap();
    let partial = NonceTxBuilder::new(program_id)
        .assemble(&snapshot, &admin.pubkey(), &[&admin, &mint], program_ix.clone())
        .unwrap();

    for encoding in [TransportEncoding::Base58, TransportEncoding::Base64] {
        let text = partial.encode(encoding).unwrap();
        let signed = cosign_encoded(&text, encoding, &second).unwrap();

        let plan = plan_nonce_instructions(&snapshot.pubkey, &admin.pubkey(), program_ix.clone())
            .unwrap();
        let direct = Transaction::new_signed_with_payer(
            &plan.instructions,
            Some(&admin.pubkey()),
            &[&admin, &mint, &second],
            snapshot.nonce,
        );

        assert!(signed.is_fully_signed());
        assert_eq!(
            signed.to_bytes().unwrap(),
            bincode::serialize(&direct).unwrap(),
            "{encoding} transport changed the signed bytes"
        );
    }
}

#[test]
fn test_local_order_check_rejects_late_advance() {
    let admin = Keypair::new();
    let second = Keypair::new();
    let snapshot = snapshot(&admin.pubkey());
    let accounts = MintAccounts::derive(Pubkey::new_unique(), admin.pubkey(), second.pubkey());
    let program_ix = build_mint_instruction(&Pubkey::new_unique(), &accounts).unwrap();

    let mut plan = plan_nonce_instructions(&snapshot.pubkey, &admin.pubkey(), program_ix).unwrap();
    assert!(sanity_check_ix_order(&plan.instructions, true).is_ok());

    plan.instructions.reverse();
    let err = sanity_check_ix_order(&plan.instructions, true).unwrap_err();
    assert!(matches!(err, TransactionBuilderError::InvalidInstructionOrder(_)));
}

#[test]
fn test_tampered_transport_is_rejected() {
    let admin = Keypair::new();
    let second = Keypair::new();
    let snapshot = snapshot(&admin.pubkey());
    let assembled = NonceTxBuilder::new(Pubkey::new_unique())
        .assemble_mint(&snapshot, &admin, &second.pubkey())
        .unwrap();

    // Swap the nonce after signing: the admin signature no longer verifies
    let mut tx = assembled.partial.transaction().clone();
    tx.message.recent_blockhash = Hash::new_unique();
    let bytes = bincode::serialize(&tx).unwrap();
    assert!(PartialTransaction::from_bytes(&bytes).is_err());

    assert!(PartialTransaction::from_encoded("not-base58-0OIl", TransportEncoding::Base58).is_err());
}

#[test]
fn test_second_signer_checks_expected_nonce() {
    let admin = Keypair::new();
    let second = Keypair::new();
    let snapshot = snapshot(&admin.pubkey());
    let assembled = NonceTxBuilder::new(Pubkey::new_unique())
        .assemble_mint(&snapshot, &admin, &second.pubkey())
        .unwrap();

    assert!(expect_nonce(&assembled.partial, &snapshot.nonce).is_ok());
    let err = expect_nonce(&assembled.partial, &Hash::new_unique()).unwrap_err();
    assert!(matches!(err, TransactionBuilderError::NonceMismatch { .. }));

    let stranger = Keypair::new();
    let err = cosign(assembled.partial, &stranger).unwrap_err();
    assert!(matches!(err, TransactionBuilderError::UnexpectedSigner(key) if key == stranger.pubkey()));
}
