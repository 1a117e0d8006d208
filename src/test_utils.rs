//! Test Utilities Module
//!
//! An in-memory cluster implementing [`ClusterClient`] so the full flow can
//! run deterministically without a network. It keeps just enough of the
//! runtime's rules to catch durable-nonce mistakes: signature verification,
//! advance-first ordering, nonce value checks, nonce rotation and the mint
//! program's signer gate.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::nonce_manager::nonce_account_len;
use crate::rpc_manager::{ClusterClient, RpcManagerError, RpcResult};
use crate::tx_builder::{sanity_check_message_order, MintAccounts};
use async_trait::async_trait;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::AccountMeta,
    message::Message,
    nonce::state::{Data, DurableNonce, State, Versions},
    pubkey::Pubkey,
    signature::Signature,
    transaction::{self, Transaction},
};
#[allow(deprecated)]
use solana_sdk::{system_instruction::SystemInstruction, system_program};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const ENDPOINT: &str = "simulated://cluster";
const LAMPORTS_PER_SIGNATURE: u64 = 5_000;
const MINT_ACCOUNT_LEN: usize = 82;

/// Rent-exempt minimum with the default rent parameters
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (128 + data_len as u64) * 3_480 * 2
}

/// Mint program rule the cluster applies to instructions for `program_id`
#[derive(Debug, Clone, Copy)]
pub struct MintGate {
    pub program_id: Pubkey,
    pub admin: Pubkey,
    pub second: Pubkey,
}

#[derive(Debug, Default)]
struct ClusterState {
    accounts: HashMap<Pubkey, Account>,
    /// Remaining `get_account` reads for which a new account stays hidden
    hidden: HashMap<Pubkey, u32>,
    visibility_delay: u32,
    recent_blockhashes: Vec<Hash>,
    account_reads: u32,
    failing_sends: u32,
    lost_confirmations: u32,
    reject_withdrawals: bool,
    gate: Option<MintGate>,
    minted: Vec<Pubkey>,
    processed: Vec<Signature>,
}

impl ClusterState {
    fn current_blockhash(&self) -> Hash {
        self.recent_blockhashes.last().copied().unwrap_or_default()
    }

    fn rotate_blockhash(&mut self) {
        self.recent_blockhashes.push(Hash::new_unique());
    }
}

/// In-memory cluster for deterministic tests
#[derive(Clone)]
pub struct SimulatedCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl SimulatedCluster {
    pub fn new() -> Self {
        let mut state = ClusterState::default();
        state.rotate_blockhash();
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Accounts created from now on stay invisible for `reads` account reads
    pub async fn set_visibility_delay(&self, reads: u32) {
        self.state.lock().await.visibility_delay = reads;
    }

    /// Fail the next `count` sends with a retryable transport error
    pub async fn fail_next_sends(&self, count: u32) {
        self.state.lock().await.failing_sends = count;
    }

    /// Process the next `count` sends but answer them with a timeout, as when
    /// confirmation is lost after the transaction landed
    pub async fn lose_next_confirmations(&self, count: u32) {
        self.state.lock().await.lost_confirmations = count;
    }

    /// Reject every nonce withdrawal
    pub async fn set_reject_withdrawals(&self, reject: bool) {
        self.state.lock().await.reject_withdrawals = reject;
    }

    pub async fn set_mint_gate(&self, gate: MintGate) {
        self.state.lock().await.gate = Some(gate);
    }

    pub async fn fund(&self, pubkey: &Pubkey, lamports: u64) {
        #[allow(deprecated)]
        let owner = system_program::id();
        let mut state = self.state.lock().await;
        state
            .accounts
            .entry(*pubkey)
            .or_insert_with(|| Account::new(0, 0, &owner))
            .lamports += lamports;
    }

    pub async fn account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.state.lock().await.accounts.get(pubkey).cloned()
    }

    /// Number of `get_account` calls served so far
    pub async fn account_reads(&self) -> u32 {
        self.state.lock().await.account_reads
    }

    pub async fn minted(&self) -> Vec<Pubkey> {
        self.state.lock().await.minted.clone()
    }

    pub async fn processed(&self) -> Vec<Signature> {
        self.state.lock().await.processed.clone()
    }

    fn process(state: &mut ClusterState, tx: &Transaction) -> RpcResult<Signature> {
        let message = &tx.message;
        let required = message.header.num_required_signatures as usize;
        if tx.signatures.len() != required
            || !tx.is_signed()
            || !tx.verify_with_results().iter().all(|ok| *ok)
        {
            return Err(rejected("signature verification failed"));
        }

        let durable = !state.recent_blockhashes.contains(&message.recent_blockhash);
        if durable {
            sanity_check_message_order(message).map_err(|e| rejected(&e.to_string()))?;
            let nonce_account = message
                .instructions
                .first()
                .and_then(|ix| ix.accounts.first())
                .and_then(|idx| message.account_keys.get(*idx as usize))
                .ok_or_else(|| rejected("advance instruction has no nonce account"))?;
            let stored = state
                .accounts
                .get(nonce_account)
                .and_then(|account| initialized_nonce(account))
                .ok_or_else(|| rejected("nonce account is not initialized"))?;
            if stored.blockhash() != message.recent_blockhash {
                return Err(rejected("transaction nonce is stale"));
            }
        }

        // Work on a copy so a failing instruction leaves no partial effects
        let mut accounts = state.accounts.clone();
        let fee_payer = message
            .account_keys
            .first()
            .ok_or_else(|| rejected("missing fee payer"))?;
        let fee = LAMPORTS_PER_SIGNATURE * required as u64;
        debit(&mut accounts, fee_payer, fee)?;

        let mut created = Vec::new();
        for ix in &message.instructions {
            let program_id = message.account_keys[ix.program_id_index as usize];
            let keys: Vec<Pubkey> = ix
                .accounts
                .iter()
                .map(|idx| message.account_keys[*idx as usize])
                .collect();
            let signed = |position: usize| {
                ix.accounts
                    .get(position)
                    .is_some_and(|idx| message.is_signer(*idx as usize))
            };

            #[allow(deprecated)]
            let is_system = program_id == system_program::id();
            if is_system {
                let instruction: SystemInstruction = bincode::deserialize(&ix.data)
                    .map_err(|e| rejected(&format!("invalid system instruction: {}", e)))?;
                let current = state.current_blockhash();
                execute_system(
                    &mut accounts,
                    &mut created,
                    instruction,
                    &keys,
                    &signed,
                    current,
                    state.reject_withdrawals,
                )?;
            } else if let Some(gate) = state.gate.filter(|gate| gate.program_id == program_id) {
                let metas: Vec<AccountMeta> = ix
                    .accounts
                    .iter()
                    .map(|idx| {
                        let idx = *idx as usize;
                        AccountMeta {
                            pubkey: message.account_keys[idx],
                            is_signer: message.is_signer(idx),
                            is_writable: is_writable(message, idx),
                        }
                    })
                    .collect();
                MintAccounts::verify_signers(&metas, &gate.admin, &gate.second)
                    .map_err(|e| rejected(&e.to_string()))?;
                let mint = metas[0].pubkey;
                if accounts.contains_key(&mint) {
                    return Err(rejected("mint already exists"));
                }
                let rent = rent_exempt_minimum(MINT_ACCOUNT_LEN);
                debit(&mut accounts, fee_payer, rent)?;
                accounts.insert(mint, Account::new(rent, MINT_ACCOUNT_LEN, &spl_token::id()));
                state.minted.push(mint);
            } else {
                return Err(rejected(&format!("unknown program {}", program_id)));
            }
        }

        state.accounts = accounts;
        for pubkey in created {
            if state.visibility_delay > 0 {
                state.hidden.insert(pubkey, state.visibility_delay);
            }
        }
        let signature = tx.signatures[0];
        state.processed.push(signature);
        state.rotate_blockhash();
        Ok(signature)
    }
}

impl Default for SimulatedCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for SimulatedCluster {
    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    async fn get_latest_blockhash(&self) -> RpcResult<Hash> {
        Ok(self.state.lock().await.current_blockhash())
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64> {
        Ok(rent_exempt_minimum(data_len))
    }

    async fn get_account(&self, pubkey: &Pubkey) -> RpcResult<Option<Account>> {
        let mut state = self.state.lock().await;
        state.account_reads += 1;
        if let Some(remaining) = state.hidden.get_mut(pubkey) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.accounts.get(pubkey).cloned())
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(pubkey).map_or(0, |account| account.lamports))
    }

    async fn send_and_confirm_transaction(&self, tx: &Transaction) -> RpcResult<Signature> {
        self.send_transaction(tx).await
    }

    async fn send_transaction(&self, tx: &Transaction) -> RpcResult<Signature> {
        let mut state = self.state.lock().await;
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(RpcManagerError::Transport {
                endpoint: ENDPOINT.to_string(),
                message: "connection reset".to_string(),
            });
        }
        let signature = Self::process(&mut state, tx)?;
        if state.lost_confirmations > 0 {
            state.lost_confirmations -= 1;
            return Err(RpcManagerError::Timeout {
                endpoint: ENDPOINT.to_string(),
            });
        }
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> RpcResult<Option<transaction::Result<()>>> {
        let state = self.state.lock().await;
        Ok(state.processed.contains(signature).then_some(Ok(())))
    }
}

fn rejected(reason: &str) -> RpcManagerError {
    RpcManagerError::TransactionRejected {
        endpoint: ENDPOINT.to_string(),
        reason: reason.to_string(),
    }
}

fn is_writable(message: &Message, idx: usize) -> bool {
    let header = &message.header;
    let signed = header.num_required_signatures as usize;
    if idx < signed {
        idx < signed - header.num_readonly_signed_accounts as usize
    } else {
        idx < message.account_keys.len() - header.num_readonly_unsigned_accounts as usize
    }
}

fn initialized_nonce(account: &Account) -> Option<Data> {
    let versions: Versions = bincode::deserialize(&account.data).ok()?;
    match versions.state() {
        State::Initialized(data) => Some(data.clone()),
        State::Uninitialized => None,
    }
}

fn write_nonce(account: &mut Account, data: Data) -> RpcResult<()> {
    let bytes = bincode::serialize(&Versions::new(State::Initialized(data)))
        .map_err(|e| RpcManagerError::Internal(e.to_string()))?;
    account.data[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}

fn debit(accounts: &mut HashMap<Pubkey, Account>, pubkey: &Pubkey, lamports: u64) -> RpcResult<()> {
    let account = accounts
        .get_mut(pubkey)
        .filter(|account| account.lamports >= lamports)
        .ok_or_else(|| RpcManagerError::InsufficientFunds {
            endpoint: ENDPOINT.to_string(),
        })?;
    account.lamports -= lamports;
    Ok(())
}

fn credit(accounts: &mut HashMap<Pubkey, Account>, pubkey: &Pubkey, lamports: u64) {
    #[allow(deprecated)]
    let owner = system_program::id();
    accounts
        .entry(*pubkey)
        .or_insert_with(|| Account::new(0, 0, &owner))
        .lamports += lamports;
}

fn execute_system(
    accounts: &mut HashMap<Pubkey, Account>,
    created: &mut Vec<Pubkey>,
    instruction: SystemInstruction,
    keys: &[Pubkey],
    signed: &dyn Fn(usize) -> bool,
    current_blockhash: Hash,
    reject_withdrawals: bool,
) -> RpcResult<()> {
    let key = |position: usize| {
        keys.get(position)
            .copied()
            .ok_or_else(|| rejected("missing instruction account"))
    };

    match instruction {
        SystemInstruction::CreateAccount {
            lamports,
            space,
            owner,
        } => {
            let (from, to) = (key(0)?, key(1)?);
            if !signed(0) || !signed(1) {
                return Err(rejected("create_account requires funder and new account signatures"));
            }
            if accounts.get(&to).is_some_and(|account| account.lamports > 0) {
                return Err(rejected("account already in use"));
            }
            debit(accounts, &from, lamports)?;
            accounts.insert(to, Account::new(lamports, space as usize, &owner));
            created.push(to);
            Ok(())
        }
        SystemInstruction::InitializeNonceAccount(authority) => {
            let nonce = key(0)?;
            let account = accounts
                .get_mut(&nonce)
                .ok_or_else(|| rejected("nonce account does not exist"))?;
            if account.data.len() != nonce_account_len() {
                return Err(rejected("nonce account has the wrong size"));
            }
            if initialized_nonce(account).is_some() {
                return Err(rejected("nonce account already initialized"));
            }
            if account.lamports < rent_exempt_minimum(nonce_account_len()) {
                return Err(rejected("nonce account is not rent exempt"));
            }
            let data = Data::new(
                authority,
                DurableNonce::from_blockhash(&current_blockhash),
                LAMPORTS_PER_SIGNATURE,
            );
            write_nonce(account, data)
        }
        SystemInstruction::AdvanceNonceAccount => {
            let nonce = key(0)?;
            let account = accounts
                .get_mut(&nonce)
                .ok_or_else(|| rejected("nonce account does not exist"))?;
            let data = initialized_nonce(account)
                .ok_or_else(|| rejected("nonce account is not initialized"))?;
            let authority_signed = keys
                .iter()
                .enumerate()
                .any(|(position, key)| *key == data.authority && signed(position));
            if !authority_signed {
                return Err(rejected("nonce authority did not sign"));
            }
            let next = DurableNonce::from_blockhash(&current_blockhash);
            if *next.as_hash() == data.blockhash() {
                return Err(rejected("nonce can only advance once per blockhash"));
            }
            write_nonce(
                account,
                Data::new(data.authority, next, LAMPORTS_PER_SIGNATURE),
            )
        }
        SystemInstruction::WithdrawNonceAccount(lamports) => {
            if reject_withdrawals {
                return Err(rejected("withdrawals are disabled"));
            }
            let (nonce, recipient) = (key(0)?, key(1)?);
            let account = accounts
                .get(&nonce)
                .ok_or_else(|| rejected("nonce account does not exist"))?;
            let data = initialized_nonce(account)
                .ok_or_else(|| rejected("nonce account is not initialized"))?;
            let authority_signed = keys
                .iter()
                .enumerate()
                .any(|(position, key)| *key == data.authority && signed(position));
            if !authority_signed {
                return Err(rejected("nonce authority did not sign"));
            }
            let balance = account.lamports;
            if lamports == balance {
                accounts.remove(&nonce);
            } else if balance.saturating_sub(lamports) >= rent_exempt_minimum(nonce_account_len()) {
                debit(accounts, &nonce, lamports)?;
            } else {
                return Err(rejected("withdrawal would leave the nonce account below rent exemption"));
            }
            credit(accounts, &recipient, lamports);
            Ok(())
        }
        SystemInstruction::Transfer { lamports } => {
            let (from, to) = (key(0)?, key(1)?);
            if !signed(0) {
                return Err(rejected("transfer source did not sign"));
            }
            debit(accounts, &from, lamports)?;
            credit(accounts, &to, lamports);
            Ok(())
        }
        other => Err(rejected(&format!("unsupported system instruction {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce_manager::{create_nonce_account, fetch_nonce_snapshot, RetryConfig};
    use solana_sdk::signature::{Keypair, Signer};

    #[tokio::test]
    async fn test_created_nonce_account_is_hidden_for_delay() {
        let cluster = SimulatedCluster::new();
        let payer = Keypair::new();
        cluster.fund(&payer.pubkey(), 1_000_000_000).await;
        cluster.set_visibility_delay(2).await;

        let created = create_nonce_account(&cluster, &payer, &payer.pubkey(), &RetryConfig::no_retry())
            .await
            .unwrap();

        assert!(cluster.get_account(&created.pubkey).await.unwrap().is_none());
        assert!(cluster.get_account(&created.pubkey).await.unwrap().is_none());
        let snapshot = fetch_nonce_snapshot(&cluster, &created.pubkey).await.unwrap();
        assert_eq!(snapshot.authority, payer.pubkey());
        assert_eq!(created.rent_lamports, rent_exempt_minimum(nonce_account_len()));
    }

    #[tokio::test]
    async fn test_unsigned_transaction_is_rejected() {
        let cluster = SimulatedCluster::new();
        let payer = Keypair::new();
        cluster.fund(&payer.pubkey(), 1_000_000_000).await;

        #[allow(deprecated)]
        let ix = solana_sdk::system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 10);
        let tx = Transaction::new_with_payer(&[ix], Some(&payer.pubkey()));

        let err = cluster.send_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, RpcManagerError::TransactionRejected { .. }));
    }

    #[tokio::test]
    async fn test_unknown_blockhash_without_advance_is_rejected() {
        let cluster = SimulatedCluster::new();
        let payer = Keypair::new();
        cluster.fund(&payer.pubkey(), 1_000_000_000).await;

        #[allow(deprecated)]
        let ix = solana_sdk::system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 10);
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&payer.pubkey()),
            &[&payer],
            Hash::new_unique(),
        );

        let err = cluster.send_transaction(&tx).await.unwrap_err();
        assert!(err.to_string().contains("advance_nonce_account"));
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_state_untouched() {
        let cluster = SimulatedCluster::new();
        let payer = Keypair::new();
        cluster.fund(&payer.pubkey(), 100_000).await;
        let recipient = Pubkey::new_unique();

        #[allow(deprecated)]
        let ixs = [
            solana_sdk::system_instruction::transfer(&payer.pubkey(), &recipient, 10),
            solana_sdk::system_instruction::transfer(&payer.pubkey(), &recipient, 10_000_000),
        ];
        let blockhash = cluster.get_latest_blockhash().await.unwrap();
        let tx = Transaction::new_signed_with_payer(&ixs, Some(&payer.pubkey()), &[&payer], blockhash);

        let err = cluster.send_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, RpcManagerError::InsufficientFunds { .. }));
        assert_eq!(cluster.get_balance(&payer.pubkey()).await.unwrap(), 100_000);
        assert_eq!(cluster.get_balance(&recipient).await.unwrap(), 0);
    }
}
