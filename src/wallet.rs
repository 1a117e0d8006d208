//! Signer key loading

use crate::config::KeysConfig;
use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::path::Path;

/// Read a keypair from a file holding either raw 64 bytes or a JSON byte array
pub fn load_keypair(path: impl AsRef<Path>) -> Result<Keypair> {
    let path = path.as_ref();
    let keypair_bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read keypair file: {}", path.display()))?;

    let secret: Vec<u8> = if keypair_bytes.len() == 64 {
        keypair_bytes
    } else {
        serde_json::from_slice(&keypair_bytes)
            .with_context(|| format!("Failed to parse keypair JSON: {}", path.display()))?
    };

    if secret.len() != 64 {
        anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", secret.len());
    }
    if secret.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }

    Keypair::try_from(secret.as_slice())
        .with_context(|| format!("Invalid keypair bytes in {}", path.display()))
}

/// Write a keypair as a JSON byte array, the format `load_keypair` reads back
pub fn write_keypair(keypair: &Keypair, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string(&keypair.to_bytes().to_vec())?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write keypair file: {}", path.display()))
}

/// The keys taking part in the flow
pub struct SignerSet {
    /// Fee payer, nonce authority and mint authority
    pub admin: Keypair,
    /// Remote co-signer
    pub second: Keypair,
    pub program_id: Pubkey,
}

impl SignerSet {
    pub fn load(keys: &KeysConfig) -> Result<Self> {
        let admin = load_keypair(&keys.admin_keypair).context("Loading admin keypair")?;
        let second = load_keypair(&keys.second_keypair).context("Loading second keypair")?;
        let program_id = load_keypair(&keys.program_keypair)
            .context("Loading program keypair")?
            .pubkey();
        Self::new(admin, second, program_id)
    }

    pub fn new(admin: Keypair, second: Keypair, program_id: Pubkey) -> Result<Self> {
        if admin.pubkey() == second.pubkey() {
            anyhow::bail!("Admin and second signer must be different keys");
        }
        Ok(Self {
            admin,
            second,
            program_id,
        })
    }

    pub fn admin_pubkey(&self) -> Pubkey {
        self.admin.pubkey()
    }

    pub fn second_pubkey(&self) -> Pubkey {
        self.second.pubkey()
    }
}

impl std::fmt::Debug for SignerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerSet")
            .field("admin", &self.admin.pubkey())
            .field("second", &self.second.pubkey())
            .field("program_id", &self.program_id)
            .finish()
    }
}
