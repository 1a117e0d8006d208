//! Durable nonce multisig client
//!
//! Creates a nonce account, builds a mint transaction signed by the admin
//! key, hands it to the second signer as text and submits the co-signed
//! result.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use durable_multisig::{
    config::Config, metrics::metrics, rpc_manager::RpcCluster, wallet::SignerSet, MultisigFlow,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "multisig.toml")]
    config: String,

    /// RPC endpoint, overrides the config file and MULTISIG_RPC_URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize logging
    init_logging(&config, args.verbose)?;
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if !Path::new(&args.config).exists() {
        warn!("Config file '{}' not found, using defaults", args.config);
    }

    let signers = SignerSet::load(&config.keys).context("Failed to load signer keys")?;
    info!(
        admin = %signers.admin_pubkey(),
        second = %signers.second_pubkey(),
        program_id = %signers.program_id,
        "Signers loaded"
    );

    info!(endpoint = %config.rpc.url, commitment = %config.rpc.commitment, "Connecting");
    let cluster = RpcCluster::new(&config.rpc.url, config.commitment()?, config.rpc_timeout());

    let dump_metrics = config.logging.dump_metrics;
    let flow = MultisigFlow::new(Arc::new(cluster), signers, config);
    let outcome = flow.run().await;

    if dump_metrics {
        match metrics().render() {
            Ok(text) => debug!("Metrics:\n{}", text),
            Err(e) => warn!("Failed to render metrics: {}", e),
        }
    }

    match outcome {
        Ok(report) => {
            info!(
                context_id = %report.context_id,
                nonce_account = %report.nonce_account,
                nonce_creation_sig = %report.nonce_creation_sig,
                mint = %report.mint,
                token_account = %report.token_account,
                submitted_sig = %report.submitted_sig,
                close_sig = ?report.close_sig,
                "Multisig flow complete"
            );
            Ok(())
        }
        Err(e) => {
            error!("Multisig flow failed: {}", e);
            Err(e.into())
        }
    }
}

/// Initialize logging
fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "durable_multisig=debug,info".to_string()
    } else {
        config.logging.filter.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    if let Some(url) = &args.rpc_url {
        config.rpc.url = url.clone();
        config.validate().context("Invalid --rpc-url")?;
    }
    Ok(config)
}
