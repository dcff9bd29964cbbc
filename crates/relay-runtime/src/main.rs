//! # Attestation Relay Runtime
//!
//! Entry point for the state connector relay.
//!
//! ## Commands
//!
//! - `collect` - watch for attestation requests, commit every closed buffer
//! - `request <instructions> <id> <proof> [--once]` - issue a request
//!
//! ## Startup Sequence
//!
//! 1. Parse arguments and initialize logging
//! 2. Load `config.json`, apply `RELAY_*` environment overrides, validate
//! 3. Build the JSON-RPC client and the signer for the command's account
//! 4. Run the command until it finishes or Ctrl-C is received

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use attestation_relay::{
    AttestationRequest, JsonRpcChainClient, LocalSigner, RelayConfig, RelayService,
    SystemClock, TransactionSigner,
};

/// State connector attestation relay
#[derive(Parser, Debug)]
#[command(name = "relay-runtime")]
#[command(about = "Collects attestation requests and commits buffer Merkle roots on-chain")]
struct Args {
    /// Path to the relay configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect events and submit buffer roots
    Collect,
    /// Issue an attestation request
    Request {
        /// Instruction selector (32-byte hex)
        instructions: String,
        /// Request id (32-byte hex)
        id: String,
        /// Data-availability proof (32-byte hex)
        proof: String,
        /// Submit once and exit instead of re-issuing
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log filter")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!(
        version = attestation_relay::VERSION,
        "[relay] Attestation relay starting"
    );

    let mut config = RelayConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    let client = Arc::new(
        JsonRpcChainClient::new(config.url.clone(), config.receipt_timeout())
            .context("Failed to create JSON-RPC client")?,
    );
    let service = RelayService::new(
        Arc::clone(&config),
        client.clone(),
        client,
        Arc::new(config.call_encoder().context("Invalid request selector")?),
        Arc::new(SystemClock),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = match args.command {
        Command::Collect => {
            let account = config.collector_account().context("No collector account")?;
            let signer = Arc::new(
                LocalSigner::from_hex(&account.private_key)
                    .context("Invalid collector private key")?,
            );
            info!(account = %format!("0x{}", hex::encode(signer.address())), "[relay] Running collector");
            tokio::spawn(async move {
                service
                    .run_collector(signer, shutdown_rx, None)
                    .await
                    .map(|buffers| info!(buffers, "[relay] Collector finished"))
            })
        }
        Command::Request {
            instructions,
            id,
            proof,
            once,
        } => {
            let request = AttestationRequest::from_hex(&instructions, &id, &proof)
                .context("Invalid attestation request")?;
            let account = config.requester_account().context("No requester account")?;
            let signer = Arc::new(
                LocalSigner::from_hex(&account.private_key)
                    .context("Invalid requester private key")?,
            );
            info!(account = %format!("0x{}", hex::encode(signer.address())), once, "[relay] Running request issuer");
            tokio::spawn(async move {
                service
                    .run_requester(signer, request, once, shutdown_rx)
                    .await
                    .map(|issued| info!(issued, "[relay] Request issuer finished"))
            })
        }
    };
    tokio::pin!(task);

    tokio::select! {
        joined = &mut task => {
            return report(joined);
        }
        () = shutdown_requested(tokio::signal::ctrl_c()) => {
            info!("[relay] Shutdown requested");
        }
    }

    if let Err(e) = shutdown_tx.send(true) {
        error!("[relay] Failed to send shutdown signal: {}", e);
    }
    report(task.await)
}

/// Resolve once `signal` fires. A signal handler that cannot be installed
/// never resolves, leaving the task to run to completion.
async fn shutdown_requested<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("[relay] Failed to listen for Ctrl-C, running until the task ends: {}", e);
        std::future::pending::<()>().await;
    }
}

fn report(
    joined: std::result::Result<
        std::result::Result<(), attestation_relay::RelayError>,
        tokio::task::JoinError,
    >,
) -> Result<()> {
    joined.context("Relay task panicked")??;
    info!("[relay] Shutdown complete");
    Ok(())
}
