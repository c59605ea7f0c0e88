use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{SessionConfig, SessionController, SessionEvent};
use shared::domain::AccountAddress;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wallet_bridge::{NodeWallet, Wallet};

mod config;
mod render;

use config::load_settings;
use render::render_snapshot;

#[derive(Parser, Debug)]
#[command(name = "voter", about = "Take part in an on-chain vote from the terminal")]
struct Cli {
    #[arg(long, default_value = "voter.toml")]
    config: PathBuf,
    /// JSON-RPC endpoint acting as the wallet.
    #[arg(long)]
    rpc_url: Option<String>,
    #[arg(long)]
    contract: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the contract state without requesting account access.
    Status,
    /// Request account access and show the session as that account.
    Connect,
    Vote {
        /// Position of the candidate in the list.
        index: String,
    },
    /// Follow wallet and contract changes until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(&cli.config);
    if let Some(rpc_url) = cli.rpc_url {
        settings.rpc_url = rpc_url;
    }
    if let Some(contract) = cli.contract {
        settings.contract_address = contract;
    }
    let contract_address = AccountAddress::parse(&settings.contract_address)
        .with_context(|| format!("invalid contract address '{}'", settings.contract_address))?;

    let wallet = NodeWallet::detect(&settings.rpc_url, settings.wallet_poll_interval())
        .await
        .map(|wallet| wallet as Arc<dyn Wallet>);
    let controller = SessionController::new(
        wallet,
        SessionConfig {
            contract_address,
            receipt_poll_interval: settings.receipt_poll_interval(),
        },
    );
    let listener = controller.start().await;

    match cli.command {
        Command::Status => {}
        Command::Connect => {
            connect(&controller).await;
        }
        Command::Vote { index } => {
            if connect(&controller).await {
                match controller.vote(&index).await {
                    Ok(receipt) => println!("Vote confirmed in transaction {}", receipt.transaction_hash),
                    Err(err) => {
                        if let Some(message) = err.user_message() {
                            println!("{message}");
                        }
                    }
                }
            }
        }
        Command::Watch => {
            connect(&controller).await;
            watch(&controller).await?;
        }
    }

    println!("{}", render_snapshot(&controller.snapshot().await));
    if let Some(listener) = listener {
        listener.dispose();
    }
    Ok(())
}

async fn connect(controller: &SessionController) -> bool {
    match controller.connect().await {
        Ok(_) => true,
        Err(error) => {
            warn!(%error, "voter: wallet connection failed");
            false
        }
    }
}

async fn watch(controller: &SessionController) -> Result<()> {
    let mut updates = BroadcastStream::new(controller.subscribe_events());
    println!("{}", render_snapshot(&controller.snapshot().await));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            interrupted = &mut ctrl_c => {
                interrupted.context("failed to listen for ctrl-c")?;
                break;
            }
            next = updates.next() => match next {
                Some(Ok(SessionEvent::Updated(snapshot))) => {
                    println!("\n{}", render_snapshot(&snapshot));
                }
                Some(Ok(SessionEvent::Notice(message))) => println!("{message}"),
                Some(Err(lagged)) => warn!(%lagged, "voter: skipped session updates"),
                None => break,
            }
        }
    }
    Ok(())
}
