use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use eth_rpc::{HttpTransport, Provider, RpcError, RpcTransport};
use shared::domain::{AccountAddress, ChainId};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

pub const DEFAULT_WALLET_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Ordered authorized accounts; empty when the user disconnected.
    AccountsChanged(Vec<AccountAddress>),
    ChainChanged(ChainId),
}

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Requests account access. May prompt the user and may be rejected.
    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, RpcError>;
    /// Raw JSON-RPC handle the wallet exposes for building connections.
    fn transport(&self) -> Arc<dyn RpcTransport>;
    fn subscribe_events(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Wallet backed by a JSON-RPC node whose unlocked accounts act as the
/// wallet's accounts. Account and chain changes are observed by polling.
pub struct NodeWallet {
    transport: Arc<HttpTransport>,
    events: broadcast::Sender<WalletEvent>,
    watcher: JoinHandle<()>,
}

impl NodeWallet {
    /// Returns `None` when nothing answers at `rpc_url`.
    pub async fn detect(rpc_url: &str, poll_interval: Duration) -> Option<Arc<Self>> {
        let transport = match HttpTransport::new(rpc_url) {
            Ok(transport) => Arc::new(transport),
            Err(error) => {
                warn!(rpc_url, %error, "wallet: unusable rpc url");
                return None;
            }
        };
        let provider = Provider::new(transport.clone());
        let chain_id = match provider.chain_id().await {
            Ok(chain_id) => chain_id,
            Err(error) => {
                warn!(rpc_url, %error, "wallet: no wallet detected");
                return None;
            }
        };
        let accounts = match provider.accounts().await {
            Ok(accounts) => accounts,
            Err(error) => {
                debug!(%error, "wallet: initial account listing failed");
                Vec::new()
            }
        };
        info!(rpc_url, %chain_id, accounts = accounts.len(), "wallet: detected");

        let (events, _) = broadcast::channel(64);
        let watcher = tokio::spawn(watch_node(
            provider,
            events.clone(),
            accounts,
            chain_id,
            poll_interval,
        ));
        Some(Arc::new(Self {
            transport,
            events,
            watcher,
        }))
    }
}

impl Drop for NodeWallet {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[async_trait]
impl Wallet for NodeWallet {
    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, RpcError> {
        let provider = Provider::new(self.transport.clone());
        match provider.request_accounts().await {
            Err(err) if err.is_method_not_found() => {
                debug!("wallet: eth_requestAccounts unsupported, using eth_accounts");
                provider.accounts().await
            }
            other => other,
        }
    }

    fn transport(&self) -> Arc<dyn RpcTransport> {
        self.transport.clone()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

async fn watch_node(
    provider: Provider,
    events: broadcast::Sender<WalletEvent>,
    mut accounts: Vec<AccountAddress>,
    mut chain_id: ChainId,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;

        match provider.chain_id().await {
            Ok(current) if current != chain_id => {
                info!(from = %chain_id, to = %current, "wallet: chain changed");
                chain_id = current;
                let _ = events.send(WalletEvent::ChainChanged(current));
            }
            Ok(_) => {}
            Err(error) => debug!(%error, "wallet: chain id poll failed"),
        }

        match provider.accounts().await {
            Ok(current) if current != accounts => {
                info!(accounts = current.len(), "wallet: accounts changed");
                accounts = current.clone();
                let _ = events.send(WalletEvent::AccountsChanged(current));
            }
            Ok(_) => {}
            Err(error) => debug!(%error, "wallet: account poll failed"),
        }
    }
}

#[cfg(test)]
#[path = "tests/node_wallet_tests.rs"]
mod tests;
