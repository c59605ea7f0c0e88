//! Session controller for the voting front-end.
//!
//! Owns the wallet connection, mirrors the contract's candidates, status and
//! remaining time, tracks whether the connected account may still vote, and
//! submits votes. Every refresh is tagged with a generation; results from a
//! refresh that has been overtaken by a newer one are dropped. The session
//! epoch changes whenever the connection is replaced or dropped, and a
//! refresh pinned to an older epoch is dropped as well.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use eth_rpc::{Provider, Signer, DEFAULT_RECEIPT_POLL_INTERVAL};
use shared::{
    domain::{AccountAddress, Candidate, ChainId},
    protocol::TransactionReceipt,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use voting_contract::VotingContract;
use wallet_bridge::{Wallet, WalletEvent};

mod listener;
pub mod view;
pub mod vote;

pub use listener::WalletListener;
pub use view::{select_screen, Screen};
pub use vote::{parse_candidate_index, VoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    ReadOnly,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub account: Option<AccountAddress>,
    pub chain_id: Option<ChainId>,
    pub candidates: Vec<Candidate>,
    pub voting_open: bool,
    /// Opaque contract value, shown as returned.
    pub remaining_time: Option<u64>,
    pub can_vote: bool,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn screen(&self) -> Screen {
        select_screen(self)
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Updated(SessionSnapshot),
    Notice(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no wallet detected")]
    NoWallet,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("account request failed: {0}")]
    AccountRequest(#[source] eth_rpc::RpcError),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub contract_address: AccountAddress,
    pub receipt_poll_interval: Duration,
}

impl SessionConfig {
    pub fn new(contract_address: AccountAddress) -> Self {
        Self {
            contract_address,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Connection {
    provider: Option<Provider>,
    account: Option<AccountAddress>,
    is_connected: bool,
}

impl Connection {
    fn read_only(provider: Provider) -> Self {
        Self {
            provider: Some(provider),
            account: None,
            is_connected: false,
        }
    }

    fn connected(provider: Provider, account: AccountAddress) -> Self {
        Self {
            provider: Some(provider),
            account: Some(account),
            is_connected: true,
        }
    }

    fn state(&self) -> ConnectionState {
        if self.is_connected {
            ConnectionState::Connected
        } else if self.provider.is_some() {
            ConnectionState::ReadOnly
        } else {
            ConnectionState::Disconnected
        }
    }
}

struct SessionState {
    connection: Connection,
    epoch: u64,
    chain_id: Option<ChainId>,
    candidates: Vec<Candidate>,
    voting_open: bool,
    remaining_time: Option<u64>,
    can_vote: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connection: Connection::default(),
            epoch: 0,
            chain_id: None,
            candidates: Vec::new(),
            voting_open: true,
            remaining_time: None,
            can_vote: true,
        }
    }
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.connection.state(),
            account: self.connection.account.clone(),
            chain_id: self.chain_id,
            candidates: self.candidates.clone(),
            voting_open: self.voting_open,
            remaining_time: self.remaining_time,
            can_vote: self.can_vote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadSet {
    /// Chain id, candidates, voting status and remaining time.
    All,
    CandidatesOnly,
}

enum VoterLookup {
    Skip,
    Signer(Signer),
    /// Use the wallet's first authorized account if there is one.
    Discover,
}

#[derive(Default)]
struct RefreshOutcome {
    chain_id: Option<ChainId>,
    candidates: Option<Vec<Candidate>>,
    voting_open: Option<bool>,
    remaining_time: Option<u64>,
    can_vote: Option<bool>,
}

pub struct SessionController {
    wallet: Option<Arc<dyn Wallet>>,
    config: SessionConfig,
    inner: Mutex<SessionState>,
    generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// `wallet` is `None` when no wallet was detected; the session then stays
    /// disconnected and never touches the chain.
    pub fn new(wallet: Option<Arc<dyn Wallet>>, config: SessionConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            wallet,
            config,
            inner: Mutex::new(SessionState::default()),
            generation: AtomicU64::new(0),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Reads the contract through a read-only connection without prompting and
    /// starts listening to wallet events. Returns `None` without a wallet.
    pub async fn start(self: &Arc<Self>) -> Option<WalletListener> {
        let Some(wallet) = self.wallet.clone() else {
            info!("session: no wallet detected; staying on login screen");
            return None;
        };

        let provider = self.fresh_provider(wallet.as_ref());
        self.replace_connection(Connection::read_only(provider.clone()))
            .await;
        let listener = self.listen(wallet.as_ref());
        self.refresh(&provider, ReadSet::All, VoterLookup::Skip, None)
            .await;
        Some(listener)
    }

    fn listen(self: &Arc<Self>, wallet: &dyn Wallet) -> WalletListener {
        let mut events = wallet.subscribe_events();
        let controller = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: wallet events lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.handle_wallet_event(event).await;
            }
        });
        WalletListener::new(task)
    }

    pub async fn handle_wallet_event(&self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged(accounts) => self.handle_accounts_changed(accounts).await,
            WalletEvent::ChainChanged(chain_id) => self.handle_chain_changed(chain_id).await,
        }
    }

    /// Requests account access and performs a full refresh as that account.
    pub async fn connect(&self) -> Result<AccountAddress, SessionError> {
        let Some(wallet) = self.wallet.clone() else {
            error!("session: connect requested but no wallet detected");
            return Err(SessionError::NoWallet);
        };
        let accounts = wallet.request_accounts().await.map_err(|error| {
            error!(%error, "session: account request failed");
            SessionError::AccountRequest(error)
        })?;
        let Some(account) = accounts.into_iter().next() else {
            error!("session: wallet granted no accounts");
            return Err(SessionError::NoAccounts);
        };

        info!(%account, "session: connected");
        self.connect_account(wallet.as_ref(), account.clone()).await;
        Ok(account)
    }

    pub async fn handle_accounts_changed(&self, accounts: Vec<AccountAddress>) {
        let Some(account) = accounts.into_iter().next() else {
            // Invalidate in-flight refreshes so they cannot repopulate a dead session.
            self.generation.fetch_add(1, Ordering::SeqCst);
            let snapshot = {
                let mut state = self.inner.lock().await;
                state.connection = Connection::default();
                state.epoch += 1;
                state.can_vote = true;
                state.snapshot()
            };
            info!("session: wallet reported no accounts; disconnected");
            self.publish(snapshot);
            return;
        };
        let Some(wallet) = self.wallet.clone() else {
            warn!("session: accounts changed without a wallet");
            return;
        };

        info!(%account, "session: account changed");
        self.connect_account(wallet.as_ref(), account).await;
    }

    pub async fn handle_chain_changed(&self, chain_id: ChainId) {
        let Some(wallet) = self.wallet.clone() else {
            warn!(%chain_id, "session: chain changed without a wallet");
            return;
        };

        info!(%chain_id, "session: chain changed");
        let provider = self.fresh_provider(wallet.as_ref());
        let account = {
            let mut state = self.inner.lock().await;
            let previous = std::mem::take(&mut state.connection);
            state.connection = Connection {
                provider: Some(provider.clone()),
                account: previous.account.clone(),
                is_connected: previous.is_connected,
            };
            state.chain_id = Some(chain_id);
            previous.account
        };
        let voter = match account {
            Some(account) => VoterLookup::Signer(provider.signer_for(account)),
            None => VoterLookup::Discover,
        };
        self.refresh(&provider, ReadSet::All, voter, None).await;
    }

    /// Validates `raw_index`, submits the vote, waits for confirmation and then
    /// re-reads candidates and the voter flag. Failures leave the session as is.
    pub async fn vote(&self, raw_index: &str) -> Result<TransactionReceipt, VoteError> {
        let candidate_index = parse_candidate_index(raw_index).map_err(|err| {
            warn!(raw_index, "session: rejected candidate index");
            self.notify_failure(err)
        })?;
        let (signer, epoch) = self
            .vote_signer()
            .await
            .map_err(|err| self.notify_failure(err))?;

        let contract = VotingContract::with_signer(self.config.contract_address.clone(), signer.clone());
        let pending = contract
            .vote(candidate_index)
            .await
            .map_err(|source| self.notify_failure(VoteError::Submission(source)))?;
        let receipt = pending
            .wait()
            .await
            .map_err(|source| self.notify_failure(VoteError::Confirmation(source)))?;

        // Only the session that cast the vote may take the voter flag from it.
        let provider = signer.provider().clone();
        self.refresh(
            &provider,
            ReadSet::CandidatesOnly,
            VoterLookup::Signer(signer),
            Some(epoch),
        )
        .await;
        Ok(receipt)
    }

    async fn vote_signer(&self) -> Result<(Signer, u64), VoteError> {
        let (connection, epoch) = {
            let state = self.inner.lock().await;
            (state.connection.clone(), state.epoch)
        };
        let provider = match (connection.provider, self.wallet.as_ref()) {
            (Some(provider), _) => provider,
            (None, Some(wallet)) => self.fresh_provider(wallet.as_ref()),
            (None, None) => return Err(VoteError::NoSigner),
        };
        if let Some(account) = connection.account {
            return Ok((provider.signer_for(account), epoch));
        }
        match provider.signer().await {
            Ok(Some(signer)) => Ok((signer, epoch)),
            Ok(None) => Err(VoteError::NoSigner),
            Err(error) => {
                warn!(%error, "session: signer lookup failed");
                Err(VoteError::NoSigner)
            }
        }
    }

    fn notify_failure(&self, err: VoteError) -> VoteError {
        error!(error = %err, "session: vote failed");
        if let Some(message) = err.user_message() {
            let _ = self.events.send(SessionEvent::Notice(message));
        }
        err
    }

    async fn connect_account(&self, wallet: &dyn Wallet, account: AccountAddress) {
        let provider = self.fresh_provider(wallet);
        self.replace_connection(Connection::connected(provider.clone(), account.clone()))
            .await;
        let signer = provider.signer_for(account);
        self.refresh(&provider, ReadSet::All, VoterLookup::Signer(signer), None)
            .await;
    }

    // A new wrapper per reconfiguration; the wallet's handle is never mutated.
    fn fresh_provider(&self, wallet: &dyn Wallet) -> Provider {
        Provider::new(wallet.transport()).with_receipt_poll_interval(self.config.receipt_poll_interval)
    }

    async fn replace_connection(&self, connection: Connection) {
        let snapshot = {
            let mut state = self.inner.lock().await;
            state.connection = connection;
            state.epoch += 1;
            state.snapshot()
        };
        self.publish(snapshot);
    }

    async fn refresh(
        &self,
        provider: &Provider,
        reads: ReadSet,
        voter: VoterLookup,
        epoch: Option<u64>,
    ) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, ?reads, "session: refresh started");

        let contract = VotingContract::new(self.config.contract_address.clone(), provider.clone());
        let full = reads == ReadSet::All;
        let (chain_id, candidates, voting_open, remaining_time, can_vote) = tokio::join!(
            async {
                if full {
                    read_chain_id(provider).await
                } else {
                    None
                }
            },
            read_candidates(&contract),
            async {
                if full {
                    read_voting_status(&contract).await
                } else {
                    None
                }
            },
            async {
                if full {
                    read_remaining_time(&contract).await
                } else {
                    None
                }
            },
            self.read_can_vote(provider, voter),
        );

        self.apply(
            generation,
            epoch,
            RefreshOutcome {
                chain_id,
                candidates,
                voting_open,
                remaining_time,
                can_vote,
            },
        )
        .await
    }

    async fn read_can_vote(&self, provider: &Provider, voter: VoterLookup) -> Option<bool> {
        let signer = match voter {
            VoterLookup::Skip => return None,
            VoterLookup::Signer(signer) => signer,
            VoterLookup::Discover => match provider.signer().await {
                Ok(Some(signer)) => signer,
                Ok(None) => {
                    debug!("session: no signer available; voter flag unchanged");
                    return None;
                }
                Err(error) => {
                    debug!(%error, "session: signer lookup failed; voter flag unchanged");
                    return None;
                }
            },
        };

        let contract = VotingContract::with_signer(self.config.contract_address.clone(), signer.clone());
        match contract.voters(signer.address()).await {
            Ok(already_voted) => Some(!already_voted),
            Err(error) => {
                warn!(%error, voter = %signer.address(), "session: voter status read failed");
                None
            }
        }
    }

    async fn apply(&self, generation: u64, epoch: Option<u64>, outcome: RefreshOutcome) -> bool {
        let snapshot = {
            let mut state = self.inner.lock().await;
            let latest = self.generation.load(Ordering::SeqCst);
            if latest != generation {
                debug!(generation, latest, "session: discarding stale refresh");
                return false;
            }
            if let Some(epoch) = epoch.filter(|epoch| *epoch != state.epoch) {
                debug!(
                    generation,
                    epoch,
                    current = state.epoch,
                    "session: discarding refresh for a replaced session"
                );
                return false;
            }
            if let Some(chain_id) = outcome.chain_id {
                state.chain_id = Some(chain_id);
            }
            if let Some(candidates) = outcome.candidates {
                state.candidates = candidates;
            }
            if let Some(voting_open) = outcome.voting_open {
                state.voting_open = voting_open;
            }
            if let Some(remaining_time) = outcome.remaining_time {
                state.remaining_time = Some(remaining_time);
            }
            if let Some(can_vote) = outcome.can_vote {
                state.can_vote = can_vote;
            }
            state.snapshot()
        };
        debug!(generation, "session: refresh applied");
        self.publish(snapshot);
        true
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        let _ = self.events.send(SessionEvent::Updated(snapshot));
    }
}

async fn read_chain_id(provider: &Provider) -> Option<ChainId> {
    match provider.chain_id().await {
        Ok(chain_id) => Some(chain_id),
        Err(error) => {
            warn!(%error, "session: chain id read failed");
            None
        }
    }
}

pub async fn read_candidates(contract: &VotingContract) -> Option<Vec<Candidate>> {
    match contract.get_all_votes_of_candidates().await {
        Ok(tallies) => Some(
            tallies
                .into_iter()
                .enumerate()
                .map(|(index, tally)| Candidate {
                    index,
                    name: tally.name,
                    vote_count: tally.vote_count,
                })
                .collect(),
        ),
        Err(error) => {
            warn!(%error, "session: candidate read failed");
            None
        }
    }
}

pub async fn read_voting_status(contract: &VotingContract) -> Option<bool> {
    match contract.get_voting_status().await {
        Ok(open) => Some(open),
        Err(error) => {
            warn!(%error, "session: voting status read failed");
            None
        }
    }
}

pub async fn read_remaining_time(contract: &VotingContract) -> Option<u64> {
    match contract.get_remaining_time().await {
        Ok(remaining) => Some(remaining),
        Err(error) => {
            warn!(%error, "session: remaining time read failed");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
