use std::{fmt, sync::Arc, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::{AccountAddress, ChainId, TxHash},
    protocol::{CallRequest, TransactionReceipt},
};
use tracing::debug;

use crate::{decode_hex, encode_hex, RpcError, RpcTransport};

pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read-only view of a chain through one transport. Cheap to clone; a fresh
/// `Provider` is built around the transport whenever the wallet reconfigures.
#[derive(Clone)]
pub struct Provider {
    transport: Arc<dyn RpcTransport>,
    receipt_poll_interval: Duration,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("receipt_poll_interval", &self.receipt_poll_interval)
            .finish_non_exhaustive()
    }
}

impl Provider {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let value = self.transport.request(method, params).await?;
        serde_json::from_value(value).map_err(|err| RpcError::Malformed(format!("{method}: {err}")))
    }

    pub async fn chain_id(&self) -> Result<ChainId, RpcError> {
        let raw: String = self.request("eth_chainId", json!([])).await?;
        ChainId::parse(&raw).map_err(|err| RpcError::Malformed(err.to_string()))
    }

    /// Accounts already authorized for this origin; never prompts.
    pub async fn accounts(&self) -> Result<Vec<AccountAddress>, RpcError> {
        self.request("eth_accounts", json!([])).await
    }

    /// Asks the wallet for account access; may prompt and may be rejected.
    pub async fn request_accounts(&self) -> Result<Vec<AccountAddress>, RpcError> {
        self.request("eth_requestAccounts", json!([])).await
    }

    pub async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, RpcError> {
        self.call_at(call, "latest").await
    }

    pub async fn call_at(&self, call: &CallRequest, block: &str) -> Result<Vec<u8>, RpcError> {
        let raw: String = self.request("eth_call", json!([call, block])).await?;
        decode_hex(&raw)
    }

    pub async fn send_transaction(&self, tx: &CallRequest) -> Result<TxHash, RpcError> {
        self.request("eth_sendTransaction", json!([tx])).await
    }

    pub async fn transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.request("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    /// Polls until the transaction is mined. There is no upper bound on the wait.
    pub async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TransactionReceipt, RpcError> {
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            debug!(tx_hash = %hash, "rpc: transaction pending");
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }

    /// Signer for the first authorized account, if the wallet exposes one.
    pub async fn signer(&self) -> Result<Option<Signer>, RpcError> {
        Ok(self
            .accounts()
            .await?
            .into_iter()
            .next()
            .map(|address| self.signer_for(address)))
    }

    pub fn signer_for(&self, address: AccountAddress) -> Signer {
        Signer {
            provider: self.clone(),
            address,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Signer {
    provider: Provider,
    address: AccountAddress,
}

impl Signer {
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub async fn send_transaction(
        &self,
        to: &AccountAddress,
        data: &[u8],
    ) -> Result<TxHash, RpcError> {
        self.provider
            .send_transaction(&CallRequest {
                from: Some(self.address.clone()),
                to: to.clone(),
                data: encode_hex(data),
            })
            .await
    }
}
