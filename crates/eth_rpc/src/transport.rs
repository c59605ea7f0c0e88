use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::protocol::{RpcRequest, RpcResponse};
use tracing::debug;
use url::Url;

use crate::RpcError;

/// Raw JSON-RPC request surface, as exposed by a wallet or a node endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

pub struct HttpTransport {
    http: Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(url)
            .map_err(|err| RpcError::Transport(format!("invalid rpc url '{url}': {err}")))?;
        Ok(Self {
            http: Client::new(),
            url,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc: sending request");
        let response = self
            .http
            .post(self.url.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;

        match serde_json::from_str::<RpcResponse>(&body) {
            Ok(parsed) => into_result(parsed),
            Err(_) if !status.is_success() => Err(RpcError::Transport(format!(
                "{method} returned http status {status}"
            ))),
            Err(err) => Err(RpcError::Malformed(format!("{method}: {err}"))),
        }
    }
}

pub fn into_result(response: RpcResponse) -> Result<Value, RpcError> {
    if let Some(error) = response.error {
        return Err(RpcError::Rpc(error));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
