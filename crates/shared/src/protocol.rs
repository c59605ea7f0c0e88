use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{AccountAddress, TxHash},
    error::RpcErrorObject,
};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

/// Call object shared by `eth_call` and `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<AccountAddress>,
    pub to: AccountAddress,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TransactionReceipt {
    /// Pre-Byzantium receipts carry no status; those are treated as success.
    pub fn succeeded(&self) -> bool {
        !matches!(self.status.as_deref(), Some("0x0") | Some("0x00"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_status_zero_is_failure() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x10",
            "status": "0x0",
            "gasUsed": "0x5208"
        }))
        .expect("receipt");
        assert!(!receipt.succeeded());
        assert_eq!(receipt.block_number.as_deref(), Some("0x10"));
    }

    #[test]
    fn call_request_omits_missing_sender() {
        let call = CallRequest {
            from: None,
            to: AccountAddress::from_bytes([7; 20]),
            data: "0x1234".into(),
        };
        let value = serde_json::to_value(&call).expect("encode");
        assert!(value.get("from").is_none());
        assert_eq!(value["data"], "0x1234");
    }
}
