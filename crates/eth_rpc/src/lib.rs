//! JSON-RPC plumbing between the voting client and an Ethereum-style node or wallet.

use shared::error::{ErrorCode, RpcErrorObject};
use thiserror::Error;

mod provider;
pub mod transport;

pub use provider::{Provider, Signer, DEFAULT_RECEIPT_POLL_INTERVAL};
pub use transport::{HttpTransport, RpcTransport};

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("rpc transport failure: {0}")]
    Transport(String),
    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(RpcErrorObject),
    #[error("malformed rpc response: {0}")]
    Malformed(String),
}

impl RpcError {
    pub fn error_object(&self) -> Option<&RpcErrorObject> {
        match self {
            Self::Rpc(object) => Some(object),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.error_object().map(RpcErrorObject::error_code)
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(ErrorCode::UserRejected)
    }

    pub fn is_method_not_found(&self) -> bool {
        matches!(
            self.code(),
            Some(ErrorCode::MethodNotFound) | Some(ErrorCode::UnsupportedMethod)
        )
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes node-supplied hex data; `"0x"` is the empty byte string.
pub fn decode_hex(raw: &str) -> Result<Vec<u8>, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|err| RpcError::Malformed(format!("invalid hex data '{raw}': {err}")))
}
