use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC / EIP-1193 error codes the client reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UserRejected,
    UnsupportedMethod,
    MethodNotFound,
    Other(i64),
}

impl ErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            4001 => Self::UserRejected,
            4200 => Self::UnsupportedMethod,
            -32601 => Self::MethodNotFound,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }
}
