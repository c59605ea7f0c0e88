use std::{collections::HashMap, fs, path::Path, time::Duration};

use tracing::warn;

/// Address of the first contract deployed from the default local dev account.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    pub contract_address: String,
    pub receipt_poll_ms: u64,
    pub wallet_poll_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            contract_address: DEFAULT_CONTRACT_ADDRESS.into(),
            receipt_poll_ms: 1_000,
            wallet_poll_ms: 2_000,
        }
    }
}

impl Settings {
    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn wallet_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wallet_poll_ms)
    }
}

pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, toml::Value>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            warn!(%error, "config: ignoring unreadable settings file");
            return;
        }
    };

    if let Some(v) = file_cfg.get("rpc_url").and_then(toml::Value::as_str) {
        settings.rpc_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("contract_address").and_then(toml::Value::as_str) {
        settings.contract_address = v.to_string();
    }
    if let Some(v) = file_cfg.get("receipt_poll_ms").and_then(as_millis) {
        settings.receipt_poll_ms = v;
    }
    if let Some(v) = file_cfg.get("wallet_poll_ms").and_then(as_millis) {
        settings.wallet_poll_ms = v;
    }
}

fn as_millis(value: &toml::Value) -> Option<u64> {
    value
        .as_integer()
        .and_then(|v| u64::try_from(v).ok())
        .or_else(|| value.as_str().and_then(|v| v.parse().ok()))
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("VOTER_RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = lookup("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = lookup("VOTER_CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }
    if let Some(v) = lookup("APP__CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }

    if let Some(v) = lookup("APP__RECEIPT_POLL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.receipt_poll_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__WALLET_POLL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.wallet_poll_ms = parsed;
        }
    }
}
