//! Typed binding for the deployed voting contract.
//!
//! The ABI is embedded at build time and every call is encoded through `ethabi`,
//! so selectors and argument layout match the on-chain contract byte for byte.

use std::sync::OnceLock;

use eth_rpc::{decode_hex, encode_hex, Provider, RpcError, Signer};
use ethabi::{Contract, Function, ParamType, Token};
use serde_json::Value;
use shared::{
    domain::{AccountAddress, TxHash},
    error::RpcErrorObject,
    protocol::{CallRequest, TransactionReceipt},
};
use thiserror::Error;
use tracing::{debug, info};

pub const VOTING_ABI_JSON: &str = include_str!("abi.json");

/// Selector of the standard `Error(string)` revert payload.
pub const REVERT_ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const GET_ALL_VOTES: &str = "getAllVotesOfCandiates";
const GET_VOTING_STATUS: &str = "getVotingStatus";
const GET_REMAINING_TIME: &str = "getRemainingTime";
const VOTERS: &str = "voters";
const VOTE: &str = "vote";

static VOTING_ABI: OnceLock<Contract> = OnceLock::new();

pub fn voting_abi() -> Result<&'static Contract, ContractError> {
    if let Some(abi) = VOTING_ABI.get() {
        return Ok(abi);
    }
    let parsed = Contract::load(VOTING_ABI_JSON.as_bytes())?;
    Ok(VOTING_ABI.get_or_init(|| parsed))
}

fn function(name: &str) -> Result<&'static Function, ContractError> {
    Ok(voting_abi()?.function(name)?)
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("abi error: {0}")]
    Abi(#[from] ethabi::Error),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("execution reverted{}", describe_reason(.reason))]
    Reverted {
        reason: Option<String>,
        tx_hash: Option<TxHash>,
    },
    #[error("{function} returned an unexpected output shape")]
    UnexpectedOutput { function: &'static str },
    #[error("{field} does not fit in 64 bits")]
    Overflow { field: &'static str },
    #[error("no signer available to send {function}")]
    MissingSigner { function: &'static str },
}

fn describe_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

impl ContractError {
    /// Revert reason supplied by the contract, if one can be recovered.
    pub fn revert_reason(&self) -> Option<String> {
        match self {
            Self::Reverted { reason, .. } => reason.clone(),
            Self::Rpc(err) => err.error_object().and_then(revert_reason_from_error),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Rpc(err) if err.is_user_rejection())
    }
}

pub fn revert_reason_from_error(error: &RpcErrorObject) -> Option<String> {
    if let Some(reason) = error
        .data
        .as_ref()
        .and_then(revert_data)
        .and_then(|data| decode_revert_data(&data))
    {
        return Some(reason);
    }
    error
        .message
        .split_once("execution reverted:")
        .map(|(_, reason)| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
}

// Wallets nest the payload differently: a bare hex string, `{data}`, or `{originalError: {data}}`.
fn revert_data(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(raw) => decode_hex(raw).ok(),
        Value::Object(map) => map
            .get("data")
            .and_then(revert_data)
            .or_else(|| map.get("originalError").and_then(revert_data)),
        _ => None,
    }
}

pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(REVERT_ERROR_SELECTOR.as_slice())?;
    match ethabi::decode(&[ParamType::String], payload)
        .ok()?
        .into_iter()
        .next()?
    {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub name: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone)]
pub struct VotingContract {
    address: AccountAddress,
    provider: Provider,
    signer: Option<Signer>,
}

impl VotingContract {
    /// Read-only binding; `vote` fails with `MissingSigner`.
    pub fn new(address: AccountAddress, provider: Provider) -> Self {
        Self {
            address,
            provider,
            signer: None,
        }
    }

    pub fn with_signer(address: AccountAddress, signer: Signer) -> Self {
        Self {
            address,
            provider: signer.provider().clone(),
            signer: Some(signer),
        }
    }

    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    async fn call_view(
        &self,
        name: &'static str,
        args: &[Token],
    ) -> Result<Vec<Token>, ContractError> {
        let abi_fn = function(name)?;
        let data = abi_fn.encode_input(args)?;
        let output = self
            .provider
            .call(&CallRequest {
                from: self.signer.as_ref().map(|signer| signer.address().clone()),
                to: self.address.clone(),
                data: encode_hex(&data),
            })
            .await?;
        debug!(function = name, bytes = output.len(), "contract: view call returned");
        Ok(abi_fn.decode_output(&output)?)
    }

    pub async fn get_all_votes_of_candidates(&self) -> Result<Vec<CandidateTally>, ContractError> {
        let unexpected = || ContractError::UnexpectedOutput {
            function: GET_ALL_VOTES,
        };
        let Token::Array(entries) = single(self.call_view(GET_ALL_VOTES, &[]).await?, GET_ALL_VOTES)?
        else {
            return Err(unexpected());
        };

        entries
            .into_iter()
            .map(|entry| match entry {
                Token::Tuple(fields) => {
                    let mut fields = fields.into_iter();
                    match (fields.next(), fields.next()) {
                        (Some(Token::String(name)), Some(count)) => Ok(CandidateTally {
                            name,
                            vote_count: into_u64(count, "voteCount", GET_ALL_VOTES)?,
                        }),
                        _ => Err(unexpected()),
                    }
                }
                _ => Err(unexpected()),
            })
            .collect()
    }

    pub async fn get_voting_status(&self) -> Result<bool, ContractError> {
        match single(
            self.call_view(GET_VOTING_STATUS, &[]).await?,
            GET_VOTING_STATUS,
        )? {
            Token::Bool(open) => Ok(open),
            _ => Err(ContractError::UnexpectedOutput {
                function: GET_VOTING_STATUS,
            }),
        }
    }

    pub async fn get_remaining_time(&self) -> Result<u64, ContractError> {
        let token = single(
            self.call_view(GET_REMAINING_TIME, &[]).await?,
            GET_REMAINING_TIME,
        )?;
        into_u64(token, "remainingTime", GET_REMAINING_TIME)
    }

    /// `true` when the contract has recorded a vote from `voter`.
    pub async fn voters(&self, voter: &AccountAddress) -> Result<bool, ContractError> {
        let arg = Token::Address(ethabi::Address::from_slice(&voter.to_bytes()));
        match single(self.call_view(VOTERS, &[arg]).await?, VOTERS)? {
            Token::Bool(voted) => Ok(voted),
            _ => Err(ContractError::UnexpectedOutput { function: VOTERS }),
        }
    }

    pub async fn vote(&self, candidate_index: u64) -> Result<PendingVote, ContractError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(ContractError::MissingSigner { function: VOTE })?;
        let data = function(VOTE)?.encode_input(&[Token::Uint(candidate_index.into())])?;
        let tx_hash = signer.send_transaction(&self.address, &data).await?;
        info!(
            %tx_hash,
            candidate_index,
            voter = %signer.address(),
            "contract: vote submitted"
        );
        Ok(PendingVote {
            tx_hash,
            call: CallRequest {
                from: Some(signer.address().clone()),
                to: self.address.clone(),
                data: encode_hex(&data),
            },
            provider: signer.provider().clone(),
        })
    }
}

/// A submitted vote transaction awaiting confirmation.
#[derive(Debug)]
pub struct PendingVote {
    tx_hash: TxHash,
    call: CallRequest,
    provider: Provider,
}

impl PendingVote {
    pub fn tx_hash(&self) -> &TxHash {
        &self.tx_hash
    }

    /// Waits for the receipt. A reverted receipt is replayed with `eth_call`
    /// at its block to recover the revert reason.
    pub async fn wait(self) -> Result<TransactionReceipt, ContractError> {
        let receipt = self.provider.wait_for_receipt(&self.tx_hash).await?;
        if receipt.succeeded() {
            info!(tx_hash = %self.tx_hash, "contract: vote confirmed");
            return Ok(receipt);
        }

        let block = receipt
            .block_number
            .clone()
            .unwrap_or_else(|| "latest".to_string());
        let reason = match self.provider.call_at(&self.call, &block).await {
            Ok(_) => None,
            Err(err) => err.error_object().and_then(revert_reason_from_error),
        };
        Err(ContractError::Reverted {
            reason,
            tx_hash: Some(self.tx_hash),
        })
    }
}

fn single(tokens: Vec<Token>, function: &'static str) -> Result<Token, ContractError> {
    tokens
        .into_iter()
        .next()
        .ok_or(ContractError::UnexpectedOutput { function })
}

fn into_u64(token: Token, field: &'static str, function: &'static str) -> Result<u64, ContractError> {
    match token {
        Token::Uint(value) if value.bits() > 64 => Err(ContractError::Overflow { field }),
        Token::Uint(value) => Ok(value.low_u64()),
        _ => Err(ContractError::UnexpectedOutput { function }),
    }
}

#[cfg(test)]
#[path = "tests/contract_tests.rs"]
mod tests;
