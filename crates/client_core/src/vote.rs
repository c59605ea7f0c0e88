use thiserror::Error;
use voting_contract::ContractError;

pub const INVALID_INDEX_MESSAGE: &str = "Please enter a valid candidate index";
pub const NO_SIGNER_MESSAGE: &str = "Connect a wallet account before voting";
pub const GENERIC_VOTE_FAILURE: &str = "Vote failed";

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("invalid candidate index '{0}'")]
    InvalidIndex(String),
    #[error("no signer available to submit the vote")]
    NoSigner,
    #[error("vote submission failed: {0}")]
    Submission(#[source] ContractError),
    #[error("vote confirmation failed: {0}")]
    Confirmation(#[source] ContractError),
}

impl VoteError {
    /// Short message for the user. `None` when the user declined in the
    /// wallet, which already showed its own prompt.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::InvalidIndex(_) => Some(INVALID_INDEX_MESSAGE.to_string()),
            Self::NoSigner => Some(NO_SIGNER_MESSAGE.to_string()),
            Self::Submission(source) | Self::Confirmation(source) => {
                if source.is_user_rejection() {
                    return None;
                }
                Some(
                    source
                        .revert_reason()
                        .map(|reason| format!("{GENERIC_VOTE_FAILURE}: {reason}"))
                        .unwrap_or_else(|| GENERIC_VOTE_FAILURE.to_string()),
                )
            }
        }
    }
}

pub fn parse_candidate_index(raw: &str) -> Result<u64, VoteError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| VoteError::InvalidIndex(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eth_rpc::RpcError;
    use shared::error::RpcErrorObject;

    #[test]
    fn parses_plain_integers_only() {
        assert_eq!(parse_candidate_index("2").expect("index"), 2);
        assert_eq!(parse_candidate_index(" 7 ").expect("index"), 7);
        for raw in ["abc", "", "-1", "1.5", "2x"] {
            let err = parse_candidate_index(raw).expect_err(raw);
            assert_eq!(err.user_message().as_deref(), Some(INVALID_INDEX_MESSAGE));
        }
    }

    #[test]
    fn prefers_revert_reason_over_generic_message() {
        let reverted = VoteError::Confirmation(ContractError::Reverted {
            reason: Some("You have already voted".into()),
            tx_hash: None,
        });
        assert_eq!(
            reverted.user_message().as_deref(),
            Some("Vote failed: You have already voted")
        );

        let opaque = VoteError::Submission(ContractError::Rpc(RpcError::Transport(
            "connection reset".into(),
        )));
        assert_eq!(opaque.user_message().as_deref(), Some(GENERIC_VOTE_FAILURE));
    }

    #[test]
    fn wallet_rejection_has_no_extra_message() {
        let rejected = VoteError::Submission(ContractError::Rpc(RpcError::Rpc(
            RpcErrorObject::new(4001, "User denied transaction signature."),
        )));
        assert_eq!(rejected.user_message(), None);
    }
}
