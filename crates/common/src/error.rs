//! Error types for CAST
//!
//! Every failure that can reach a request boundary is one variant of [`Error`].
//! Each variant carries a stable machine-readable code, a status code and a
//! details template, so collaborators can build a rejection without matching
//! on message text.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type used throughout CAST
pub type Result<T> = std::result::Result<T, Error>;

/// Request-level error kinds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed or incomplete request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The chain snapshot client failed or timed out
    #[error("Error fetching balance: {0}")]
    BalanceFetchError(String),

    /// The voter's weight is below the strategy threshold
    #[error("Insufficient balance: minimum {required} {token}")]
    InsufficientBalance { required: Decimal, token: String },

    /// The caller lacks the role or delegation for the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No strategy is registered under the given name
    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    /// A vote already exists for the (proposal, address) pair
    #[error("Address {addr} has already voted for proposal {proposal_id}")]
    AlreadyVoted { addr: String, proposal_id: u64 },

    /// The proposal is not accepting votes or status changes
    #[error("Proposal {0} is not active")]
    InactiveProposal(u64),

    /// Community lookup failed
    #[error("Community not found: {0}")]
    CommunityNotFound(u64),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A signature did not verify
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// The signed timestamp is outside the freshness window
    #[error("Timestamp {timestamp} is outside the accepted window")]
    ExpiredTimestamp { timestamp: u64 },

    /// Valid signatures did not reach the account's signing threshold
    #[error("Insufficient key weight: {have} of {required}")]
    InsufficientKeyWeight { have: u32, required: u32 },

    /// Awarding achievements for a closed proposal failed
    #[error("Achievement error: {0}")]
    AchievementComputeError(String),

    /// Proposal lookup failed
    #[error("Proposal not found: {0}")]
    ProposalNotFound(u64),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Error::InvalidRequest(msg.into())
    }

    /// Create a new forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Error::Forbidden(msg.into())
    }

    /// Create a new invalid signature error
    pub fn invalid_signature<S: Into<String>>(msg: S) -> Self {
        Error::InvalidSignature(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "ERR_1001",
            Error::BalanceFetchError(_) => "ERR_1003",
            Error::InsufficientBalance { .. } => "ERR_1004",
            Error::Forbidden(_) => "ERR_1005",
            Error::StrategyNotFound(_) => "ERR_1008",
            Error::AlreadyVoted { .. } => "ERR_1009",
            Error::InactiveProposal(_) => "ERR_1010",
            Error::CommunityNotFound(_) => "ERR_1011",
            Error::Storage(_) => "ERR_1012",
            Error::InvalidSignature(_) => "ERR_1013",
            Error::ExpiredTimestamp { .. } => "ERR_1014",
            Error::InsufficientKeyWeight { .. } => "ERR_1015",
            Error::AchievementComputeError(_) => "ERR_1016",
            Error::ProposalNotFound(_) => "ERR_1017",
            Error::Internal(_) => "ERR_1018",
        }
    }

    /// HTTP status a transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidRequest(_)
            | Error::BalanceFetchError(_)
            | Error::AlreadyVoted { .. }
            | Error::InactiveProposal(_) => 400,
            Error::InsufficientBalance { .. }
            | Error::InvalidSignature(_)
            | Error::ExpiredTimestamp { .. }
            | Error::InsufficientKeyWeight { .. } => 401,
            Error::Forbidden(_) => 403,
            Error::StrategyNotFound(_)
            | Error::CommunityNotFound(_)
            | Error::ProposalNotFound(_) => 404,
            Error::Storage(_) | Error::AchievementComputeError(_) | Error::Internal(_) => 500,
        }
    }

    /// Short human-readable title
    pub fn message(&self) -> &'static str {
        match self {
            Error::BalanceFetchError(_) => "Error Fetching Balance",
            Error::InsufficientBalance { .. } => "Insufficient Balance",
            Error::Forbidden(_) => "Forbidden",
            Error::StrategyNotFound(_) => "Strategy Not Found",
            Error::InvalidSignature(_) => "Invalid Signature",
            Error::ExpiredTimestamp { .. } => "Expired Timestamp",
            Error::InsufficientKeyWeight { .. } => "Insufficient Key Weight",
            _ => "Error",
        }
    }

    /// User-facing details rendered from the variant's template
    pub fn details(&self) -> String {
        match self {
            Error::InvalidRequest(_) => {
                "There was an error trying to complete your request".to_string()
            }
            Error::BalanceFetchError(_) => {
                "While confirming your balance, we've encountered an error connecting to the chain."
                    .to_string()
            }
            Error::InsufficientBalance { required, token } => format!(
                "In order to vote on this proposal you must have a minimum balance of {} {} tokens in your wallet.",
                required, token
            ),
            Error::Forbidden(_) => "You are not authorized to perform this action.".to_string(),
            Error::StrategyNotFound(_) => {
                "The strategy name you are trying to use no longer exists.".to_string()
            }
            Error::AlreadyVoted { addr, proposal_id } => format!(
                "Address {} has already voted for proposal {}.",
                addr, proposal_id
            ),
            Error::InactiveProposal(_) => "Cannot vote on an inactive proposal.".to_string(),
            Error::CommunityNotFound(_) => {
                "There was an error retrieving the community.".to_string()
            }
            Error::Storage(_) => "There was an error creating the vote.".to_string(),
            Error::InvalidSignature(_) => "The provided signature is invalid.".to_string(),
            Error::ExpiredTimestamp { .. } => {
                "The signed request has expired, please sign again.".to_string()
            }
            Error::InsufficientKeyWeight { .. } => {
                "The provided signatures do not meet the account's key weight threshold."
                    .to_string()
            }
            Error::AchievementComputeError(_) => {
                "There was an error calculating achievements.".to_string()
            }
            Error::ProposalNotFound(_) => "The proposal could not be found.".to_string(),
            Error::Internal(_) => "An internal error occurred.".to_string(),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BalanceFetchError(_) | Error::AchievementComputeError(_)
        )
    }

    /// Build the serializable rejection for this error
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status_code: self.status_code(),
            error_code: self.code().to_string(),
            message: self.message().to_string(),
            details: self.details(),
        }
    }
}

/// Serializable rejection body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub error_code: String,
    pub message: String,
    pub details: String,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {}", err))
    }
}
