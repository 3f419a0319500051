use crate::amount::AmountError;
use crate::reduce::Disagreement;
use crate::types::{PartialExecutionState, ProviderId};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("providers `{left}` and `{right}` disagree on {operation}: {detail}")]
    Conflict {
        operation: &'static str,
        left: ProviderId,
        right: ProviderId,
        detail: Disagreement,
    },

    #[error("provider `{provider}` failed: {source}")]
    Provider {
        provider: ProviderId,
        #[source]
        source: Box<CoreError>,
    },

    #[error("no provider returned a result for {operation}")]
    NoProviderResult { operation: &'static str },

    #[error("broadcast failed on all {attempted} attempted providers")]
    BroadcastFailed { attempted: usize },

    #[error("{operation} failed on provider `{}` after {} provider(s) succeeded: {source}", .partial.failed, .partial.succeeded.len())]
    Handler {
        operation: &'static str,
        #[source]
        source: Box<CoreError>,
        partial: Box<PartialExecutionState>,
    },

    #[error("cannot reduce provider results: {0}")]
    ResultReduction(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("key custody: {0}")]
    KeyCustody(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Partial execution details, when this error came out of a
    /// multi-provider mutation.
    pub fn partial_execution(&self) -> Option<&PartialExecutionState> {
        match self {
            Self::Handler { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON-RPC server error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("invalid JSON-RPC response: {0}")]
    InvalidResponse(String),
}
