use std::fmt;

use shared::error::ApiException;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Create,
    Update,
    Delete,
    Audit,
    Job,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Audit => "audit",
            Self::Job => "job",
        })
    }
}

/// Why a single call to the backend failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend rejected request: {0}")]
    Backend(#[from] ApiException),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Refused before any request was sent.
    #[error("invalid {operation} request: {reason}")]
    InvalidQuery {
        operation: Operation,
        reason: String,
    },
    #[error("failed to fetch {resource}: {source}")]
    FetchFailed {
        resource: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("failed to {operation} {resource}: {source}")]
    MutationFailed {
        resource: &'static str,
        operation: Operation,
        #[source]
        source: TransportError,
    },
    #[error("failed to trigger {job} for {resource}: {source}")]
    JobFailed {
        resource: &'static str,
        job: &'static str,
        #[source]
        source: TransportError,
    },
}

impl ControllerError {
    pub fn operation(&self) -> Operation {
        match self {
            Self::InvalidQuery { operation, .. } => *operation,
            Self::FetchFailed { .. } => Operation::Fetch,
            Self::MutationFailed { operation, .. } => *operation,
            Self::JobFailed { .. } => Operation::Job,
        }
    }
}
