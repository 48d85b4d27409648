use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Auth,
    Submit,
    Fetch,
    Config,
}

/// Failure of a single report store operation. None of these are fatal to
/// the process; the caller decides how to surface them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("failed to add report: {0}")]
    Submit(String),
    #[error("failed to fetch reports: {0}")]
    Fetch(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Auth(_) => ErrorCode::Auth,
            Self::Submit(_) => ErrorCode::Submit,
            Self::Fetch(_) => ErrorCode::Fetch,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Auth(message)
            | Self::Submit(message)
            | Self::Fetch(message)
            | Self::Config(message) => message,
        }
    }
}

/// Serializable error shape for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}
