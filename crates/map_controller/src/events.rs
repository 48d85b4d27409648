//! Controller events and error modeling for the presentation layer.

use serde::Serialize;
use shared::{
    domain::Report,
    error::{ErrorCode, StoreError},
};

use crate::state::ControllerStatus;

/// What a presentation layer renders as a marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

impl From<&Report> for Pin {
    fn from(report: &Report) -> Self {
        Self {
            latitude: report.latitude,
            longitude: report.longitude,
            timestamp: report.timestamp.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(ControllerStatus),
    PinsUpdated { pins: Vec<Pin>, skipped_rows: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorContext {
    Load,
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerError {
    code: ErrorCode,
    category: ErrorCategory,
    context: ErrorContext,
    message: String,
}

impl ControllerError {
    pub fn from_store_error(context: ErrorContext, err: &StoreError) -> Self {
        let category = match err {
            StoreError::Auth(_) => ErrorCategory::Auth,
            StoreError::Config(_) => ErrorCategory::Validation,
            StoreError::Submit(detail) | StoreError::Fetch(detail) => classify_detail(detail),
        };

        Self {
            code: err.code(),
            category,
            context,
            message: err.to_string(),
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == ErrorCategory::Auth
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn context(&self) -> ErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

fn classify_detail(detail: &str) -> ErrorCategory {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthenticated")
        || lower.contains("permission")
    {
        ErrorCategory::Auth
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connect")
        || lower.contains("transport")
        || lower.contains("unavailable")
    {
        ErrorCategory::Transport
    } else if lower.contains("outside")
        || lower.contains("invalid")
        || lower.contains("malformed")
    {
        ErrorCategory::Validation
    } else {
        ErrorCategory::Unknown
    }
}
