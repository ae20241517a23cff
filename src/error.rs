use serde_json::json;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failure kinds surfaced by the roster, attendance and registry modules.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{message}")]
    NotFound { message: String, ids: Vec<String> },

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            ids: Vec::new(),
        }
    }

    pub fn not_found_ids(message: impl Into<String>, ids: Vec<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            ids,
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::AccessDenied(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Stable wire code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound { ids, .. } if !ids.is_empty() => Some(json!({ "ids": ids })),
            _ => None,
        }
    }
}
