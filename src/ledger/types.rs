//! Ledger wire types

use serde::{Deserialize, Serialize};

/// Task status as the ledger spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Complete,
}

impl TaskStatus {
    /// Wire representation expected by the ledger API
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in progress",
            TaskStatus::Complete => "complete",
        }
    }
}

/// One remote attachment on a ledger task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment file name as the ledger reports it
    pub title: String,

    /// Fully qualified download URL
    pub url: String,
}

impl Attachment {
    /// File name to store the download under: the URL's last path segment,
    /// falling back to the reported title.
    pub fn file_name(&self) -> &str {
        self.url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.title)
    }
}

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ledger returned {status} for {operation}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("Malformed ledger response: {0}")]
    MalformedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
