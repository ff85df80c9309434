//! Remote task ledger client
//!
//! The ledger is an external task-tracking system (ClickUp-compatible API)
//! that represents one backup transfer per task: created at detection,
//! linked to its domain task, fed attachments, and closed when all parts
//! have landed. Everything here is single-shot; a failed call is logged by
//! the caller and never retried.

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod types;

pub use client::HttpLedgerClient;
pub use types::{Attachment, LedgerError, TaskStatus};

use std::path::{Path, PathBuf};

/// Operations the transfer core needs from the remote ledger.
///
/// A trait seam so the orchestrator and reassembly service can run against
/// an in-memory fake in tests.
#[async_trait::async_trait]
pub trait LedgerApi: Send + Sync {
    /// Create a task on the backups list. Returns the new task id.
    async fn create_task(&self, name: &str, status: TaskStatus) -> Result<String, LedgerError>;

    /// Link a backup task into the domain task's backups custom field.
    async fn link_task(&self, domain_task: &str, backup_task: &str) -> Result<(), LedgerError>;

    /// Attach a local file to a task (multipart upload).
    async fn attach_file(&self, task: &str, file: &Path) -> Result<(), LedgerError>;

    /// Update a task's status.
    async fn set_status(&self, task: &str, status: TaskStatus) -> Result<(), LedgerError>;

    /// Post a comment on a task.
    async fn post_comment(&self, task: &str, text: &str) -> Result<(), LedgerError>;

    /// List a task's attachments.
    async fn get_attachments(&self, task: &str) -> Result<Vec<Attachment>, LedgerError>;

    /// Download one attachment into `dest_dir`, named after the URL's last
    /// path segment. Returns the downloaded path.
    async fn download_attachment(
        &self,
        attachment: &Attachment,
        dest_dir: &Path,
    ) -> Result<PathBuf, LedgerError>;
}
