//! In-memory ledger for tests
//!
//! Records every call and serves canned attachments, so the orchestrator
//! and reassembly service can be exercised without a network.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{Attachment, LedgerApi, LedgerError, TaskStatus};

#[derive(Default)]
pub struct FakeLedger {
    next_id: AtomicU64,

    pub created: Mutex<Vec<(String, String, TaskStatus)>>,
    pub links: Mutex<Vec<(String, String)>>,
    pub attached: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub statuses: Mutex<Vec<(String, TaskStatus)>>,
    pub comments: Mutex<Vec<(String, String)>>,

    /// Attachments reported by `get_attachments`, with blob content per URL
    pub remote_attachments: Mutex<Vec<Attachment>>,
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,

    pub fail_create: AtomicBool,
    /// Attaching a file with this exact name fails
    pub fail_attach_named: Mutex<Option<String>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a downloadable remote attachment for reassembly tests.
    pub fn seed_attachment(&self, name: &str, data: &[u8]) {
        let url = format!("https://files.test/blob/{}", name);
        self.remote_attachments.lock().unwrap().push(Attachment {
            title: name.to_string(),
            url: url.clone(),
        });
        self.blobs.lock().unwrap().insert(url, data.to_vec());
    }

    fn refused() -> LedgerError {
        LedgerError::Status {
            operation: "fake",
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[async_trait::async_trait]
impl LedgerApi for FakeLedger {
    async fn create_task(&self, name: &str, status: TaskStatus) -> Result<String, LedgerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::refused());
        }
        let id = format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created
            .lock()
            .unwrap()
            .push((id.clone(), name.to_string(), status));
        Ok(id)
    }

    async fn link_task(&self, domain_task: &str, backup_task: &str) -> Result<(), LedgerError> {
        self.links
            .lock()
            .unwrap()
            .push((domain_task.to_string(), backup_task.to_string()));
        Ok(())
    }

    async fn attach_file(&self, task: &str, file: &Path) -> Result<(), LedgerError> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if self.fail_attach_named.lock().unwrap().as_deref() == Some(name.as_str()) {
            return Err(Self::refused());
        }
        let data = tokio::fs::read(file).await?;
        self.attached
            .lock()
            .unwrap()
            .push((task.to_string(), name, data));
        Ok(())
    }

    async fn set_status(&self, task: &str, status: TaskStatus) -> Result<(), LedgerError> {
        self.statuses
            .lock()
            .unwrap()
            .push((task.to_string(), status));
        Ok(())
    }

    async fn post_comment(&self, task: &str, text: &str) -> Result<(), LedgerError> {
        self.comments
            .lock()
            .unwrap()
            .push((task.to_string(), text.to_string()));
        Ok(())
    }

    async fn get_attachments(&self, _task: &str) -> Result<Vec<Attachment>, LedgerError> {
        Ok(self.remote_attachments.lock().unwrap().clone())
    }

    async fn download_attachment(
        &self,
        attachment: &Attachment,
        dest_dir: &Path,
    ) -> Result<PathBuf, LedgerError> {
        let data = self
            .blobs
            .lock()
            .unwrap()
            .get(&attachment.url)
            .cloned()
            .ok_or_else(Self::refused)?;
        let dest = dest_dir.join(attachment.file_name());
        tokio::fs::write(&dest, data).await?;
        Ok(dest)
    }
}
