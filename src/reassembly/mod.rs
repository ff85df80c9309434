//! Ephemeral reassembly of previously split backups
//!
//! On demand, downloads every attachment of a ledger task into a fresh
//! working directory, merges the parts back into the original archive, and
//! exposes it under a time-limited download URL. The working directory is
//! removed by a one-shot deferred job after a fixed TTL whether or not the
//! artifact was ever fetched; the downloaded part files are removed as soon
//! as the merge has consumed them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chunk::{merge_parts, ChunkError};
use crate::ledger::{LedgerApi, LedgerError};
use crate::state::{AppState, WorkdirRegistry};

/// Reassembly error types
#[derive(Debug, thiserror::Error)]
pub enum ReassemblyError {
    #[error("Task has no attachments: {0}")]
    NoAttachments(String),

    #[error("Merge produced no output for task {0}")]
    MergeFailed(String),

    #[error("Ledger call failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Chunking failed: {0}")]
    Chunk(#[from] ChunkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A merged artifact ready for download until its TTL fires
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedDownload {
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReassemblyService {
    ledger: Arc<dyn LedgerApi>,
    workdirs: WorkdirRegistry,
    temp_dir: PathBuf,
    public_base_url: String,
    ttl: Duration,
}

impl ReassemblyService {
    pub fn new(state: &AppState) -> Self {
        let config = state.config();
        Self {
            ledger: state.ledger(),
            workdirs: state.workdirs().clone(),
            temp_dir: config.server.temp_dir.clone(),
            public_base_url: config.server.public_base_url.clone(),
            ttl: config.transfer.reassembly_ttl,
        }
    }

    /// Download a task's parts, merge them, and return the retrieval link.
    pub async fn reassemble(&self, task_id: &str) -> Result<MergedDownload, ReassemblyError> {
        let attachments = self.ledger.get_attachments(task_id).await?;
        if attachments.is_empty() {
            return Err(ReassemblyError::NoAttachments(task_id.to_string()));
        }

        let workdir_id = Uuid::new_v4().to_string();
        let workdir = self.temp_dir.join(&workdir_id);
        tokio::fs::create_dir_all(&workdir).await?;
        self.workdirs.register(&workdir).await;

        tracing::info!(
            task_id = %task_id,
            attachments = attachments.len(),
            workdir = %workdir.display(),
            "Downloading attachments for reassembly"
        );

        let mut part_files = Vec::with_capacity(attachments.len());
        for attachment in &attachments {
            let part = self
                .ledger
                .download_attachment(attachment, &workdir)
                .await?;
            part_files.push(part);
        }

        // Merge discovers the rest of the family from the first part
        let merged = merge_parts(&part_files[0]).await?;
        match tokio::fs::metadata(&merged).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => return Err(ReassemblyError::MergeFailed(task_id.to_string())),
        }

        // The downloads are consumed; only the merged artifact stays
        for part in &part_files {
            if let Err(e) = tokio::fs::remove_file(part).await {
                tracing::warn!(part = %part.display(), error = %e, "Could not remove downloaded part");
            }
        }

        let merged_name = merged
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("backup")
            .to_string();
        let download_url = format!(
            "{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            workdir_id,
            merged_name
        );
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        self.schedule_cleanup(workdir.clone());

        // Best effort: the link is still valid if the comment fails
        let comment = format!("Download link (valid for 1 hour): {}", download_url);
        if let Err(e) = self.ledger.post_comment(task_id, &comment).await {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to post download link comment");
        }

        tracing::info!(
            task_id = %task_id,
            url = %download_url,
            expires_at = %expires_at,
            "Reassembly complete"
        );

        Ok(MergedDownload {
            download_url,
            expires_at,
        })
    }

    /// One-shot deferred deletion of the whole working directory.
    fn schedule_cleanup(&self, workdir: PathBuf) {
        let ttl = self.ttl;
        let workdirs = self.workdirs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            match tokio::fs::remove_dir_all(&workdir).await {
                Ok(()) => {
                    tracing::info!(dir = %workdir.display(), "Expired reassembly directory removed")
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(dir = %workdir.display(), error = %e, "Failed to remove expired directory")
                }
            }
            workdirs.deregister(&workdir).await;
        });
    }
}
