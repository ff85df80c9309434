//! HTTP ledger client
//!
//! Thin reqwest wrapper around the ClickUp-compatible task API. Every call
//! carries the configured credential and treats any non-2xx response as a
//! failure; callers decide what a failure means for their state machine.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use crate::config::LedgerConfig;

use super::types::{Attachment, LedgerError, TaskStatus};
use super::LedgerApi;

#[derive(Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Deserialize)]
struct TaskDetail {
    #[serde(default)]
    attachments: Vec<AttachmentDetail>,
}

#[derive(Deserialize)]
struct AttachmentDetail {
    #[serde(default)]
    title: String,
    url_w_host: String,
}

/// Ledger client backed by a shared reqwest client
#[derive(Clone)]
pub struct HttpLedgerClient {
    http: reqwest::Client,
    config: LedgerConfig,
}

impl HttpLedgerClient {
    /// Wrap a shared HTTP client with ledger credentials and endpoints.
    ///
    /// The client is constructed once in main with the configured timeouts
    /// and passed in explicitly, keeping the transfer core testable.
    pub fn new(http: reqwest::Client, config: LedgerConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn check(
        operation: &'static str,
        response: &reqwest::Response,
    ) -> Result<(), LedgerError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LedgerError::Status {
                operation,
                status: response.status(),
            })
        }
    }
}

#[async_trait::async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn create_task(&self, name: &str, status: TaskStatus) -> Result<String, LedgerError> {
        let response = self
            .http
            .post(self.url(&format!("list/{}/task", self.config.backups_list)))
            .header("Authorization", &self.config.api_key)
            .json(&json!({ "name": name, "status": status.as_str() }))
            .send()
            .await?;
        Self::check("create_task", &response)?;

        let created: CreatedTask = response.json().await?;
        tracing::info!(task_id = %created.id, name = %name, "Created ledger task");
        Ok(created.id)
    }

    async fn link_task(&self, domain_task: &str, backup_task: &str) -> Result<(), LedgerError> {
        let response = self
            .http
            .post(self.url(&format!(
                "task/{}/field/{}",
                domain_task, self.config.domain_field
            )))
            .header("Authorization", &self.config.api_key)
            .json(&json!({ "value": { "add": [backup_task] } }))
            .send()
            .await?;
        Self::check("link_task", &response)?;

        tracing::debug!(
            domain_task = %domain_task,
            backup_task = %backup_task,
            "Linked backup task to domain task"
        );
        Ok(())
    }

    async fn attach_file(&self, task: &str, file: &Path) -> Result<(), LedgerError> {
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LedgerError::MalformedResponse(format!(
                "attachment path has no file name: {}",
                file.display()
            )))?
            .to_string();

        let size = tokio::fs::metadata(file).await?.len();
        let handle = tokio::fs::File::open(file).await?;

        // Parts can be hundreds of MiB; stream the body, never buffer it
        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::from(handle),
            size,
        )
        .file_name(file_name.clone())
        .mime_str("application/octet-stream")?;

        let form = reqwest::multipart::Form::new().part("attachment", part);

        let response = self
            .http
            .post(self.url(&format!("task/{}/attachment", task)))
            .header("Authorization", &self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::check("attach_file", &response)?;

        tracing::info!(task_id = %task, file = %file_name, size = size, "Attached file");
        Ok(())
    }

    async fn set_status(&self, task: &str, status: TaskStatus) -> Result<(), LedgerError> {
        let response = self
            .http
            .put(self.url(&format!("task/{}", task)))
            .header("Authorization", &self.config.api_key)
            .json(&json!({ "status": status.as_str() }))
            .send()
            .await?;
        Self::check("set_status", &response)?;

        tracing::info!(task_id = %task, status = status.as_str(), "Updated task status");
        Ok(())
    }

    async fn post_comment(&self, task: &str, text: &str) -> Result<(), LedgerError> {
        let response = self
            .http
            .post(self.url(&format!("task/{}/comment", task)))
            .header("Authorization", &self.config.api_key)
            .json(&json!({ "comment_text": text }))
            .send()
            .await?;
        Self::check("post_comment", &response)
    }

    async fn get_attachments(&self, task: &str) -> Result<Vec<Attachment>, LedgerError> {
        let response = self
            .http
            .get(self.url(&format!("task/{}", task)))
            .header("Authorization", &self.config.api_key)
            .send()
            .await?;
        Self::check("get_attachments", &response)?;

        let detail: TaskDetail = response.json().await?;
        Ok(detail
            .attachments
            .into_iter()
            .map(|a| Attachment {
                title: a.title,
                url: a.url_w_host,
            })
            .collect())
    }

    async fn download_attachment(
        &self,
        attachment: &Attachment,
        dest_dir: &Path,
    ) -> Result<PathBuf, LedgerError> {
        let response = self.http.get(&attachment.url).send().await?;
        Self::check("download_attachment", &response)?;

        let dest = dest_dir.join(attachment.file_name());
        let mut file = tokio::fs::File::create(&dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        tracing::debug!(url = %attachment.url, dest = %dest.display(), "Downloaded attachment");
        Ok(dest)
    }
}
