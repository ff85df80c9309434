//! Per-candidate transfer state machine
//!
//! DETECTED -> ledger entry created -> stability wait -> size check ->
//! direct attach | split-and-attach -> complete. A ledger failure at any
//! call boundary is logged by the caller and halts the machine for that
//! candidate; nothing is retried and nothing is rolled back.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::chunk::split_file;
use crate::ledger::{LedgerApi, TaskStatus};
use crate::state::{AppState, WorkdirRegistry};
use crate::watch::{wait_for_stable, BackupCandidate, StabilityOutcome};

use super::TransferError;

pub struct TransferOrchestrator {
    ledger: Arc<dyn LedgerApi>,
    workdirs: WorkdirRegistry,
    temp_dir: PathBuf,
    part_size: u64,
    upload_concurrency: usize,
    stability_poll: std::time::Duration,
    stability_max_attempts: u32,
    candidate_concurrency: usize,
}

impl TransferOrchestrator {
    pub fn new(state: &AppState) -> Self {
        let config = state.config();
        Self {
            ledger: state.ledger(),
            workdirs: state.workdirs().clone(),
            temp_dir: config.server.temp_dir.clone(),
            part_size: config.transfer.part_size,
            upload_concurrency: config.transfer.upload_concurrency,
            stability_poll: config.watcher.stability_poll,
            stability_max_attempts: config.watcher.stability_max_attempts,
            candidate_concurrency: config.watcher.candidate_concurrency,
        }
    }

    /// Consume candidates from the watcher, processing them on a bounded
    /// pool so a slow or stuck file never stalls detection. Runs until the
    /// candidate channel closes.
    pub async fn run(self: Arc<Self>, mut candidates: mpsc::Receiver<BackupCandidate>) {
        let pool = Arc::new(Semaphore::new(self.candidate_concurrency));

        while let Some(candidate) = candidates.recv().await {
            let Ok(permit) = pool.clone().acquire_owned().await else {
                break;
            };
            let this = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = this.process(&candidate).await {
                    tracing::error!(
                        path = %candidate.path.display(),
                        error = %e,
                        "Backup transfer failed"
                    );
                }
            });
        }

        tracing::info!("Candidate channel closed, orchestrator stopping");
    }

    /// Run the full state machine for one candidate.
    pub async fn process(&self, candidate: &BackupCandidate) -> Result<(), TransferError> {
        // Eager ledger entry: observers get visibility before the file has
        // even finished being written.
        let name = format!(
            "Backup - {} - {}",
            candidate.site.domain,
            chrono::Utc::now().date_naive()
        );
        let task_id = self.ledger.create_task(&name, TaskStatus::InProgress).await?;
        self.ledger
            .link_task(&candidate.site.task_id, &task_id)
            .await?;

        let size = match wait_for_stable(
            &candidate.path,
            self.stability_poll,
            self.stability_max_attempts,
        )
        .await?
        {
            StabilityOutcome::Stable(size) => size,
            StabilityOutcome::TimedOut => {
                tracing::error!(
                    path = %candidate.path.display(),
                    task_id = %task_id,
                    "Candidate never stabilized; ledger entry stays in progress"
                );
                return Ok(());
            }
        };

        if size > self.part_size {
            tracing::info!(
                path = %candidate.path.display(),
                size = size,
                part_size = self.part_size,
                "File exceeds part size, splitting"
            );
            self.split_and_attach(candidate, &task_id).await?;
        } else {
            tracing::info!(
                path = %candidate.path.display(),
                size = size,
                "File within part size, attaching directly"
            );
            self.ledger.attach_file(&task_id, &candidate.path).await?;
        }

        self.ledger
            .set_status(&task_id, TaskStatus::Complete)
            .await?;

        tracing::info!(
            path = %candidate.path.display(),
            task_id = %task_id,
            "Backup transfer complete"
        );
        Ok(())
    }

    /// Split the archive into a fresh working directory and upload every
    /// part on a bounded pool. All uploads must succeed before the caller
    /// may mark the task complete; the first failure aborts the batch and
    /// leaves the remaining local parts on disk for manual follow-up.
    async fn split_and_attach(
        &self,
        candidate: &BackupCandidate,
        task_id: &str,
    ) -> Result<(), TransferError> {
        let workdir = self.temp_dir.join(format!("split_{}", Uuid::new_v4()));
        self.workdirs.register(&workdir).await;

        let parts = split_file(&candidate.path, &workdir, self.part_size).await?;

        let result = self.upload_parts(task_id, &parts).await;
        match result {
            Ok(()) => {
                // Parts were deleted as they uploaded; drop the empty dir
                if let Err(e) = tokio::fs::remove_dir(&workdir).await {
                    tracing::warn!(dir = %workdir.display(), error = %e, "Could not remove split directory");
                }
                self.workdirs.deregister(&workdir).await;
                Ok(())
            }
            Err(e) => {
                // Leave the remaining parts in place, and keep them past
                // shutdown cleanup: they are the only copy of the work done
                self.workdirs.deregister(&workdir).await;
                tracing::error!(
                    dir = %workdir.display(),
                    task_id = %task_id,
                    error = %e,
                    "Part upload batch failed; local parts left on disk"
                );
                Err(e)
            }
        }
    }

    async fn upload_parts(&self, task_id: &str, parts: &[PathBuf]) -> Result<(), TransferError> {
        let uploads_allowed = Arc::new(Semaphore::new(self.upload_concurrency));
        let mut uploads: JoinSet<Result<(), TransferError>> = JoinSet::new();

        for part in parts {
            let ledger = self.ledger.clone();
            let task_id = task_id.to_string();
            let part = part.clone();
            let permits = uploads_allowed.clone();

            uploads.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| TransferError::Worker(e.to_string()))?;
                tracing::info!(part = %part.display(), "Attaching part");
                ledger.attach_file(&task_id, &part).await?;
                tokio::fs::remove_file(&part).await?;
                Ok(())
            });
        }

        // Join barrier: completion is only reported once every upload has
        // landed. The first failure cancels whatever is still in flight.
        while let Some(joined) = uploads.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => Err(TransferError::Worker(e.to_string())),
            };
            if let Err(e) = result {
                uploads.abort_all();
                while uploads.join_next().await.is_some() {}
                return Err(e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ledger::fake::FakeLedger;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(temp: &TempDir, part_size: u64) -> Config {
        let mut config = Config::default();
        config.server.temp_dir = temp.path().join("work");
        config.transfer.part_size = part_size;
        config.watcher.stability_poll = Duration::from_millis(5);
        config.watcher.stability_max_attempts = 5;
        config
    }

    async fn seed_candidate(temp: &TempDir, len: usize) -> BackupCandidate {
        let site_dir = temp.path().join("b_t7_example_com");
        tokio::fs::create_dir_all(&site_dir).await.unwrap();
        let path = site_dir.join("site.zip");
        let data: Vec<u8> = (0..len).map(|i| (i % 199) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();
        BackupCandidate::from_path(&path).unwrap()
    }

    #[tokio::test]
    async fn test_small_file_attached_directly() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        let state = AppState::new(test_config(&temp, 1024), ledger.clone());
        let orchestrator = TransferOrchestrator::new(&state);
        let candidate = seed_candidate(&temp, 100).await;

        orchestrator.process(&candidate).await.unwrap();

        let created = ledger.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        assert!(created[0].1.starts_with("Backup - example.com - "));
        assert_eq!(created[0].2, TaskStatus::InProgress);

        let links = ledger.links.lock().unwrap().clone();
        assert_eq!(links, vec![("t7".to_string(), created[0].0.clone())]);

        let attached = ledger.attached.lock().unwrap().clone();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].1, "site.zip");
        assert_eq!(attached[0].2.len(), 100);

        let statuses = ledger.statuses.lock().unwrap().clone();
        assert_eq!(statuses, vec![(created[0].0.clone(), TaskStatus::Complete)]);
    }

    #[tokio::test]
    async fn test_file_exactly_at_ceiling_is_not_split() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        let state = AppState::new(test_config(&temp, 500), ledger.clone());
        let orchestrator = TransferOrchestrator::new(&state);
        let candidate = seed_candidate(&temp, 500).await;

        orchestrator.process(&candidate).await.unwrap();

        let attached = ledger.attached.lock().unwrap().clone();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].1, "site.zip");
    }

    #[tokio::test]
    async fn test_oversized_file_split_and_attached() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        let state = AppState::new(test_config(&temp, 900), ledger.clone());
        let orchestrator = TransferOrchestrator::new(&state);
        // 2500 bytes at 900 per part: 900 + 900 + 700
        let candidate = seed_candidate(&temp, 2500).await;

        orchestrator.process(&candidate).await.unwrap();

        let mut attached = ledger.attached.lock().unwrap().clone();
        attached.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(attached.len(), 3);
        assert_eq!(attached[0].1, "site.zip.part1");
        assert_eq!(attached[0].2.len(), 900);
        assert_eq!(attached[2].1, "site.zip.part3");
        assert_eq!(attached[2].2.len(), 700);

        // Parts were removed as they uploaded; working directory is gone
        let mut entries = tokio::fs::read_dir(temp.path().join("work")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        let statuses = ledger.statuses.lock().unwrap().clone();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn test_one_byte_over_ceiling_splits() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        let state = AppState::new(test_config(&temp, 500), ledger.clone());
        let orchestrator = TransferOrchestrator::new(&state);
        let candidate = seed_candidate(&temp, 501).await;

        orchestrator.process(&candidate).await.unwrap();

        let attached = ledger.attached.lock().unwrap().clone();
        assert_eq!(attached.len(), 2);
    }

    #[tokio::test]
    async fn test_ledger_create_failure_halts_machine() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        ledger
            .fail_create
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let state = AppState::new(test_config(&temp, 1024), ledger.clone());
        let orchestrator = TransferOrchestrator::new(&state);
        let candidate = seed_candidate(&temp, 100).await;

        let result = orchestrator.process(&candidate).await;
        assert!(result.is_err());

        assert!(ledger.links.lock().unwrap().is_empty());
        assert!(ledger.attached.lock().unwrap().is_empty());
        assert!(ledger.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_part_upload_failure_leaves_local_parts_and_no_completion() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        *ledger.fail_attach_named.lock().unwrap() = Some("site.zip.part2".to_string());
        let state = AppState::new(test_config(&temp, 900), ledger.clone());
        let orchestrator = TransferOrchestrator::new(&state);
        let candidate = seed_candidate(&temp, 2500).await;

        let result = orchestrator.process(&candidate).await;
        assert!(result.is_err());

        // No completion update after a failed batch
        assert!(ledger.statuses.lock().unwrap().is_empty());

        // The failed part is still on disk in its working directory
        let work = temp.path().join("work");
        let mut split_dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&work).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            split_dirs.push(entry.path());
        }
        assert_eq!(split_dirs.len(), 1);
        assert!(split_dirs[0].join("site.zip.part2").exists());
    }

    #[tokio::test]
    async fn test_timed_out_candidate_leaves_entry_in_progress() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        let mut config = test_config(&temp, 1024);
        config.watcher.stability_max_attempts = 3;
        let state = AppState::new(config, ledger.clone());
        let orchestrator = TransferOrchestrator::new(&state);

        // A zero-byte file repeats its size but never counts as stable
        let candidate = seed_candidate(&temp, 0).await;

        orchestrator.process(&candidate).await.unwrap();

        // Entry was created eagerly, but nothing was attached or completed
        assert_eq!(ledger.created.lock().unwrap().len(), 1);
        assert!(ledger.attached.lock().unwrap().is_empty());
        assert!(ledger.statuses.lock().unwrap().is_empty());
    }
}
