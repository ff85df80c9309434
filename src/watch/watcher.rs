//! Filesystem watcher for the backup landing tree
//!
//! A `notify` watcher registered recursively on the backup root covers every
//! subdirectory, including ones created after startup. Its callback bridges
//! events into a tokio channel; one drain task filters creation events down
//! to [`BackupCandidate`]s and forwards them. Duplicate creation events for
//! one landing are collapsed into a single dispatch, while a later
//! re-creation of the same path (tomorrow's backup under the same name)
//! dispatches again.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::WatcherConfig;

use super::candidate::{has_backup_extension, BackupCandidate};

/// Buffered events between the notify callback and the drain task
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Buffered candidates between the drain task and the dispatcher
const CANDIDATE_CHANNEL_CAPACITY: usize = 64;

/// Creation events for the same path inside this window are treated as one
/// landing and dispatched once. Duplicate notify events arrive within
/// milliseconds; a genuine re-creation comes much later.
const DISPATCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Owns the running notify watcher. Dropping it stops event delivery and
/// ends the drain task; the candidate channel then closes.
pub struct BackupWatcher {
    _watcher: RecommendedWatcher,
}

impl BackupWatcher {
    /// Start watching the configured backup root.
    ///
    /// Returns the watcher guard and the channel on which detected
    /// candidates arrive.
    pub fn start(
        config: &WatcherConfig,
    ) -> Result<(Self, mpsc::Receiver<BackupCandidate>), notify::Error> {
        let (event_tx, event_rx) = mpsc::channel::<Result<Event, notify::Error>>(EVENT_CHANNEL_CAPACITY);
        let (candidate_tx, candidate_rx) = mpsc::channel(CANDIDATE_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // Dropped events on a full channel are acceptable: a lost
                // create means a lost candidate, never a corrupted one.
                let _ = event_tx.blocking_send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&config.backup_dir, RecursiveMode::Recursive)?;

        tracing::info!(root = %config.backup_dir.display(), "Watching backup directory");

        let extensions = config.backup_extensions.clone();
        tokio::spawn(drain_events(event_rx, candidate_tx, extensions));

        Ok((Self { _watcher: watcher }, candidate_rx))
    }
}

/// Drain notify events for the process lifetime, forwarding one candidate
/// per backup landing.
async fn drain_events(
    mut event_rx: mpsc::Receiver<Result<Event, notify::Error>>,
    candidate_tx: mpsc::Sender<BackupCandidate>,
    extensions: Vec<String>,
) {
    // Recently dispatched paths with their dispatch time; entries expire
    // after the debounce window so a re-created path dispatches again
    let mut dispatched: HashMap<PathBuf, Instant> = HashMap::new();

    while let Some(res) = event_rx.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Watch error: {}", e);
                continue;
            }
        };

        if !matches!(event.kind, EventKind::Create(_)) {
            continue;
        }

        for path in event.paths {
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                // Already gone again; nothing to process
                continue;
            };

            if metadata.is_dir() {
                tracing::debug!(path = %path.display(), "New subdirectory (covered by recursive watch)");
                continue;
            }

            if !metadata.is_file() || !has_backup_extension(&path, &extensions) {
                continue;
            }

            let now = Instant::now();
            dispatched.retain(|_, sent| now.duration_since(*sent) < DISPATCH_DEBOUNCE);
            if dispatched.contains_key(&path) {
                tracing::debug!(path = %path.display(), "Duplicate create event ignored");
                continue;
            }

            let Some(candidate) = BackupCandidate::from_path(&path) else {
                tracing::warn!(
                    path = %path.display(),
                    "Backup file in a directory without site metadata, skipping"
                );
                continue;
            };

            tracing::info!(
                path = %path.display(),
                task_id = %candidate.site.task_id,
                domain = %candidate.site.domain,
                "Detected backup candidate"
            );

            dispatched.insert(path.clone(), now);
            if candidate_tx.send(candidate).await.is_err() {
                // Dispatcher is gone; shutting down
                return;
            }
        }
    }

    tracing::info!("Watch event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(root: &TempDir) -> WatcherConfig {
        WatcherConfig {
            backup_dir: root.path().to_path_buf(),
            backup_extensions: vec!["zip".to_string(), "daf".to_string()],
            stability_poll: Duration::from_millis(5),
            stability_max_attempts: 3,
            candidate_concurrency: 4,
        }
    }

    #[tokio::test]
    async fn test_detects_backup_in_new_subdirectory() {
        let root = TempDir::new().unwrap();
        let (_watcher, mut rx) = BackupWatcher::start(&test_config(&root)).unwrap();

        // Give the watcher time to register
        tokio::time::sleep(Duration::from_millis(200)).await;

        let site_dir = root.path().join("b_t42_example_com");
        std::fs::create_dir(&site_dir).unwrap();
        // Let the recursive watch pick up the new directory first
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(site_dir.join("site.zip"), b"archive bytes").unwrap();

        let candidate = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("timed out waiting for candidate")
            .expect("channel closed");

        assert_eq!(candidate.file_name(), "site.zip");
        assert_eq!(candidate.site.task_id, "t42");
        assert_eq!(candidate.site.domain, "example.com");
    }

    #[tokio::test]
    async fn test_ignores_unrecognized_extension() {
        let root = TempDir::new().unwrap();
        let (_watcher, mut rx) = BackupWatcher::start(&test_config(&root)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let site_dir = root.path().join("b_t42_example_com");
        std::fs::create_dir(&site_dir).unwrap();
        std::fs::write(site_dir.join("notes.txt"), b"not a backup").unwrap();

        let result = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(result.is_err(), "unexpected candidate for .txt file");
    }

    #[tokio::test]
    async fn test_duplicate_create_events_collapse_to_one_dispatch() {
        let root = TempDir::new().unwrap();
        let site_dir = root.path().join("b_t42_example_com");
        std::fs::create_dir(&site_dir).unwrap();
        let path = site_dir.join("site.zip");
        std::fs::write(&path, b"archive bytes").unwrap();

        // Drive the drain task directly with the burst notify can emit
        // for a single file landing
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(8);
        let (candidate_tx, mut rx) = tokio::sync::mpsc::channel(8);
        tokio::spawn(drain_events(
            event_rx,
            candidate_tx,
            vec!["zip".to_string(), "daf".to_string()],
        ));

        let create = || {
            Ok(Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(path.clone()))
        };
        event_tx.send(create()).await.unwrap();
        event_tx.send(create()).await.unwrap();

        let candidate = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("first event was not dispatched")
            .expect("channel closed");
        assert_eq!(candidate.file_name(), "site.zip");

        let result = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_err(), "duplicate event dispatched a second candidate");
    }

    #[tokio::test]
    async fn test_recreated_file_is_dispatched_again() {
        let root = TempDir::new().unwrap();
        let (_watcher, mut rx) = BackupWatcher::start(&test_config(&root)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let site_dir = root.path().join("b_t42_example_com");
        std::fs::create_dir(&site_dir).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let path = site_dir.join("site.zip");
        std::fs::write(&path, b"monday's backup").unwrap();

        tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("timed out waiting for first candidate")
            .expect("channel closed");

        // Same site, same archive name, the next day
        std::fs::remove_file(&path).unwrap();
        tokio::time::sleep(DISPATCH_DEBOUNCE + Duration::from_millis(200)).await;
        std::fs::write(&path, b"tuesday's backup").unwrap();

        let candidate = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("re-created file was not dispatched again")
            .expect("channel closed");
        assert_eq!(candidate.file_name(), "site.zip");
    }

    #[tokio::test]
    async fn test_pre_existing_files_are_not_dispatched() {
        let root = TempDir::new().unwrap();
        let site_dir = root.path().join("b_t42_example_com");
        std::fs::create_dir(&site_dir).unwrap();
        std::fs::write(site_dir.join("old.zip"), b"already there").unwrap();

        let (_watcher, mut rx) = BackupWatcher::start(&test_config(&root)).unwrap();

        let result = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(result.is_err(), "pre-existing file should not be dispatched");
    }
}
