//! Backup directory watching
//!
//! One dedicated task drains filesystem events for the backup root; newly
//! landed archives become [`BackupCandidate`]s and are dispatched to the
//! transfer orchestrator exactly once each, on a bounded worker pool.

mod candidate;
mod stability;
mod watcher;

pub use candidate::{BackupCandidate, SiteRef};
pub use stability::{wait_for_stable, StabilityOutcome};
pub use watcher::BackupWatcher;
