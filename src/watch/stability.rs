//! Stability detection
//!
//! A freshly created archive may still be mid-write (rsync, slow uploads).
//! The probe samples file size on a fixed interval and declares the file
//! stable once two consecutive samples agree and are non-zero. Producers
//! give no completion signal; size settling is the only cue.

use std::path::Path;
use std::time::Duration;

/// Terminal states of a stability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    /// Two consecutive equal, non-zero size samples. Carries the final size.
    Stable(u64),

    /// The attempt ceiling passed without the size settling
    TimedOut,
}

/// Poll `path` until its size stops changing or `max_attempts` samples pass.
///
/// Each attempt sleeps `poll_interval` after sampling, so a file that is
/// already fully written resolves on the second sample. Read errors abort
/// the probe and surface to the caller.
pub async fn wait_for_stable(
    path: &Path,
    poll_interval: Duration,
    max_attempts: u32,
) -> Result<StabilityOutcome, std::io::Error> {
    let mut previous_size: Option<u64> = None;

    for attempt in 1..=max_attempts {
        let current_size = tokio::fs::metadata(path).await?.len();

        tracing::debug!(
            path = %path.display(),
            attempt = attempt,
            size = current_size,
            "Stability sample"
        );

        if previous_size == Some(current_size) && current_size > 0 {
            tracing::info!(
                path = %path.display(),
                size = current_size,
                attempts = attempt,
                "File size stabilized"
            );
            return Ok(StabilityOutcome::Stable(current_size));
        }

        previous_size = Some(current_size);
        tokio::time::sleep(poll_interval).await;
    }

    tracing::error!(
        path = %path.display(),
        attempts = max_attempts,
        "File size did not stabilize, dropping candidate"
    );
    Ok(StabilityOutcome::TimedOut)
}
