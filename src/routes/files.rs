//! Merged artifact downloads
//!
//! Serves reassembled archives straight out of the temp root. The URLs
//! handed out by the reassembly service resolve here until the working
//! directory's TTL deletion fires, after which the path 404s.

use std::path::Path;

use tower_http::services::ServeDir;

/// Static file service over the temp root, mounted under `/files`.
pub fn service(temp_dir: &Path) -> ServeDir {
    ServeDir::new(temp_dir)
}
