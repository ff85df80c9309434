//! Merge operation
//!
//! Given any one part file, derives the original name by stripping the
//! trailing `.part<N>` suffix, discovers the sibling parts through the
//! naming convention, and concatenates them in numeric order. Ordering is
//! recovered from the suffix integer, never from directory listing order.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use super::{ChunkError, CHUNK_BUFFER_SIZE};

/// Strip the trailing `.part<N>` suffix from a part file name.
pub fn base_name(part_name: &str) -> Result<&str, ChunkError> {
    let (base, digits) = part_name
        .rsplit_once(".part")
        .ok_or_else(|| ChunkError::NotAPartFile(part_name.to_string()))?;
    if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChunkError::NotAPartFile(part_name.to_string()));
    }
    Ok(base)
}

/// Parse the part number from a part file name.
fn part_number(part_name: &str, base: &str) -> Result<u32, ChunkError> {
    let digits = part_name
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix(".part"))
        .ok_or_else(|| ChunkError::NotAPartFile(part_name.to_string()))?;
    digits
        .parse()
        .map_err(|_| ChunkError::InvalidPartNumber(part_name.to_string()))
}

/// Merge the part family of `first_part` into `<dir>/<base>`.
///
/// Every sibling file named `<base>.part*` participates; a sibling whose
/// suffix does not parse as an integer fails the whole merge attempt. The
/// merged file existing afterwards is the caller's success signal.
pub async fn merge_parts(first_part: &Path) -> Result<PathBuf, ChunkError> {
    let parent = first_part.parent().unwrap_or_else(|| Path::new("."));
    let part_name = first_part
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ChunkError::InvalidSource(first_part.to_path_buf()))?;
    let base = base_name(part_name)?.to_string();

    // Discover and number every sibling sharing the base-plus-.part prefix
    let mut parts: Vec<(u32, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(parent).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&format!("{}.part", base)) {
            parts.push((part_number(name, &base)?, entry.path()));
        }
    }

    if parts.is_empty() {
        return Err(ChunkError::NoParts(base));
    }

    // Numeric sort: part10 sorts after part2
    parts.sort_by_key(|(n, _)| *n);

    let merged_path = parent.join(&base);
    let mut writer = BufWriter::new(File::create(&merged_path).await?);
    let mut buffer = vec![0u8; CHUNK_BUFFER_SIZE];

    for (_, part) in &parts {
        let mut reader = BufReader::new(File::open(part).await?);
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
        }
    }
    writer.flush().await?;

    tracing::info!(
        merged = %merged_path.display(),
        parts = parts.len(),
        "Merged parts"
    );

    Ok(merged_path)
}
