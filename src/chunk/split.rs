//! Split operation
//!
//! Writes consecutively numbered part files into an output directory until
//! the source is exhausted. A part that receives zero bytes is deleted and
//! splitting stops, so the engine never leaves a dangling empty part file.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::{ChunkError, CHUNK_BUFFER_SIZE};

/// Split `source` into parts of at most `part_size` bytes inside `output_dir`.
///
/// Returns the part paths in ascending part-number order. A zero-byte source
/// produces zero parts. `output_dir` is created if it does not exist.
pub async fn split_file(
    source: &Path,
    output_dir: &Path,
    part_size: u64,
) -> Result<Vec<PathBuf>, ChunkError> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ChunkError::InvalidSource(source.to_path_buf()))?;

    tokio::fs::create_dir_all(output_dir).await?;

    let mut reader = BufReader::new(File::open(source).await?);
    let mut buffer = vec![0u8; CHUNK_BUFFER_SIZE];
    let mut parts = Vec::new();
    let mut part_number: u32 = 1;

    loop {
        let part_path = output_dir.join(format!("{}.part{}", file_name, part_number));
        let mut part = File::create(&part_path).await?;
        let mut written: u64 = 0;

        while written < part_size {
            let want = std::cmp::min(buffer.len() as u64, part_size - written) as usize;
            let read = reader.read(&mut buffer[..want]).await?;
            if read == 0 {
                break;
            }
            part.write_all(&buffer[..read]).await?;
            written += read as u64;
        }

        part.flush().await?;
        drop(part);

        // The input ended exactly on the previous part boundary
        if written == 0 {
            tokio::fs::remove_file(&part_path).await?;
            break;
        }

        parts.push(part_path);

        // A short part means the input is exhausted
        if written < part_size {
            break;
        }
        part_number += 1;
    }

    tracing::debug!(
        source = %source.display(),
        parts = parts.len(),
        part_size = part_size,
        "Split complete"
    );

    Ok(parts)
}
