//! Chunking Engine
//!
//! Splits one file into ordered, fixed-size parts and reassembles ordered
//! parts back into one file. Parts follow the `<fileName>.part<N>` naming
//! convention with N starting at 1 and no gaps; concatenating the parts in
//! ascending N order reproduces the original file bit-for-bit.
//!
//! Both operations stream through a fixed-size buffer; neither holds an
//! entire file in memory.

mod merge;
mod split;

pub use merge::{base_name, merge_parts};
pub use split::split_file;

/// I/O buffer size for split and merge streaming
pub(crate) const CHUNK_BUFFER_SIZE: usize = 1024 * 1024;

/// Chunking error types
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("Source file has no file name: {0}")]
    InvalidSource(std::path::PathBuf),

    #[error("Not a part file (missing .part<N> suffix): {0}")]
    NotAPartFile(String),

    #[error("Part file has a malformed numeric suffix: {0}")]
    InvalidPartNumber(String),

    #[error("No part files found for base name: {0}")]
    NoParts(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
