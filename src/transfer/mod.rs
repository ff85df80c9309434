//! Transfer orchestration
//!
//! Drives one detected backup from ledger-entry creation through stability
//! wait, size-threshold routing, bounded part uploads, and the final
//! completion update.

mod orchestrator;

pub use orchestrator::TransferOrchestrator;

use crate::chunk::ChunkError;
use crate::ledger::LedgerError;

/// Transfer error types
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Ledger call failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Chunking failed: {0}")]
    Chunk(#[from] ChunkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload worker failed: {0}")]
    Worker(String),
}
