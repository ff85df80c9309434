//! Boveda Server Library
//!
//! Backup ingestion and chunked-transfer core. The server binary in
//! main.rs wires these modules together.
//!
//! # Modules
//!
//! - `watch`: backup directory watching and write-stability detection
//! - `chunk`: file splitting and part reassembly
//! - `transfer`: per-backup orchestration against the remote ledger
//! - `reassembly`: on-demand merge with time-limited downloads
//! - `ledger`: remote task-ledger client

pub mod chunk;
pub mod config;
pub mod ledger;
pub mod reassembly;
pub mod routes;
pub mod state;
pub mod transfer;
pub mod watch;
