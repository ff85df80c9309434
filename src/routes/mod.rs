//! Route modules for Boveda Server

pub mod files;
pub mod health;
pub mod merge;
