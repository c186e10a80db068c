//! Glucose and blood pressure log with offline-first cloud sync.
//!
//! Readings live in a local SQLite database and are synced to a remote
//! document store through [`sync::SyncEngine`]. The [`server`] module holds
//! the reference remote served by the `glowlog-server` binary.

pub mod config;
pub mod db;
pub mod models;
pub mod remote;
pub mod server;
pub mod sync;
