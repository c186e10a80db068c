//! Offline-first sync between the local database and a remote document store.
//!
//! Local writes go through [`SyncReadingRepository`], which marks readings
//! dirty and asks the [`SyncScheduler`] for a sync. The scheduler runs
//! [`SyncEngine`] cycles: push every dirty reading, then pull everything
//! changed remotely since the last watermark, resolving conflicts by
//! last-writer-wins on `updated_at`.

mod engine;
mod error;
mod identity;
mod reading_sync;
pub mod resolver;
mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{KindReport, SyncEngine, SyncOptions, SyncOutcome, SyncReport};
pub use error::SyncError;
pub use identity::{IdentityProvider, Session};
pub use reading_sync::SyncReadingRepository;
pub use resolver::{resolve, should_overwrite, Resolution};
pub use scheduler::{AlwaysOnline, Connectivity, RetryPolicy, SyncEvent, SyncScheduler};
