//! Server-side modules for the glowlog sync server.

mod auth;
mod routes;
mod storage;

pub use auth::{auth_middleware, ApiKeyEntry, ApiKeyStore, AuthUser};
pub use routes::{router, ApiError, AppState, MAX_BODY_BYTES};
pub use storage::{DocumentStore, StorageError};
