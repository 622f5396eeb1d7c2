//! Credential storage implementations.

use async_trait::async_trait;
use thiserror::Error;

use crate::Session;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

#[cfg(feature = "file")]
pub use file::FileStorage;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for persisting the session between runs.
#[async_trait]
pub trait CredentialStorage: Send + Sync {
    /// Load the persisted session, if any.
    async fn load(&self) -> Result<Option<Session>, StorageError>;

    /// Persist the session, replacing any previous one.
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove the persisted session. Succeeds when nothing is stored.
    async fn clear(&self) -> Result<(), StorageError>;
}
