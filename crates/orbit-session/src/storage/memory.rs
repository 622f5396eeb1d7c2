//! In-memory credential storage.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::{
    Session,
    storage::{CredentialStorage, StorageError},
};

/// In-memory storage implementation.
///
/// Useful for tests and short-lived processes.
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    session: RwLock<Option<Session>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage that already holds `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

#[async_trait]
impl CredentialStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<Session>, StorageError> {
        Ok(self
            .session
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .clone())
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        *self
            .session
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))? = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.session
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .take();
        Ok(())
    }
}
