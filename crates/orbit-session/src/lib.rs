//! Authentication store and credential storage for the ORBIT client.
//!
//! Provides:
//! - `AuthStore` - Login, startup validation, logout and authenticated requests
//! - `Session` / `User` / `Role` - The authenticated identity
//! - Credential storage implementations (memory, file)

pub mod auth;
pub mod session;
pub mod storage;

pub use auth::{AuthError, AuthStore};
pub use session::{Role, Session, User};
pub use storage::{CredentialStorage, StorageError};
