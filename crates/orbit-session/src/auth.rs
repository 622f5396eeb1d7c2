//! Application-wide authentication store.
//!
//! The store owns the only copy of the current [`Session`] and publishes it
//! through a `watch` channel so the realtime layer can follow logins and
//! logouts.

use std::sync::Arc;

use orbit_core::RealtimeSettings;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::{CredentialStorage, Role, Session, User};

/// Authentication error.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Session expired, log in again")]
    SessionExpired,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    user: User,
}

/// Authentication store.
pub struct AuthStore {
    http: reqwest::Client,
    settings: RealtimeSettings,
    storage: Arc<dyn CredentialStorage>,
    session: watch::Sender<Option<Session>>,
}

impl AuthStore {
    /// Create a store with no session.
    #[must_use]
    pub fn new(settings: RealtimeSettings, storage: Arc<dyn CredentialStorage>) -> Self {
        Self::with_client(reqwest::Client::new(), settings, storage)
    }

    /// Create a store using a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(
        http: reqwest::Client,
        settings: RealtimeSettings,
        storage: Arc<dyn CredentialStorage>,
    ) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            http,
            settings,
            storage,
            session,
        }
    }

    /// Current session.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_some()
    }

    #[must_use]
    pub fn has_role(&self, role: &Role) -> bool {
        self.session
            .borrow()
            .as_ref()
            .is_some_and(|s| s.has_role(role))
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.session
            .borrow()
            .as_ref()
            .is_some_and(|s| s.has_any_role(roles))
    }

    /// Follow session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    /// Log in with email and password.
    ///
    /// # Errors
    /// Returns `Rejected` with the server's `detail` on a non-2xx response.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.settings.api_url("/api/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response, "Login failed").await);
        }

        let LoginResponse { token, user } = response.json().await?;
        let session = Session::new(user, token);
        tracing::info!(user = %session.user_key(), role = %session.user.role, "Logged in");

        if let Err(e) = self.storage.save(&session).await {
            tracing::warn!("Failed to persist session: {e}");
        }
        self.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    /// Restore a persisted session and validate its token.
    ///
    /// Any failure leaves the store logged out with storage cleared.
    pub async fn initialize(&self) -> Option<Session> {
        let stored = match self.storage.load().await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Discarding stored session: {e}");
                self.logout().await;
                return None;
            }
        };

        match self.fetch_profile(&stored.token).await {
            Ok(mut user) => {
                if user.id.is_none() {
                    user.id = stored.user.id;
                }
                let session = Session::new(user, stored.token);
                if let Err(e) = self.storage.save(&session).await {
                    tracing::warn!("Failed to persist session: {e}");
                }
                self.session.send_replace(Some(session.clone()));
                Some(session)
            }
            Err(e) => {
                tracing::info!("Stored session rejected: {e}");
                None
            }
        }
    }

    /// Fetch the profile for `token`. Logs out on any failure.
    ///
    /// # Errors
    /// Returns error if the request fails or the token is rejected.
    pub async fn fetch_profile(&self, token: &str) -> Result<User, AuthError> {
        let result: Result<User, AuthError> = async {
            let response = self
                .http
                .get(self.settings.api_url("/api/user/profile"))
                .bearer_auth(token)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(rejected(response, "Invalid or expired token").await);
            }
            Ok(response.json::<User>().await?)
        }
        .await;

        if result.is_err() {
            self.logout().await;
        }
        result
    }

    /// Clear the session and the persisted credential.
    pub async fn logout(&self) {
        let had_session = self.session.send_replace(None).is_some();
        if let Err(e) = self.storage.clear().await {
            tracing::warn!("Failed to clear stored session: {e}");
        }
        if had_session {
            tracing::info!("Logged out");
        }
    }

    /// Send a bearer-authenticated request to an API path.
    ///
    /// # Errors
    /// Returns `NotAuthenticated` without a session and `SessionExpired`
    /// (after logging out) on HTTP 401.
    pub async fn authenticated_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, AuthError> {
        let token = self
            .session
            .borrow()
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(AuthError::NotAuthenticated)?;

        let mut request = self
            .http
            .request(method, self.settings.api_url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(path, "Session rejected by server");
            self.logout().await;
            return Err(AuthError::SessionExpired);
        }
        Ok(response)
    }
}

async fn rejected(response: Response, fallback: &str) -> AuthError {
    let status = response.status().as_u16();
    let detail = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| fallback.to_string());
    AuthError::Rejected { status, detail }
}
