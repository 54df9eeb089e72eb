use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{LoginRequest, Session};

use super::store::{SessionStore, StoreError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

/// Code reported for local persistence failures.
pub const STORAGE_ERROR_CODE: &str = "STORAGE_ERROR";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn code(&self) -> &str {
        match self {
            AuthError::Api(e) => e.code(),
            AuthError::Store(_) => STORAGE_ERROR_CODE,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AuthError::Api(e) => e.message().to_string(),
            AuthError::Store(e) => e.to_string(),
        }
    }

    /// The normalized request error, if the failure came from the server side.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            AuthError::Api(e) => Some(e),
            AuthError::Store(_) => None,
        }
    }
}

/// UI-observable state of the last login attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub is_loading: bool,
    pub error: Option<AuthError>,
}

/// Resets `is_loading` when a login attempt ends, including when the
/// login future is dropped before completion.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<AuthState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.is_loading = false);
    }
}

/// Clears both tokens when logout ends, even if the logout future is
/// dropped while the remote call is in flight.
struct ClearTokensGuard<'a> {
    store: &'a dyn SessionStore,
    armed: bool,
}

impl ClearTokensGuard<'_> {
    fn clear_now(mut self) -> Result<(), StoreError> {
        self.armed = false;
        clear_tokens(self.store)
    }
}

impl Drop for ClearTokensGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = clear_tokens(self.store) {
                warn!(error = %e, "Failed to clear session tokens after interrupted logout");
            }
        }
    }
}

/// Clear both tokens; both are attempted even if the first fails.
fn clear_tokens(store: &dyn SessionStore) -> Result<(), StoreError> {
    let access = store.clear(ACCESS_TOKEN_KEY);
    let refresh = store.clear(REFRESH_TOKEN_KEY);
    access.and(refresh)
}

/// Login/logout orchestration on top of [`ApiClient`].
///
/// Tokens go to the same [`SessionStore`] the client reads its bearer token
/// from. Clones share the store and the observable state; concurrent logins
/// are last-write-wins.
#[derive(Clone)]
pub struct AuthManager {
    client: ApiClient,
    store: Arc<dyn SessionStore>,
    state: Arc<watch::Sender<AuthState>>,
}

impl AuthManager {
    pub fn new(client: ApiClient) -> Self {
        let store = Arc::clone(client.store());
        let (state, _) = watch::channel(AuthState::default());
        Self {
            client,
            store,
            state: Arc::new(state),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Log in and persist the returned token pair.
    ///
    /// On failure the error is recorded in [`AuthState::error`] and returned;
    /// previously stored tokens are left as they were.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, AuthError> {
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });
        let _loading = LoadingGuard {
            state: self.state.as_ref(),
        };

        let result = self.authenticate(credentials).await;
        if let Err(ref e) = result {
            warn!(code = e.code(), error = %e, "Login failed");
            self.state.send_modify(|s| s.error = Some(e.clone()));
        }
        result
    }

    async fn authenticate(&self, credentials: &LoginRequest) -> Result<Session, AuthError> {
        let session = self.client.login(credentials).await?;
        self.persist(&session)?;
        info!(user = %session.user.email, role = %session.user.role, "Logged in");
        Ok(session)
    }

    /// Store both tokens, or neither: a failed refresh write puts the
    /// previous access token back.
    fn persist(&self, session: &Session) -> Result<(), StoreError> {
        let previous = self.store.get(ACCESS_TOKEN_KEY)?;
        self.store.set(ACCESS_TOKEN_KEY, &session.access_token)?;

        if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, &session.refresh_token) {
            let restored = match previous {
                Some(ref token) => self.store.set(ACCESS_TOKEN_KEY, token),
                None => self.store.clear(ACCESS_TOKEN_KEY),
            };
            if let Err(restore_err) = restored {
                warn!(error = %restore_err, "Failed to restore previous access token");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Revoke the session remotely, then clear local tokens regardless of
    /// the remote outcome. The remote error, if any, takes precedence.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let guard = ClearTokensGuard {
            store: self.store.as_ref(),
            armed: true,
        };
        let remote = self.client.logout().await;
        let cleared = guard.clear_now();

        match remote {
            Ok(()) => info!("Logged out"),
            Err(ref e) => warn!(error = %e, "Remote logout failed; local session cleared anyway"),
        }
        remote?;
        cleared?;
        Ok(())
    }

    /// Whether an access token is stored. Freshness is not checked.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_token(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read_token(REFRESH_TOKEN_KEY)
    }

    fn read_token(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read session token");
                None
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn error(&self) -> Option<AuthError> {
        self.state.borrow().error.clone()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Watch state transitions (idle → loading → success/error → idle).
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}
