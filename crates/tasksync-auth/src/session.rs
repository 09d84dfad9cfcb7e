//! Session lifecycle: who is signed in, and with which bearer credential.
//!
//! ```text
//! Unauthenticated --login/register--> Authenticating --token--> Authenticated
//!        ^                                  |                       |
//!        +----------- failure --------------+                       |
//!        +------------- logout / 401 (force_logout) ----------------+
//! ```
//!
//! Signing out notifies every registered listener synchronously, after the
//! credential has been cleared, so task state tied to the old identity can be
//! dropped before anything else observes the new state.

use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tasksync_core::{AuthError, RemoteError};

use crate::storage::CredentialStore;

/// Authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// User asked to sign out.
    Logout,
    /// The server rejected the credential (HTTP 401).
    Expired,
    /// A new login replaced the previous identity.
    Switched,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

/// Credential submission sent to `/login` or `/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AuthRequest {
    Login(LoginRequest),
    Register(RegisterRequest),
}

impl AuthRequest {
    /// Endpoint path relative to the API base.
    pub fn path(&self) -> &'static str {
        match self {
            AuthRequest::Login(_) => "/login",
            AuthRequest::Register(_) => "/register",
        }
    }

    /// Reject blank fields before anything is sent.
    pub fn validate(&self) -> Result<(), AuthError> {
        let (email, password, username) = match self {
            AuthRequest::Login(r) => (&r.email, &r.password, None),
            AuthRequest::Register(r) => (&r.email, &r.password, Some(&r.username)),
        };
        if email.trim().is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        if username.is_some_and(|u| u.trim().is_empty()) {
            return Err(AuthError::MissingField("username"));
        }
        Ok(())
    }
}

/// Transport used to submit credentials.
///
/// Returns the decoded JSON body on success (`Value::Null` for an empty body).
pub trait AuthEndpoint {
    fn submit(
        &self,
        request: &AuthRequest,
    ) -> impl Future<Output = Result<serde_json::Value, RemoteError>> + Send;
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    credential: Option<String>,
    last_error: Option<String>,
}

type SignedOutListener = Box<dyn Fn(SignOutReason) + Send + Sync>;

struct Inner {
    state: RwLock<SessionState>,
    store: Arc<dyn CredentialStore>,
    listeners: Mutex<Vec<SignedOutListener>>,
}

/// Shared handle to the session. Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("SessionManager")
            .field("status", &state.status)
            .field("has_credential", &state.credential.is_some())
            .finish()
    }
}

impl SessionManager {
    /// Create an unauthenticated session backed by `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(SessionState {
                    status: SessionStatus::Unauthenticated,
                    credential: None,
                    last_error: None,
                }),
                store,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Pick up a credential persisted by a previous run.
    pub fn restore(&self) -> SessionStatus {
        let token = self
            .inner
            .store
            .load_credential()
            .filter(|t| !t.trim().is_empty());

        let mut state = self.inner.state.write();
        if let Some(token) = token {
            tracing::info!("Restored stored session credential");
            state.credential = Some(token);
            state.status = SessionStatus::Authenticated;
        }
        state.status
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.read().status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// Current bearer credential, if any.
    pub fn credential(&self) -> Option<String> {
        self.inner.state.read().credential.clone()
    }

    /// Message from the most recent failed sign-in or forced sign-out.
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.read().last_error.clone()
    }

    /// Register a callback invoked whenever the session ends.
    pub fn on_signed_out<F>(&self, listener: F)
    where
        F: Fn(SignOutReason) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Box::new(listener));
    }

    pub async fn login<E: AuthEndpoint>(
        &self,
        endpoint: &E,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let request = AuthRequest::Login(LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        });
        self.authenticate(endpoint, request).await
    }

    pub async fn register<E: AuthEndpoint>(
        &self,
        endpoint: &E,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<(), AuthError> {
        let request = AuthRequest::Register(RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            username: username.trim().to_string(),
        });
        self.authenticate(endpoint, request).await
    }

    /// Sign out at the user's request.
    pub fn logout(&self) {
        tracing::info!("Logging out");
        self.sign_out(SignOutReason::Logout);
    }

    /// End the session because the server rejected the credential.
    ///
    /// The credential is gone by the time this returns.
    pub fn force_logout(&self) {
        tracing::warn!("Credential rejected by server, ending session");
        self.sign_out(SignOutReason::Expired);
        self.inner.state.write().last_error = Some(AuthError::SessionExpired.to_string());
    }

    async fn authenticate<E: AuthEndpoint>(
        &self,
        endpoint: &E,
        request: AuthRequest,
    ) -> Result<(), AuthError> {
        if let Err(e) = request.validate() {
            self.inner.state.write().last_error = Some(e.to_string());
            return Err(e);
        }

        let was_authenticated = {
            let state = self.inner.state.read();
            match state.status {
                SessionStatus::Authenticating => return Err(AuthError::InProgress),
                SessionStatus::Authenticated => true,
                SessionStatus::Unauthenticated => false,
            }
        };
        if was_authenticated {
            self.sign_out(SignOutReason::Switched);
        }

        {
            let mut state = self.inner.state.write();
            state.status = SessionStatus::Authenticating;
            state.last_error = None;
        }
        tracing::debug!("Submitting credentials to {}", request.path());

        let outcome = match endpoint.submit(&request).await {
            Ok(body) => extract_token(&body).ok_or(AuthError::NoToken),
            Err(e) if e.is_transport() => Err(AuthError::Remote(e)),
            Err(e) => Err(AuthError::Rejected(
                e.server_reason()
                    .unwrap_or_else(|| "Authentication failed".to_string()),
            )),
        };

        match outcome {
            Ok(token) => {
                if let Err(e) = self.inner.store.save_credential(&token) {
                    tracing::warn!("Could not persist credential, keeping it for this run: {}", e);
                }
                let mut state = self.inner.state.write();
                state.credential = Some(token);
                state.status = SessionStatus::Authenticated;
                tracing::info!("Signed in via {}", request.path());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Sign-in via {} failed: {}", request.path(), e);
                let mut state = self.inner.state.write();
                state.status = SessionStatus::Unauthenticated;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn sign_out(&self, reason: SignOutReason) {
        if let Err(e) = self.inner.store.clear_credential() {
            tracing::error!("Failed to clear stored credential: {}", e);
        }
        {
            let mut state = self.inner.state.write();
            state.credential = None;
            state.status = SessionStatus::Unauthenticated;
        }
        for listener in self.inner.listeners.lock().iter() {
            listener(reason);
        }
    }
}

fn extract_token(body: &serde_json::Value) -> Option<String> {
    body.get("token")
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
}
