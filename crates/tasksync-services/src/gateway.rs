//! Outbound calls to the remote task service.
//!
//! Every call attaches the session's bearer credential when one exists and
//! folds the response into `Result<Payload, RemoteError>`. A 401 on an
//! authenticated call ends the session before the error is returned.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use tasksync_auth::{AuthEndpoint, AuthRequest, SessionManager};
use tasksync_core::error::ReqwestErrorExt;
use tasksync_core::RemoteError;

use crate::task::{CreateTaskRequest, UpdateTaskRequest};

/// Successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// Empty or non-JSON body. Normal for update/delete.
    Empty,
}

impl Payload {
    pub fn into_value(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Empty => Value::Null,
        }
    }
}

/// HTTP client for the task service.
#[derive(Debug, Clone)]
pub struct RemoteGateway {
    client: Client,
    base_url: String,
    session: SessionManager,
}

impl RemoteGateway {
    /// Create a gateway for `base_url` (e.g. `http://localhost:5000/api`).
    ///
    /// `timeout` of `None` lets requests wait indefinitely.
    pub fn new(base_url: &str, timeout: Option<Duration>, session: SessionManager) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!("tasksync/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn task_path(id: &str) -> String {
        format!("/tasks/{}", urlencoding::encode(id))
    }

    /// Authenticated call. A 401 forces the session to end before returning.
    pub async fn call<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Payload, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let credential = self.session.credential();
        let result = self.send(method.clone(), path, body, credential.as_deref()).await;

        if let Err(e) = &result {
            if e.is_auth() {
                tracing::warn!("{} {} rejected credential", method, path);
                self.session.force_logout();
            } else {
                tracing::warn!("{} {} failed: {}", method, path, e);
            }
        }
        result
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        credential: Option<&str>,
    ) -> Result<Payload, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
    {
        tracing::debug!("{} {}", method, path);

        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = credential {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| e.into_remote_error())?;
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Could not read response body: {}", e);
                String::new()
            }
        };

        if !status.is_success() {
            return Err(if status.as_u16() == 401 {
                RemoteError::Unauthorized { message: text }
            } else {
                RemoteError::Status {
                    status: status.as_u16(),
                    message: text,
                }
            });
        }

        if text.trim().is_empty() {
            return Ok(Payload::Empty);
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Payload::Json(value)),
            Err(_) => {
                tracing::debug!("Non-JSON success body treated as empty");
                Ok(Payload::Empty)
            }
        }
    }

    /// `GET /tasks`
    pub async fn fetch_tasks(&self) -> Result<Payload, RemoteError> {
        self.call(Method::GET, "/tasks", None::<&()>).await
    }

    /// `POST /tasks`
    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<Payload, RemoteError> {
        self.call(Method::POST, "/tasks", Some(request)).await
    }

    /// `PUT /tasks/{id}`
    pub async fn update_task(
        &self,
        id: &str,
        request: &UpdateTaskRequest,
    ) -> Result<Payload, RemoteError> {
        self.call(Method::PUT, &Self::task_path(id), Some(request)).await
    }

    /// `DELETE /tasks/{id}`
    pub async fn delete_task(&self, id: &str) -> Result<Payload, RemoteError> {
        self.call(Method::DELETE, &Self::task_path(id), None::<&()>).await
    }
}

impl AuthEndpoint for RemoteGateway {
    /// Credential submission goes out without a bearer token, and a 401 here
    /// means "wrong password", not "session expired".
    async fn submit(&self, request: &AuthRequest) -> Result<Value, RemoteError> {
        self.send(Method::POST, request.path(), Some(request), None)
            .await
            .map(Payload::into_value)
    }
}
