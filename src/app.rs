use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tasksync_auth::{SessionManager, SessionStatus};
use tasksync_core::{AuthError, Config};
use tasksync_services::theme::{ambient_dark, resolve_dark_mode};
use tasksync_services::{
    Intent, LocalStore, Outcome, ReconcileQueue, Reconciliation, ReconciliationEngine,
    RemoteGateway, SyncOutcome, Task, Theme,
};

/// Application state and lifecycle.
///
/// Owns every long-lived component. Built once at startup, mutated only
/// through its methods, torn down by [`AppState::shutdown`].
pub struct AppState {
    config: Config,
    store: Arc<LocalStore>,
    session: SessionManager,
    engine: ReconciliationEngine,
    queue: ReconcileQueue,
    theme: Theme,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(
            LocalStore::open(&config.database_path()).context("Failed to open local store")?,
        );

        let session = SessionManager::new(store.clone());
        let status = session.restore();
        tracing::debug!("Session status at startup: {:?}", status);

        let timeout = config.server.request_timeout_secs.map(Duration::from_secs);
        let gateway = RemoteGateway::new(&config.server.api_base_url, timeout, session.clone())?;
        let engine = ReconciliationEngine::new(gateway, Some(store.clone()));

        let theme = resolve_dark_mode(store.load_theme(), config.ui.dark_mode, ambient_dark());

        Ok(Self {
            config,
            store,
            session,
            engine,
            queue: ReconcileQueue::new(),
            theme,
        })
    }

    /// Replace the local tasks with the server snapshot when a session exists.
    pub async fn initialize(&mut self) -> SyncOutcome {
        tracing::info!("Using API at {}", self.config.server.api_base_url);
        let outcome = self.engine.sync().await;
        tracing::debug!("Sync: {:?}", outcome);
        outcome
    }

    /// Wait for all in-flight reconciliations.
    pub async fn shutdown(&mut self) -> Vec<(Intent, String, Outcome)> {
        tracing::debug!("Settling {} pending reconciliation(s)", self.queue.len());
        self.queue.drain().await
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Queue the remote phase of an intent. Returns false when the intent was
    /// rejected locally.
    pub fn dispatch(&mut self, reconciliation: Option<Reconciliation>) -> bool {
        match reconciliation {
            Some(r) => {
                self.queue.push(r);
                true
            }
            None => false,
        }
    }

    /// Map a user-supplied target to a task id. A number is a 1-based position
    /// in the unfiltered listing; anything else is taken as an id.
    pub fn resolve_target(&self, target: &str) -> Option<String> {
        let tasks = self.engine.tasks();
        if let Ok(position) = target.parse::<usize>() {
            if let Some(task) = position.checked_sub(1).and_then(|i| tasks.get(i)) {
                return Some(task.id.clone());
            }
        }
        tasks.into_iter().map(|t| t.id).find(|id| id == target)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        self.session
            .login(self.engine.gateway(), email, password)
            .await?;
        self.engine.sync().await;
        Ok(())
    }

    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<(), AuthError> {
        self.session
            .register(self.engine.gateway(), email, password, username)
            .await?;
        self.engine.sync().await;
        Ok(())
    }

    pub fn logout(&mut self) {
        if self.session.status() == SessionStatus::Unauthenticated {
            tracing::debug!("Logout requested without a session");
        }
        self.session.logout();
    }

    /// Persist and apply a theme choice.
    pub fn set_theme(&mut self, theme: Theme) {
        if let Err(e) = self.store.save_theme(theme.is_dark()) {
            tracing::warn!("Could not save theme preference: {}", e);
        }
        self.theme = theme;
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.engine.tasks()
    }
}
