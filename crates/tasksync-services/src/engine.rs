//! Optimistic reconciliation of the local task collection with the service.
//!
//! Every intent runs in two phases. The local apply happens synchronously
//! inside the intent method and is visible to the next read. The remote
//! phase is returned as a [`Reconciliation`] which the caller awaits or hands
//! to a [`ReconcileQueue`](crate::queue::ReconcileQueue); it issues the call
//! and applies the compensation for its intent when the call fails.
//!
//! Remote calls for one task id are serialized in issue order. A call whose
//! task has been deleted locally by the time its turn comes is skipped.
//!
//! Compensations and notices are tagged with the epoch at issue time. Logout,
//! reset and a snapshot replace start a new epoch, and stale compensations
//! from the previous one are dropped.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tasksync_auth::{SessionManager, SignOutReason};
use tasksync_core::RemoteError;
use tokio::task::JoinSet;

use crate::gateway::{Payload, RemoteGateway};
use crate::identity::{is_canonical, mint_provisional, normalize_snapshot, resolve_created_id};
use crate::notice::{Notice, NoticeKind};
use crate::persistence::LocalStore;
use crate::sequencer::IdSequencer;
use crate::task::{normalize_text, CreateTaskRequest, Task, TaskFilter, UpdateTaskRequest};

/// Kind of user intent a reconciliation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Toggle,
    Edit,
    Delete,
    ClearCompleted,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::Create => "create",
            Intent::Toggle => "toggle",
            Intent::Edit => "edit",
            Intent::Delete => "delete",
            Intent::ClearCompleted => "clear-completed",
        };
        f.write_str(name)
    }
}

/// How the remote phase of an intent ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The service accepted the change.
    Confirmed,
    /// Create succeeded and the provisional id was replaced.
    Remapped { provisional: String, canonical: String },
    /// Create succeeded but no id could be read from the response.
    Unresolved,
    /// Non-canonical id; nothing was sent.
    LocalOnly,
    /// The task vanished or the session moved on before the change landed.
    Superseded,
    /// The call failed. `rolled_back` is true when local state was restored.
    Failed { error: RemoteError, rolled_back: bool },
    /// Some deletes of a clear-completed batch failed.
    BatchFailed { failed: usize, total: usize },
    /// The credential was rejected and the session ended.
    SignedOut,
}

/// Result of a snapshot fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Replaced { count: usize },
    /// The response was not a task list; local state kept.
    NothingToSync,
    Failed(RemoteError),
    SignedOut,
    Superseded,
    NotAuthenticated,
}

type BoxOutcome = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Pending remote phase of an intent.
pub struct Reconciliation {
    intent: Intent,
    task_id: String,
    future: BoxOutcome,
}

impl Reconciliation {
    fn new<F>(intent: Intent, task_id: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            intent,
            task_id: task_id.into(),
            future: Box::pin(future),
        }
    }

    fn ready(intent: Intent, task_id: impl Into<String>, outcome: Outcome) -> Self {
        Self::new(intent, task_id, std::future::ready(outcome))
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Id the intent targeted at issue time. Empty for clear-completed.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl fmt::Debug for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciliation")
            .field("intent", &self.intent)
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for Reconciliation {
    type Output = Outcome;
    type IntoFuture = BoxOutcome;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

struct Inner {
    tasks: Mutex<Vec<Task>>,
    notice: Mutex<Option<Notice>>,
    epoch: AtomicU64,
    sequencer: IdSequencer,
    gateway: RemoteGateway,
    mirror: Option<Arc<LocalStore>>,
}

impl Inner {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Run `f` against the collection and write the result through to the
    /// mirror while the lock is still held.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Task>) -> R) -> R {
        let mut tasks = self.tasks.lock();
        let result = f(&mut tasks);
        self.persist(&tasks);
        result
    }

    fn persist(&self, tasks: &[Task]) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save_tasks(tasks) {
                tracing::error!("Failed to persist tasks: {}", e);
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.tasks.lock().iter().any(|t| t.id == id)
    }

    fn raise(&self, epoch: u64, kind: NoticeKind) {
        if !self.is_current(epoch) {
            tracing::debug!("Dropping stale notice: {}", kind.message());
            return;
        }
        tracing::warn!("{}", kind.message());
        *self.notice.lock() = Some(kind.into());
    }

    /// Start a new epoch with an empty collection.
    fn discard(&self, why: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.mutate(|tasks| tasks.clear());
        *self.notice.lock() = None;
        self.sequencer.reset();
        tracing::info!("Discarded local tasks ({})", why);
    }
}

/// Owner of the in-memory task collection.
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<Inner>,
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("tasks", &self.inner.tasks.lock().len())
            .field("epoch", &self.inner.epoch())
            .finish_non_exhaustive()
    }
}

/// Reinsert `task` at `position`, clamped to the current length. A task
/// whose id is already present again is left alone.
fn restore_removed(tasks: &mut Vec<Task>, position: usize, task: Task) {
    if tasks.iter().any(|t| t.id == task.id) {
        tracing::debug!("{} already present, not restoring", task.id);
        return;
    }
    let at = position.min(tasks.len());
    tasks.insert(at, task);
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ReconciliationEngine {
    /// Build the engine, seeding the collection from `mirror` and subscribing
    /// to the gateway's session so a sign-out discards local tasks.
    pub fn new(gateway: RemoteGateway, mirror: Option<Arc<LocalStore>>) -> Self {
        let tasks = mirror
            .as_ref()
            .map(|m| m.load_tasks().into_tasks())
            .unwrap_or_default();
        tracing::info!("Loaded {} task(s) from local store", tasks.len());

        let inner = Arc::new(Inner {
            tasks: Mutex::new(tasks),
            notice: Mutex::new(None),
            epoch: AtomicU64::new(0),
            sequencer: IdSequencer::new(),
            gateway,
            mirror,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.gateway.session().on_signed_out(move |reason| {
            if let Some(inner) = weak.upgrade() {
                let why = match reason {
                    SignOutReason::Logout => "logout",
                    SignOutReason::Expired => "session expired",
                    SignOutReason::Switched => "account switch",
                };
                inner.discard(why);
            }
        });

        Self { inner }
    }

    pub fn session(&self) -> &SessionManager {
        self.inner.gateway.session()
    }

    pub fn gateway(&self) -> &RemoteGateway {
        &self.inner.gateway
    }

    // ---- views ----

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.tasks.lock().clone()
    }

    pub fn filtered(&self, filter: TaskFilter) -> Vec<Task> {
        self.inner
            .tasks
            .lock()
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.inner.tasks.lock().iter().find(|t| t.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Number of incomplete tasks.
    pub fn items_left(&self) -> usize {
        self.inner.tasks.lock().iter().filter(|t| !t.completed).count()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.inner.notice.lock().clone()
    }

    pub fn clear_notice(&self) {
        *self.inner.notice.lock() = None;
    }

    // ---- intents ----

    /// Fetch the server snapshot and replace the local collection with it.
    pub async fn sync(&self) -> SyncOutcome {
        if !self.session().is_authenticated() {
            tracing::debug!("Not signed in, skipping sync");
            return SyncOutcome::NotAuthenticated;
        }

        let inner = &self.inner;
        let epoch = inner.epoch();
        match inner.gateway.fetch_tasks().await {
            Ok(Payload::Json(Value::Array(items))) => {
                if !inner.is_current(epoch) {
                    return SyncOutcome::Superseded;
                }
                let tasks = normalize_snapshot(&items, now_ms());
                let count = tasks.len();
                inner.epoch.fetch_add(1, Ordering::SeqCst);
                inner.mutate(|current| *current = tasks);
                *inner.notice.lock() = None;
                tracing::info!("Synced {} task(s) from server", count);
                SyncOutcome::Replaced { count }
            }
            Ok(other) => {
                tracing::debug!("Task list response was not a list: {:?}", other);
                if inner.is_current(epoch) {
                    *inner.notice.lock() = None;
                }
                SyncOutcome::NothingToSync
            }
            Err(e) if e.is_auth() => SyncOutcome::SignedOut,
            Err(e) => {
                inner.raise(epoch, NoticeKind::SyncFailed);
                SyncOutcome::Failed(e)
            }
        }
    }

    /// Prepend a new task under a provisional id.
    ///
    /// Returns `None` when the text is blank; nothing changes in that case.
    pub fn create(&self, raw_text: &str) -> Option<Reconciliation> {
        let Some(text) = normalize_text(raw_text) else {
            tracing::debug!("Rejected create with empty text");
            return None;
        };

        let now = now_ms();
        let provisional = mint_provisional(now);
        let task = Task {
            id: provisional.clone(),
            text: text.clone(),
            completed: false,
            created_at: now,
        };
        self.inner.mutate(|tasks| tasks.insert(0, task));
        tracing::debug!("Created {} locally", provisional);

        let inner = self.inner.clone();
        let epoch = inner.epoch();
        let mut turn = inner.sequencer.enqueue(&provisional);
        let id = provisional.clone();

        Some(Reconciliation::new(Intent::Create, provisional, async move {
            turn.wait().await;
            let response = match inner.gateway.create_task(&CreateTaskRequest { text }).await {
                Ok(payload) => payload.into_value(),
                Err(e) if e.is_auth() => return Outcome::SignedOut,
                Err(error) => {
                    inner.raise(epoch, NoticeKind::SavedLocally);
                    return Outcome::Failed {
                        error,
                        rolled_back: false,
                    };
                }
            };

            let Some(canonical) = resolve_created_id(&response) else {
                tracing::warn!("Could not read id from create response for {}: {}", id, response);
                return Outcome::Unresolved;
            };
            if !inner.is_current(epoch) {
                return Outcome::Superseded;
            }

            let remapped = inner.mutate(|tasks| {
                if tasks.iter().any(|t| t.id == canonical) {
                    tracing::warn!("Server id {} already present locally", canonical);
                    return false;
                }
                match tasks.iter_mut().find(|t| t.id == id) {
                    Some(task) => {
                        task.id = canonical.clone();
                        true
                    }
                    None => false,
                }
            });
            if !remapped {
                return Outcome::Superseded;
            }
            inner.sequencer.rename(&id, &canonical);
            tracing::debug!("Remapped {} -> {}", id, canonical);
            Outcome::Remapped {
                provisional: id,
                canonical,
            }
        }))
    }

    /// Flip completion. Returns `None` when no task has `id`.
    pub fn toggle(&self, id: &str) -> Option<Reconciliation> {
        let flipped = self.inner.mutate(|tasks| {
            let task = tasks.iter_mut().find(|t| t.id == id)?;
            task.completed = !task.completed;
            Some(task.completed)
        });
        let Some(completed) = flipped else {
            tracing::debug!("Toggle ignored, no task {}", id);
            return None;
        };

        Some(self.update_remote(
            Intent::Toggle,
            id,
            UpdateTaskRequest::completed(completed),
            NoticeKind::ToggleFailed,
        ))
    }

    /// Replace a task's text. Returns `None` for blank text or an unknown id.
    pub fn edit(&self, id: &str, raw_text: &str) -> Option<Reconciliation> {
        let Some(text) = normalize_text(raw_text) else {
            tracing::debug!("Rejected edit of {} with empty text", id);
            return None;
        };

        let found = self.inner.mutate(|tasks| match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.text = text.clone();
                true
            }
            None => false,
        });
        if !found {
            tracing::debug!("Edit ignored, no task {}", id);
            return None;
        }

        Some(self.update_remote(
            Intent::Edit,
            id,
            UpdateTaskRequest::text(text),
            NoticeKind::EditFailed,
        ))
    }

    /// PUT without compensation: on failure the local value stays.
    fn update_remote(
        &self,
        intent: Intent,
        id: &str,
        request: UpdateTaskRequest,
        on_failure: NoticeKind,
    ) -> Reconciliation {
        if !is_canonical(id) {
            return Reconciliation::ready(intent, id, Outcome::LocalOnly);
        }

        let inner = self.inner.clone();
        let epoch = inner.epoch();
        let mut turn = inner.sequencer.enqueue(id);
        let task_id = id.to_string();

        Reconciliation::new(intent, id, async move {
            turn.wait().await;
            if !inner.contains(&task_id) {
                tracing::debug!("{} of {} skipped, task no longer present", intent, task_id);
                return Outcome::Superseded;
            }
            match inner.gateway.update_task(&task_id, &request).await {
                Ok(_) => Outcome::Confirmed,
                Err(e) if e.is_auth() => Outcome::SignedOut,
                Err(error) => {
                    inner.raise(epoch, on_failure);
                    Outcome::Failed {
                        error,
                        rolled_back: false,
                    }
                }
            }
        })
    }

    /// Remove a task. A failed remote delete puts the task back at its old
    /// position in the current collection; changes made by other intents in
    /// the meantime are kept.
    pub fn delete(&self, id: &str) -> Option<Reconciliation> {
        let removed = self.inner.mutate(|tasks| {
            let position = tasks.iter().position(|t| t.id == id)?;
            Some((position, tasks.remove(position)))
        });
        let Some((position, removed)) = removed else {
            tracing::debug!("Delete ignored, no task {}", id);
            return None;
        };

        if !is_canonical(id) {
            return Some(Reconciliation::ready(Intent::Delete, id, Outcome::LocalOnly));
        }

        let inner = self.inner.clone();
        let epoch = inner.epoch();
        let mut turn = inner.sequencer.enqueue(id);
        let task_id = id.to_string();

        Some(Reconciliation::new(Intent::Delete, id, async move {
            turn.wait().await;
            match inner.gateway.delete_task(&task_id).await {
                Ok(_) => Outcome::Confirmed,
                Err(e) if e.is_auth() => Outcome::SignedOut,
                Err(error) => {
                    if !inner.is_current(epoch) {
                        return Outcome::Failed {
                            error,
                            rolled_back: false,
                        };
                    }
                    inner.mutate(|tasks| restore_removed(tasks, position, removed));
                    inner.raise(epoch, NoticeKind::DeleteFailed);
                    Outcome::Failed {
                        error,
                        rolled_back: true,
                    }
                }
            }
        }))
    }

    /// Remove every completed task and delete the canonical ones remotely,
    /// concurrently. Failures are reported once and not rolled back.
    pub fn clear_completed(&self) -> Option<Reconciliation> {
        let removed: Vec<Task> = self.inner.mutate(|tasks| {
            let (done, keep): (Vec<Task>, Vec<Task>) = tasks.drain(..).partition(|t| t.completed);
            *tasks = keep;
            done
        });
        if removed.is_empty() {
            return None;
        }
        tracing::debug!("Cleared {} completed task(s) locally", removed.len());

        let remote: Vec<String> = removed
            .into_iter()
            .map(|t| t.id)
            .filter(|id| is_canonical(id))
            .collect();
        if remote.is_empty() {
            return Some(Reconciliation::ready(
                Intent::ClearCompleted,
                "",
                Outcome::LocalOnly,
            ));
        }

        let inner = self.inner.clone();
        let epoch = inner.epoch();
        let batch: Vec<_> = remote
            .into_iter()
            .map(|id| {
                let turn = inner.sequencer.enqueue(&id);
                (id, turn)
            })
            .collect();

        Some(Reconciliation::new(Intent::ClearCompleted, "", async move {
            let total = batch.len();
            let mut set = JoinSet::new();
            for (id, mut turn) in batch {
                let gateway = inner.gateway.clone();
                set.spawn(async move {
                    turn.wait().await;
                    let result = gateway.delete_task(&id).await;
                    (id, result)
                });
            }

            let mut failed_ids = Vec::new();
            let mut signed_out = false;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((_, Ok(_))) => {}
                    Ok((_, Err(e))) if e.is_auth() => signed_out = true,
                    Ok((id, Err(e))) => {
                        tracing::debug!("Delete of {} failed: {}", id, e);
                        failed_ids.push(id);
                    }
                    Err(e) => {
                        tracing::error!("Delete task panicked: {}", e);
                        failed_ids.push(String::from("<unknown>"));
                    }
                }
            }

            if signed_out {
                return Outcome::SignedOut;
            }
            if failed_ids.is_empty() {
                return Outcome::Confirmed;
            }
            tracing::warn!(
                "{} of {} completed task(s) still on server: {}",
                failed_ids.len(),
                total,
                failed_ids.join(", ")
            );
            inner.raise(epoch, NoticeKind::ClearFailed);
            Outcome::BatchFailed {
                failed: failed_ids.len(),
                total,
            }
        }))
    }

    /// Clear local state only. Does nothing unless `confirmed`.
    pub fn reset(&self, confirmed: bool) -> bool {
        if !confirmed {
            tracing::debug!("Reset not confirmed");
            return false;
        }
        self.inner.discard("reset");
        true
    }

    /// Drop the collection (used on sign-out).
    pub fn discard(&self) {
        self.inner.discard("discard");
    }
}
