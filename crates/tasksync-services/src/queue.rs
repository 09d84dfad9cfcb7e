//! In-flight reconciliations.

use tokio::task::JoinSet;

use crate::engine::{Intent, Outcome, Reconciliation};

/// Runs reconciliations on the current runtime and collects their outcomes.
///
/// Intents already applied locally stay applied whether or not the queue is
/// drained; dropping the queue aborts the remote phase of anything still
/// pending.
#[derive(Debug, Default)]
pub struct ReconcileQueue {
    set: JoinSet<(Intent, String, Outcome)>,
}

impl ReconcileQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the remote phase of `reconciliation`. Requires a tokio runtime.
    pub fn push(&mut self, reconciliation: Reconciliation) {
        let intent = reconciliation.intent();
        let task_id = reconciliation.task_id().to_string();
        self.set.spawn(async move {
            let outcome = reconciliation.await;
            (intent, task_id, outcome)
        });
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for everything pushed so far, in completion order.
    pub async fn drain(&mut self) -> Vec<(Intent, String, Outcome)> {
        let mut outcomes = Vec::with_capacity(self.set.len());
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok(entry) => {
                    tracing::debug!("{} {} finished: {:?}", entry.0, entry.1, entry.2);
                    outcomes.push(entry);
                }
                Err(e) => tracing::error!("Reconciliation task failed: {}", e),
            }
        }
        outcomes
    }
}
