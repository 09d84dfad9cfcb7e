//! Per-task ordering of remote calls.
//!
//! Each id keeps a chain of turns. A turn resolves once every turn enqueued
//! before it for the same id has finished (or been dropped), so remote calls
//! for one task reach the server in issue order while calls for different
//! tasks run freely.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

#[derive(Debug, Default)]
pub struct IdSequencer {
    tails: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

/// A reserved slot in an id's chain. Dropping it releases the next turn.
#[derive(Debug)]
pub struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    _release: oneshot::Sender<()>,
}

impl Turn {
    /// Wait for every earlier turn on the same id to finish.
    pub async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Err means the sender was dropped, which is also a release.
            let _ = previous.await;
        }
    }
}

impl IdSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next turn for `id`. Must be called synchronously at issue
    /// time so order matches intent order.
    pub fn enqueue(&self, id: &str) -> Turn {
        let (release, tail) = oneshot::channel();
        let previous = {
            let mut tails = self.tails.lock();
            prune_released(&mut tails);
            tails.insert(id.to_string(), tail)
        };
        Turn {
            previous,
            _release: release,
        }
    }

    /// Move the chain of `from` to `to` after an id remap.
    pub fn rename(&self, from: &str, to: &str) {
        let mut tails = self.tails.lock();
        if let Some(tail) = tails.remove(from) {
            tails.insert(to.to_string(), tail);
        }
    }

    /// Drop bookkeeping for every id (session reset).
    pub fn reset(&self) {
        self.tails.lock().clear();
    }

    /// Ids with a turn still outstanding.
    pub fn tracked(&self) -> usize {
        let mut tails = self.tails.lock();
        prune_released(&mut tails);
        tails.len()
    }
}

/// Drop chains whose last turn has already been released.
fn prune_released(tails: &mut HashMap<String, oneshot::Receiver<()>>) {
    tails.retain(|_, tail| matches!(tail.try_recv(), Err(TryRecvError::Empty)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_turn_is_immediate() {
        let seq = IdSequencer::new();
        let mut turn = seq.enqueue("a");
        tokio::time::timeout(Duration::from_millis(50), turn.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_turns_run_in_enqueue_order() {
        let seq = IdSequencer::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut first = seq.enqueue("a");
        let mut second = seq.enqueue("a");

        let log2 = log.clone();
        let later = tokio::spawn(async move {
            second.wait().await;
            log2.lock().push(2);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(log.lock().is_empty());

        first.wait().await;
        log.lock().push(1);
        drop(first);

        later.await.unwrap();
        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let seq = IdSequencer::new();
        let _held = seq.enqueue("a");
        let mut other = seq.enqueue("b");
        tokio::time::timeout(Duration::from_millis(50), other.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rename_carries_chain() {
        let seq = IdSequencer::new();
        let held = seq.enqueue("local-1-aaaaaaaa");
        seq.rename("local-1-aaaaaaaa", "abc123");
        let mut next = seq.enqueue("abc123");

        let waiter = tokio::spawn(async move { next.wait().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_released_ids_are_pruned() {
        let seq = IdSequencer::new();
        let held = seq.enqueue("a");
        let done = seq.enqueue("b");
        assert_eq!(seq.tracked(), 2);

        drop(done);
        assert_eq!(seq.tracked(), 1);

        drop(held);
        let _c = seq.enqueue("c");
        assert_eq!(seq.tracked(), 1);
    }

    #[tokio::test]
    async fn test_turn_after_prune_is_immediate() {
        let seq = IdSequencer::new();
        drop(seq.enqueue("a"));
        let _other = seq.enqueue("b");
        let mut again = seq.enqueue("a");
        tokio::time::timeout(Duration::from_millis(50), again.wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_reset_clears() {
        let seq = IdSequencer::new();
        let _a = seq.enqueue("a");
        let _b = seq.enqueue("b");
        assert_eq!(seq.tracked(), 2);
        seq.reset();
        assert_eq!(seq.tracked(), 0);
    }
}
