//! Optimistic local state with rollback.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::{Mutex, RwLock};

/// Local state whose mutations become visible before the backend confirms
///
/// Each mutation runs the same protocol:
/// 1. snapshot the state and apply the local change
/// 2. await the remote write
/// 3. on success reconcile with the canonical record, on failure restore
///    the snapshot exactly
///
/// Mutations are serialized, so a rollback never discards a change made by
/// a concurrent mutation. Readers are never blocked by an in-flight write
/// and see the optimistic value.
#[derive(Debug, Default)]
pub struct OptimisticCell<S> {
    state: RwLock<S>,
    writer: Mutex<()>,
    reverts: AtomicU64,
}

impl<S: Clone> OptimisticCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: RwLock::new(initial),
            writer: Mutex::new(()),
            reverts: AtomicU64::new(0),
        }
    }

    /// Copy of the visible state
    pub async fn get(&self) -> S {
        self.state.read().await.clone()
    }

    /// Read the visible state without copying it
    pub async fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&*self.state.read().await)
    }

    /// Replace the state wholesale, e.g. after a fresh load
    pub async fn replace(&self, next: S) {
        let _writer = self.writer.lock().await;
        *self.state.write().await = next;
    }

    /// Number of mutations rolled back so far
    pub fn revert_count(&self) -> u64 {
        self.reverts.load(Ordering::Relaxed)
    }

    /// Apply `local` immediately, then settle with the result of `remote`
    ///
    /// # Arguments
    ///
    /// * `local` - Optimistic change to the visible state
    /// * `remote` - Backend write confirming the change
    /// * `reconcile` - Folds the canonical record into the state on success
    ///
    /// # Returns
    ///
    /// * `Result<T, E>` - The remote result; on `Err` the state equals the
    ///   pre-mutation snapshot
    pub async fn mutate<T, E, Fut>(
        &self,
        local: impl FnOnce(&mut S),
        remote: Fut,
        reconcile: impl FnOnce(&mut S, &T),
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let _writer = self.writer.lock().await;

        let snapshot = {
            let mut state = self.state.write().await;
            let snapshot = state.clone();
            local(&mut state);
            snapshot
        };

        match remote.await {
            Ok(canonical) => {
                reconcile(&mut *self.state.write().await, &canonical);
                Ok(canonical)
            }
            Err(e) => {
                *self.state.write().await = snapshot;
                self.reverts.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}
