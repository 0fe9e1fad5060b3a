//! A settable, cloneable, awaitable one-shot value.
//!
//! Every clone observes the same outcome. The first of
//! [`Deferred::complete`] and [`Deferred::cancel`] wins; later calls are
//! ignored.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::SyncError;

#[derive(Debug, Clone)]
enum State<T> {
    Pending,
    Completed(T),
    Cancelled,
}

/// A value that will be provided later.
#[derive(Debug)]
pub struct Deferred<T> {
    tx: Arc<watch::Sender<State<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    /// Create a pending value.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(State::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// Provide the value. Returns `false` if it was already settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(State::Completed(value))
    }

    /// Cancel every waiter. Returns `false` if it was already settled.
    pub fn cancel(&self) -> bool {
        self.settle(State::Cancelled)
    }

    fn settle(&self, outcome: State<T>) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|state| {
            if !matches!(state, State::Pending) {
                return false;
            }
            if let Some(outcome) = outcome.take() {
                *state = outcome;
            }
            true
        })
    }

    /// Whether neither a value nor a cancellation has been provided.
    pub fn is_pending(&self) -> bool {
        matches!(*self.tx.borrow(), State::Pending)
    }

    /// Whether both handles refer to the same value.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    /// Wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if the value was cancelled.
    pub async fn wait(&self) -> Result<T, SyncError> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, State::Pending))
            .await
            .map_err(|_closed| SyncError::Cancelled)?;
        match &*state {
            State::Completed(value) => Ok(value.clone()),
            State::Pending | State::Cancelled => Err(SyncError::Cancelled),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_clone_sees_the_value() {
        let deferred = Deferred::new();
        let other = deferred.clone();
        let waiter = tokio::spawn(async move { other.wait().await });
        tokio::task::yield_now().await;
        assert!(deferred.complete(7));
        assert_eq!(waiter.await.unwrap().unwrap(), 7);
        assert_eq!(deferred.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn first_outcome_wins() {
        let deferred = Deferred::new();
        assert!(deferred.cancel());
        assert!(!deferred.complete(1));
        assert!(!deferred.is_pending());
        assert!(matches!(deferred.wait().await, Err(SyncError::Cancelled)));
    }

    #[test]
    fn completion_without_waiters_is_kept() {
        let deferred = Deferred::new();
        assert!(deferred.is_pending());
        assert!(deferred.complete("done"));
        assert!(!deferred.is_pending());
        assert!(deferred.same_as(&deferred.clone()));
        assert!(!deferred.same_as(&Deferred::new()));
    }
}
