//! Error types for the telemetry-sync crate.
//!
//! Validation failures are not errors: a rejected request is treated as an
//! implicit stop and only logged. What remains are lifecycle errors
//! reported to the immediate caller, collaborator and transport failures
//! isolated per location, and aggregated teardown errors collected by
//! [`ErrorAccumulator`].

use telemetry_protocol::TransportError;
use telemetry_types::{Location, WorldId};

/// Errors raised by the sync managers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The manager has been closed.
    #[error("sync manager is closed")]
    Closed,

    /// A pending result was cancelled before a response arrived.
    #[error("pending observation request was cancelled")]
    Cancelled,

    /// A response was dispatched into a subscription that already closed.
    #[error("subscription for {location} is closed")]
    SubscriptionClosed {
        /// The subscription's location.
        location: Location,
    },

    /// The transport refused a message.
    #[error("transport error: {source}")]
    Transport {
        /// The underlying transport error.
        #[from]
        source: TransportError,
    },

    /// An observation container failed while being observed.
    #[error("observation failed: {source}")]
    Observe {
        /// The underlying collaborator error.
        #[from]
        source: ObserveError,
    },

    /// Several errors were raised while tearing down.
    #[error("{first} ({} more suppressed)", suppressed.len())]
    Teardown {
        /// The first error encountered.
        first: Box<SyncError>,
        /// Every later error, in the order encountered.
        suppressed: Vec<SyncError>,
    },

    /// Entries were left in a table after it was closed.
    #[error("{remaining} entries left after close ({} causes)", causes.len())]
    TableNotEmpty {
        /// Number of entries still present.
        remaining: usize,
        /// Errors accumulated while closing.
        causes: Vec<SyncError>,
    },

    /// The client manager was created outside a tokio runtime.
    #[error("no tokio runtime is available")]
    NoRuntime,

    /// A world session is already running.
    #[error("world session {0} is already running")]
    AlreadyRunning(WorldId),

    /// No world session is running for the id.
    #[error("world session {0} is not running")]
    NotRunning(WorldId),
}

/// Errors reported by an observation container.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserveError {
    /// The container could not be read right now.
    #[error("observation container unavailable: {reason}")]
    Unavailable {
        /// Why the container could not be read.
        reason: String,
    },

    /// One observation source failed.
    #[error("observation source {source_name} failed: {reason}")]
    Source {
        /// Name of the failing source.
        source_name: String,
        /// What went wrong.
        reason: String,
    },
}

/// Collects errors during a teardown so every entry is still given a chance
/// to close. One error is returned as-is; several are folded into
/// [`SyncError::Teardown`].
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<SyncError>,
}

impl ErrorAccumulator {
    /// Create an empty accumulator.
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Record an error.
    pub fn push(&mut self, err: SyncError) {
        self.errors.push(err);
    }

    /// Record the error of `result`, if any, and return its value.
    pub fn record<T>(&mut self, result: Result<T, SyncError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Every recorded error, in order.
    pub fn into_errors(self) -> Vec<SyncError> {
        self.errors
    }

    /// Fold the recorded errors into a single result.
    ///
    /// # Errors
    ///
    /// Returns the only recorded error, or [`SyncError::Teardown`] when
    /// several were recorded.
    pub fn into_result(self) -> Result<(), SyncError> {
        let mut errors = self.errors.into_iter();
        let Some(first) = errors.next() else {
            return Ok(());
        };
        let suppressed: Vec<SyncError> = errors.collect();
        if suppressed.is_empty() {
            return Err(first);
        }
        Err(SyncError::Teardown {
            first: Box::new(first),
            suppressed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_is_ok() {
        assert!(ErrorAccumulator::new().into_result().is_ok());
    }

    #[test]
    fn single_error_is_returned_unwrapped() {
        let mut acc = ErrorAccumulator::new();
        acc.push(SyncError::Cancelled);
        assert!(matches!(acc.into_result(), Err(SyncError::Cancelled)));
    }

    #[test]
    fn later_errors_are_suppressed_behind_the_first() {
        let mut acc = ErrorAccumulator::new();
        acc.push(SyncError::Closed);
        assert_eq!(acc.record::<()>(Err(SyncError::Cancelled)), None);
        assert_eq!(acc.record(Ok(3)), Some(3));
        acc.push(SyncError::NoRuntime);
        assert_eq!(acc.len(), 3);
        match acc.into_result() {
            Err(SyncError::Teardown { first, suppressed }) => {
                assert!(matches!(*first, SyncError::Closed));
                assert_eq!(suppressed.len(), 2);
            }
            other => panic!("expected teardown error, got {other:?}"),
        }
    }

    #[test]
    fn teardown_message_counts_suppressed() {
        let err = SyncError::Teardown {
            first: Box::new(SyncError::Closed),
            suppressed: vec![SyncError::Cancelled],
        };
        assert_eq!(err.to_string(), "sync manager is closed (1 more suppressed)");
    }
}
