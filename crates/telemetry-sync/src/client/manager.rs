//! The requesting side's pending-request table.
//!
//! One entry per location, either a one-shot request waiting for its
//! response or a live [`Subscription`]. Entries are created and replaced
//! through the map's entry API, so two callers racing for the same
//! location always end up sharing a single entry and a single request on
//! the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use telemetry_protocol::{C2SRequest, RequestKind, RequestSink, S2CResponse, TickInterval};
use telemetry_types::{Location, SharedSnapshot};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::client::deferred::Deferred;
use crate::client::stream::SubscriptionStream;
use crate::client::subscription::{NextWaiter, RemoveCallback, Subscription, SubscriptionContext};
use crate::config::SyncConfig;
use crate::error::{ErrorAccumulator, SyncError};

/// One entry of the pending-request table.
#[derive(Debug, Clone)]
pub enum PendingRequest {
    /// A one-shot request awaiting its response.
    Single(Deferred<SharedSnapshot>),
    /// A live subscription.
    Subscription(Arc<Subscription>),
}

impl PendingRequest {
    fn is_subscription(&self, subscription: &Subscription) -> bool {
        matches!(self, Self::Subscription(entry) if std::ptr::eq(Arc::as_ptr(entry), subscription))
    }
}

type PendingTable = DashMap<Location, PendingRequest>;

enum Waiter {
    Single(Deferred<SharedSnapshot>),
    Next(NextWaiter),
}

/// Client-side manager for one connection.
pub struct SyncManagerClient {
    sink: Arc<dyn RequestSink>,
    pending: Arc<PendingTable>,
    root: CancellationToken,
    handle: Handle,
    closed: AtomicBool,
    cleanup_window: Duration,
    keepalive_period: Duration,
}

impl std::fmt::Debug for SyncManagerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManagerClient")
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .field("cleanup_window", &self.cleanup_window)
            .field("keepalive_period", &self.keepalive_period)
            .finish_non_exhaustive()
    }
}

impl SyncManagerClient {
    /// Create a manager that sends its requests through `sink`. Background
    /// tasks run on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoRuntime`] when called outside a runtime.
    pub fn new(sink: Arc<dyn RequestSink>, config: &SyncConfig) -> Result<Self, SyncError> {
        let handle = Handle::try_current().map_err(|_no_runtime| SyncError::NoRuntime)?;
        Ok(Self {
            sink,
            pending: Arc::new(DashMap::new()),
            root: CancellationToken::new(),
            handle,
            closed: AtomicBool::new(false),
            cleanup_window: config.client.subscription_timeout(),
            keepalive_period: config.keepalive_period(),
        })
    }

    /// How long an unobserved subscription lingers.
    pub const fn cleanup_window(&self) -> Duration {
        self.cleanup_window
    }

    /// How often subscriptions renew themselves.
    pub const fn keepalive_period(&self) -> Duration {
        self.keepalive_period
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of entries in the table.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The live subscription for `location`, if any.
    pub fn subscription(&self, location: &Location) -> Option<Arc<Subscription>> {
        self.pending.get(location).and_then(|entry| match entry.value() {
            PendingRequest::Subscription(subscription) => Some(Arc::clone(subscription)),
            PendingRequest::Single(_) => None,
        })
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        Ok(())
    }

    fn send(&self, location: &Location, kind: RequestKind) -> Result<(), SyncError> {
        self.sink
            .send_to_server(C2SRequest::new(location.clone(), kind))
            .map_err(SyncError::from)
    }

    fn send_single(&self, location: &Location) -> Result<Deferred<SharedSnapshot>, SyncError> {
        self.send(location, RequestKind::Single)?;
        trace!(location = %location, "sent single request");
        Ok(Deferred::new())
    }

    /// Request one snapshot of `location`.
    ///
    /// Concurrent callers for the same location share one request. If the
    /// location already has a live subscription, the caller receives its
    /// next value instead.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] on a closed manager, a transport error
    /// if the request could not be sent, or [`SyncError::Cancelled`] if the
    /// manager closes before the response arrives.
    pub async fn request_single(&self, location: Location) -> Result<SharedSnapshot, SyncError> {
        let waiter = {
            let entry = self.pending.entry(location);
            // Checked under the entry so nothing lands behind close()'s sweep.
            self.ensure_open()?;
            match entry {
                Entry::Occupied(mut occupied) => {
                    let existing = occupied.get().clone();
                    match existing {
                        PendingRequest::Single(deferred) => Waiter::Single(deferred),
                        PendingRequest::Subscription(subscription) => {
                            if let Some(waiter) = subscription.begin_wait() {
                                Waiter::Next(waiter)
                            } else {
                                let deferred = self.send_single(occupied.key())?;
                                occupied.insert(PendingRequest::Single(deferred.clone()));
                                Waiter::Single(deferred)
                            }
                        }
                    }
                }
                Entry::Vacant(vacant) => {
                    let deferred = self.send_single(vacant.key())?;
                    vacant.insert(PendingRequest::Single(deferred.clone()));
                    Waiter::Single(deferred)
                }
            }
        };
        match waiter {
            Waiter::Single(deferred) => deferred.wait().await,
            Waiter::Next(waiter) => waiter.wait().await,
        }
    }

    /// Subscribe to `location`, receiving a snapshot every `interval`
    /// ticks until every stream is dropped or the subscription is closed.
    ///
    /// A pending one-shot request for the same location is promoted, and
    /// its response becomes the subscription's first value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] on a closed manager or a transport
    /// error if the subscription could not be started.
    pub fn request_subscription(
        &self,
        location: Location,
        interval: TickInterval,
    ) -> Result<SubscriptionStream, SyncError> {
        let entry = self.pending.entry(location);
        self.ensure_open()?;
        let subscription = match entry {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get().clone();
                let first_next = match existing {
                    PendingRequest::Subscription(subscription) => {
                        if let Some(guard) = subscription.attach_consumer() {
                            return Ok(SubscriptionStream::new(guard));
                        }
                        None
                    }
                    PendingRequest::Single(deferred) => Some(deferred),
                };
                let promoted = first_next.is_some();
                let subscription =
                    self.open_subscription(occupied.key(), interval, first_next)?;
                occupied.insert(PendingRequest::Subscription(Arc::clone(&subscription)));
                if promoted {
                    debug!(location = %subscription.location(), "promoted single request to subscription");
                }
                subscription
            }
            Entry::Vacant(vacant) => {
                let subscription = self.open_subscription(vacant.key(), interval, None)?;
                vacant.insert(PendingRequest::Subscription(Arc::clone(&subscription)));
                subscription
            }
        };
        let guard = subscription.attach_consumer().ok_or(SyncError::Closed)?;
        Ok(SubscriptionStream::new(guard))
    }

    fn open_subscription(
        &self,
        location: &Location,
        interval: TickInterval,
        first_next: Option<Deferred<SharedSnapshot>>,
    ) -> Result<Arc<Subscription>, SyncError> {
        self.send(location, RequestKind::KeepaliveStart(interval))?;
        let ctx = SubscriptionContext {
            sink: Arc::clone(&self.sink),
            handle: self.handle.clone(),
            parent: self.root.clone(),
            keepalive_period: self.keepalive_period,
            cleanup_window: self.cleanup_window,
            on_remove: self.remove_callback(),
        };
        Ok(Subscription::open(location.clone(), interval, first_next, ctx))
    }

    fn remove_callback(&self) -> RemoveCallback {
        let table = Arc::downgrade(&self.pending);
        Box::new(move |location: &Location, subscription: &Subscription| {
            if let Some(table) = table.upgrade() {
                table.remove_if(location, |_, entry| entry.is_subscription(subscription));
            }
        })
    }

    /// Dispatch a response from the server to whatever is waiting on its
    /// location. Returns `false` if nothing was.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] on a closed manager. An error while
    /// dispatching into a subscription closes that subscription and is
    /// returned.
    pub fn accept_response(&self, response: &S2CResponse) -> Result<bool, SyncError> {
        self.ensure_open()?;
        let location = &response.location;
        let Entry::Occupied(occupied) = self.pending.entry(location.clone()) else {
            trace!(location = %location, "response for a location nobody is waiting on");
            return Ok(false);
        };
        let subscription = match occupied.get() {
            PendingRequest::Subscription(subscription) => Some(Arc::clone(subscription)),
            PendingRequest::Single(_) => None,
        };
        let Some(subscription) = subscription else {
            if let PendingRequest::Single(deferred) = occupied.remove() {
                deferred.complete(Arc::clone(&response.observations));
            }
            trace!(location = %location, "completed single request");
            return Ok(true);
        };
        match subscription.on_result(response) {
            Ok(()) => Ok(true),
            Err(err) => {
                occupied.remove();
                if let Err(close_err) = subscription.close_without_callback() {
                    debug!(location = %location, error = %close_err, "stop after failed dispatch not delivered");
                }
                Err(err)
            }
        }
    }

    /// Close the subscription for `location` and tell the server to stop.
    /// Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] on a closed manager or the transport
    /// error if the `Stop` could not be sent.
    pub fn unsubscribe(&self, location: &Location) -> Result<bool, SyncError> {
        self.ensure_open()?;
        let removed = self
            .pending
            .remove_if(location, |_, entry| matches!(entry, PendingRequest::Subscription(_)));
        match removed {
            Some((_, PendingRequest::Subscription(subscription))) => {
                subscription.close_without_callback()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Tear down every entry. Pending one-shot requests are cancelled and
    /// every subscription sends its `Stop`. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Every entry is closed even if some fail. Returns the collected
    /// failures (see [`ErrorAccumulator`]), or [`SyncError::TableNotEmpty`]
    /// if entries were added while closing.
    pub fn close(&self) -> Result<(), SyncError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut errors = ErrorAccumulator::new();
        let locations: Vec<Location> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let total = locations.len();
        for location in locations {
            match self.pending.remove(&location) {
                Some((_, PendingRequest::Single(deferred))) => {
                    deferred.cancel();
                }
                Some((_, PendingRequest::Subscription(subscription))) => {
                    errors.record(subscription.close_without_callback());
                }
                None => {}
            }
        }
        self.root.cancel();
        debug!(entries = total, failures = errors.len(), "client sync manager closed");
        let remaining = self.pending.len();
        if remaining > 0 {
            return Err(SyncError::TableNotEmpty {
                remaining,
                causes: errors.into_errors(),
            });
        }
        errors.into_result()
    }
}

impl Drop for SyncManagerClient {
    fn drop(&mut self) {
        self.root.cancel();
        for entry in self.pending.iter() {
            if let PendingRequest::Single(deferred) = entry.value() {
                deferred.cancel();
            }
        }
    }
}
