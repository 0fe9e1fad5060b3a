//! A live, renewable subscription to one location.
//!
//! Each subscription owns:
//!
//! - a cancellation scope, a child of its manager's, shared by both of its
//!   background tasks;
//! - a "next" [`Deferred`] settled by the next response and then replaced;
//! - a watch channel holding the latest snapshot, shared by every stream;
//! - a keepalive task that renews the server registration every
//!   keepalive period and sends a final `Stop` when the scope ends;
//! - a [`CleanupTimer`] armed whenever nobody is interested any more.
//!
//! "Interested" means a stream consumer is attached or a caller is waiting
//! for the next value. A one-shot caller promoted into the subscription
//! counts as waiting until the first response arrives. Once nobody is
//! interested for a full cleanup window the subscription closes itself,
//! whether or not the server ever answered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use telemetry_protocol::{C2SRequest, RequestKind, RequestSink, S2CResponse, TickInterval};
use telemetry_types::{Location, SharedSnapshot};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::client::cleanup_timer::CleanupTimer;
use crate::client::deferred::Deferred;
use crate::error::SyncError;

/// Called once when a subscription closes itself, to drop it from its
/// manager's table.
pub type RemoveCallback = Box<dyn Fn(&Location, &Subscription) + Send + Sync>;

/// Everything a subscription needs from its manager.
pub(crate) struct SubscriptionContext {
    pub(crate) sink: Arc<dyn RequestSink>,
    pub(crate) handle: Handle,
    pub(crate) parent: CancellationToken,
    pub(crate) keepalive_period: Duration,
    pub(crate) cleanup_window: Duration,
    pub(crate) on_remove: RemoveCallback,
}

#[derive(Debug, Default)]
struct Liveness {
    consumers: usize,
    waiters: usize,
    promoted_waiter: bool,
    closed: bool,
}

impl Liveness {
    const fn is_live(&self) -> bool {
        self.consumers > 0 || self.waiters > 0 || self.promoted_waiter
    }
}

#[derive(Debug)]
struct Dispatch {
    next: Deferred<SharedSnapshot>,
    highest_tick: Option<i64>,
}

/// Client-side state of one subscription.
pub struct Subscription {
    location: Location,
    interval: TickInterval,
    sink: Arc<dyn RequestSink>,
    handle: Handle,
    token: CancellationToken,
    dispatch: Mutex<Dispatch>,
    latest: watch::Sender<Option<SharedSnapshot>>,
    liveness: Mutex<Liveness>,
    timer: CleanupTimer,
    stop_sent: AtomicBool,
    on_remove: RemoveCallback,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("location", &self.location)
            .field("interval", &self.interval)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Create a subscription and start its keepalive task. The caller has
    /// already sent the `KeepaliveStart`. `first_next` lets a promoted
    /// one-shot request hand over its pending value.
    pub(crate) fn open(
        location: Location,
        interval: TickInterval,
        first_next: Option<Deferred<SharedSnapshot>>,
        ctx: SubscriptionContext,
    ) -> Arc<Self> {
        let token = ctx.parent.child_token();
        let promoted_waiter = first_next.is_some();
        let subscription = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let timer = CleanupTimer::new(
                ctx.cleanup_window,
                Arc::new(move || {
                    if let Some(subscription) = weak.upgrade() {
                        subscription.on_cleanup_timer();
                    }
                }),
            );
            let (latest, _rx) = watch::channel(None);
            Self {
                location,
                interval,
                sink: ctx.sink,
                handle: ctx.handle,
                token,
                dispatch: Mutex::new(Dispatch {
                    next: first_next.unwrap_or_default(),
                    highest_tick: None,
                }),
                latest,
                liveness: Mutex::new(Liveness {
                    promoted_waiter,
                    ..Liveness::default()
                }),
                timer,
                stop_sent: AtomicBool::new(false),
                on_remove: ctx.on_remove,
            }
        });
        subscription.handle.spawn(keepalive_loop(
            Arc::clone(&subscription),
            ctx.keepalive_period,
        ));
        debug!(location = %subscription.location, interval = subscription.interval.get(), "subscription opened");
        subscription
    }

    /// The subscribed location.
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// The requested update interval.
    pub const fn interval(&self) -> TickInterval {
        self.interval
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Option<SharedSnapshot> {
        self.latest.borrow().clone()
    }

    /// Whether the subscription has closed.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.lock_liveness().closed
    }

    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn watch_latest(&self) -> watch::Receiver<Option<SharedSnapshot>> {
        self.latest.subscribe()
    }

    fn lock_liveness(&self) -> MutexGuard<'_, Liveness> {
        self.liveness.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dispatch(&self) -> MutexGuard<'_, Dispatch> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to the liveness counters, arming the cleanup timer
    /// when interest drops to nothing and disarming it when interest comes
    /// back. Returns `false` without applying anything once closed.
    fn update_liveness(&self, change: impl FnOnce(&mut Liveness)) -> bool {
        let mut liveness = self.lock_liveness();
        if liveness.closed {
            return false;
        }
        let was_live = liveness.is_live();
        change(&mut liveness);
        let is_live = liveness.is_live();
        if was_live && !is_live {
            trace!(location = %self.location, "subscription idle, arming cleanup timer");
            self.timer.arm(&self.handle, &self.token);
        } else if !was_live && is_live {
            self.timer.disarm();
        }
        true
    }

    /// Attach a stream consumer. Returns `None` once closed.
    pub(crate) fn attach_consumer(self: &Arc<Self>) -> Option<ConsumerGuard> {
        self.update_liveness(|l| l.consumers = l.consumers.saturating_add(1))
            .then(|| ConsumerGuard {
                subscription: Arc::clone(self),
            })
    }

    /// Register interest in the next value. Returns `None` once closed.
    pub(crate) fn begin_wait(self: &Arc<Self>) -> Option<NextWaiter> {
        let next = self.lock_dispatch().next.clone();
        self.update_liveness(|l| l.waiters = l.waiters.saturating_add(1))
            .then(|| NextWaiter {
                subscription: Arc::clone(self),
                next,
            })
    }

    /// Handle a response for this subscription's location.
    ///
    /// A response older than one already published is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SubscriptionClosed`] if the subscription has
    /// closed.
    pub(crate) fn on_result(&self, response: &S2CResponse) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::SubscriptionClosed {
                location: self.location.clone(),
            });
        }
        {
            let mut dispatch = self.lock_dispatch();
            if let (Some(tick), Some(highest)) = (response.server_tick, dispatch.highest_tick) {
                if tick < highest {
                    debug!(location = %self.location, tick, highest, "dropping stale response");
                    return Ok(());
                }
            }
            if let Some(tick) = response.server_tick {
                dispatch.highest_tick = Some(tick);
            }
            let snapshot = Arc::clone(&response.observations);
            dispatch.next.complete(Arc::clone(&snapshot));
            dispatch.next = Deferred::new();
            self.latest.send_replace(Some(snapshot));
        }
        self.update_liveness(|l| l.promoted_waiter = false);
        Ok(())
    }

    fn on_cleanup_timer(&self) {
        {
            let mut liveness = self.lock_liveness();
            if liveness.closed || liveness.is_live() {
                return;
            }
            liveness.closed = true;
        }
        debug!(location = %self.location, "subscription unobserved for a full cleanup window, closing");
        if let Err(err) = self.teardown(true) {
            warn!(location = %self.location, error = %err, "failed to stop idle subscription");
        }
    }

    /// Close the subscription and drop it from its manager's table.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the final `Stop` could not be sent.
    pub fn close(&self) -> Result<(), SyncError> {
        if !self.mark_closed() {
            return Ok(());
        }
        self.teardown(true)
    }

    /// Close the subscription when its manager has already dropped it.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the final `Stop` could not be sent.
    pub(crate) fn close_without_callback(&self) -> Result<(), SyncError> {
        if !self.mark_closed() {
            return Ok(());
        }
        self.teardown(false)
    }

    fn mark_closed(&self) -> bool {
        let mut liveness = self.lock_liveness();
        !std::mem::replace(&mut liveness.closed, true)
    }

    fn teardown(&self, with_callback: bool) -> Result<(), SyncError> {
        self.token.cancel();
        self.timer.disarm();
        self.lock_dispatch().next.cancel();
        if with_callback {
            (self.on_remove)(&self.location, self);
        }
        debug!(location = %self.location, "subscription closed");
        self.send_stop_once()
    }

    fn send(&self, kind: RequestKind) -> Result<(), SyncError> {
        self.sink
            .send_to_server(C2SRequest::new(self.location.clone(), kind))
            .map_err(SyncError::from)
    }

    fn send_stop_once(&self) -> Result<(), SyncError> {
        if self.stop_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.send(RequestKind::Stop)
    }
}

/// Renew the server registration until the scope ends, then send the
/// final `Stop`.
async fn keepalive_loop(subscription: Arc<Subscription>, period: Duration) {
    let token = subscription.token.clone();
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(period) => {
                trace!(location = %subscription.location, "sending keepalive");
                if let Err(err) = subscription.send(RequestKind::Keepalive(subscription.interval)) {
                    warn!(location = %subscription.location, error = %err, "keepalive failed, closing subscription");
                    // No Stop over a transport that just failed.
                    subscription.stop_sent.store(true, Ordering::Release);
                    if let Err(err) = subscription.close() {
                        trace!(error = %err, "close after failed keepalive");
                    }
                    return;
                }
            }
        }
    }
    if let Err(err) = subscription.send_stop_once() {
        trace!(location = %subscription.location, error = %err, "final stop not delivered");
    }
}

/// Keeps a subscription alive while a stream consumer holds it.
#[derive(Debug)]
pub(crate) struct ConsumerGuard {
    subscription: Arc<Subscription>,
}

impl ConsumerGuard {
    pub(crate) const fn subscription(&self) -> &Arc<Subscription> {
        &self.subscription
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.subscription
            .update_liveness(|l| l.consumers = l.consumers.saturating_sub(1));
    }
}

/// A caller parked on a subscription's next value.
#[derive(Debug)]
pub(crate) struct NextWaiter {
    subscription: Arc<Subscription>,
    next: Deferred<SharedSnapshot>,
}

impl NextWaiter {
    /// Wait for the next value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if the subscription closes first.
    pub(crate) async fn wait(self) -> Result<SharedSnapshot, SyncError> {
        let token = self.subscription.token.clone();
        tokio::select! {
            result = self.next.wait() => result,
            () = token.cancelled() => Err(SyncError::Cancelled),
        }
    }
}

impl Drop for NextWaiter {
    fn drop(&mut self) {
        self.subscription
            .update_liveness(|l| l.waiters = l.waiters.saturating_sub(1));
    }
}
