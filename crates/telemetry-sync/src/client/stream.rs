//! Consumer-facing view of a subscription.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use futures::stream::{self, BoxStream, StreamExt};
use telemetry_types::{Location, SharedSnapshot};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::subscription::{ConsumerGuard, Subscription};
use crate::error::SyncError;

/// Stream of snapshots for one subscribed location.
///
/// Yields the latest known snapshot first (if any), then every newer one.
/// Values published faster than the consumer polls are coalesced to the
/// most recent. The stream ends when the subscription closes. Dropping the
/// last stream of a subscription starts its cleanup window.
pub struct SubscriptionStream {
    guard: ConsumerGuard,
    inner: BoxStream<'static, SharedSnapshot>,
}

impl std::fmt::Debug for SubscriptionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("location", self.location())
            .finish_non_exhaustive()
    }
}

struct Feed {
    rx: watch::Receiver<Option<SharedSnapshot>>,
    token: CancellationToken,
    primed: bool,
}

impl SubscriptionStream {
    pub(crate) fn new(guard: ConsumerGuard) -> Self {
        let subscription = guard.subscription();
        let feed = Feed {
            rx: subscription.watch_latest(),
            token: subscription.token().clone(),
            primed: false,
        };
        let inner = stream::unfold(feed, |mut feed| async move {
            if !feed.primed {
                feed.primed = true;
                let current = feed.rx.borrow_and_update().clone();
                if let Some(snapshot) = current {
                    return Some((snapshot, feed));
                }
            }
            loop {
                tokio::select! {
                    biased;
                    changed = feed.rx.changed() => {
                        changed.ok()?;
                        let current = feed.rx.borrow_and_update().clone();
                        if let Some(snapshot) = current {
                            return Some((snapshot, feed));
                        }
                    }
                    () = feed.token.cancelled() => return None,
                }
            }
        })
        .boxed();
        Self { guard, inner }
    }

    /// The subscribed location.
    pub fn location(&self) -> &Location {
        self.guard.subscription().location()
    }

    /// The most recent snapshot, without waiting.
    pub fn latest(&self) -> Option<SharedSnapshot> {
        self.guard.subscription().latest()
    }

    /// Whether the underlying subscription has closed.
    pub fn is_closed(&self) -> bool {
        self.guard.subscription().is_closed()
    }

    /// The underlying subscription.
    pub fn subscription(&self) -> &Arc<Subscription> {
        self.guard.subscription()
    }

    /// Close the subscription for every consumer and tell the server to
    /// stop.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the `Stop` could not be sent.
    pub fn unsubscribe(self) -> Result<(), SyncError> {
        self.guard.subscription().close()
    }
}

impl Stream for SubscriptionStream {
    type Item = SharedSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
