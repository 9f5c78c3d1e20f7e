//! Per-reader subscriptions over the event buffer.
//!
//! A [`Subscription`] is a cursor over the buffer plus the interest set that
//! decides which events it surfaces. [`next`](Subscription::next) parks on
//! the buffer's signals until a batch with at least one matching event
//! arrives, transparently skipping sentinel, empty, and non-matching
//! batches, and reports eviction, forced closure, and cancellation as
//! distinct [`StreamError`]s.
//!
//! Closure is terminal: a closed subscription never reopens, and the client
//! obtains a fresh one from the publisher. Cancellation is not — a `next`
//! call that returns [`StreamError::Cancelled`] leaves the subscription
//! usable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use super::buffer::BufferItem;
use super::error::StreamError;
use super::event::Event;
use super::filter::{filter_events, SubscribeRequest};
use super::signal::Latch;

/// Shared closure state of one subscription.
///
/// Split out from [`Subscription`] so the publisher can keep a weak
/// reference and force-close readers it no longer wants to serve.
pub(crate) struct SubscriptionHandle {
    closed: AtomicBool,
    force_closed: Latch,
}

impl SubscriptionHandle {
    pub(crate) fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            force_closed: Latch::new(),
        }
    }

    /// Marks the subscription closed and wakes a parked `next`. Idempotent.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.force_closed.fire();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn force_closed(&self) -> &Latch {
        &self.force_closed
    }
}

/// A single reader's view of the event stream.
///
/// Obtained from [`EventPublisher::subscribe`](super::EventPublisher::subscribe).
/// The cursor starts on the publisher's current tail, so a subscription
/// observes only events published after it was created.
pub struct Subscription<T> {
    req: SubscribeRequest,
    /// The item whose successor `next` is awaiting.
    current: Arc<BufferItem<T>>,
    handle: Arc<SubscriptionHandle>,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(
        req: SubscribeRequest,
        cursor: Arc<BufferItem<T>>,
        handle: Arc<SubscriptionHandle>,
    ) -> Self {
        Self {
            req,
            current: cursor,
            handle,
        }
    }

    /// Waits for the next batch of matching events, in commit order.
    ///
    /// Batches without a matching event are skipped without returning.
    ///
    /// # Errors
    ///
    /// - [`StreamError::SubscriptionClosed`] once [`close`](Self::close) or
    ///   the publisher's forced closure has run; every later call returns
    ///   the same error.
    /// - [`StreamError::Cancelled`] if `cancel` fired; the subscription
    ///   remains open and a later call is valid. Model a timeout by
    ///   cancelling a child token after a deadline.
    /// - [`StreamError::SlowReader`] if the buffer evicted the cursor's
    ///   next item before it was read; resubscribe to continue from the
    ///   current stream position.
    /// - [`StreamError::Terminated`] if the producer ended the stream.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Arc<[Event<T>]>, StreamError> {
        if self.handle.is_closed() {
            return Err(StreamError::SubscriptionClosed);
        }

        loop {
            let item = match self
                .current
                .next(cancel, self.handle.force_closed())
                .await
            {
                // A racing forced closure wins over whatever error the
                // cursor surfaced.
                Err(_) if self.handle.is_closed() => {
                    return Err(StreamError::SubscriptionClosed)
                }
                Err(err) => return Err(err),
                Ok(item) => item,
            };
            self.current = Arc::clone(&item);

            let events = filter_events(&self.req, item.events());
            if events.is_empty() {
                continue;
            }
            return Ok(events);
        }
    }

    /// Closes the subscription. Terminal and idempotent; a parked
    /// [`next`](Self::next) returns [`StreamError::SubscriptionClosed`].
    pub fn close(&self) {
        self.handle.close();
    }

    /// Returns `true` once the subscription has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Converts the subscription into an async [`Stream`] of event batches.
    ///
    /// The stream yields `Ok` batches until a terminal error (or the
    /// token's cancellation) occurs, yields that error once, and then ends.
    pub fn into_stream(
        self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<Arc<[Event<T>]>, StreamError>> {
        futures::stream::unfold(Some(self), move |state| {
            let cancel = cancel.clone();
            async move {
                let mut sub = state?;
                match sub.next(&cancel).await {
                    Ok(events) => Some((Ok(events), Some(sub))),
                    Err(err) => Some((Err(err), None)),
                }
            }
        })
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.handle.is_closed())
            .field("cursor_index", &self.current.index())
            .finish_non_exhaustive()
    }
}
