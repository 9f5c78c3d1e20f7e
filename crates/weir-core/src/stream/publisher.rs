//! Event publisher: the single writer in front of the buffer.
//!
//! [`EventPublisher`] owns one [`EventBuffer`] and serializes every append
//! onto it through a capacity-1 hand-off channel and a dedicated writer
//! task, so committers stay decoupled from buffer maintenance and the
//! buffer sees exactly one writer no matter how many tasks publish:
//!
//! ```text
//!  commit ──► publish() ──► hand-off ──► writer task ──► EventBuffer
//!                                          │                  ▲
//!                                          │ writer mutex     │
//!                                          ▼                  │
//!                                       pruner task ──────────┘
//! ```
//!
//! [`publish`](EventPublisher::publish) blocks only for the rendezvous with
//! the writer task, never on subscribers. The pruner shares the writer
//! mutex so TTL aging and appends stay serialized.
//!
//! Both tasks are bounded by the [`CancellationToken`] handed to
//! [`new`](EventPublisher::new); cancelling it stops the writer and pruner
//! and force-closes every live subscription.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::buffer::EventBuffer;
use super::config::PublisherConfig;
use super::event::Event;
use super::filter::SubscribeRequest;
use super::subscription::{Subscription, SubscriptionHandle};

/// One commit's worth of events, handed from `publish` to the writer task.
struct ChangeEvents<T> {
    index: u64,
    events: Vec<Event<T>>,
}

/// Registry of live subscription handles, for forced closure.
#[derive(Default)]
struct SubscriptionSet {
    handles: Mutex<Vec<Weak<SubscriptionHandle>>>,
}

impl SubscriptionSet {
    fn register(&self, handle: &Arc<SubscriptionHandle>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| h.strong_count() > 0);
        handles.push(Arc::downgrade(handle));
    }

    fn close_all(&self) {
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            if let Some(handle) = handle.upgrade() {
                handle.close();
            }
        }
    }
}

/// Publishes committed events to any number of subscribers.
///
/// See the [module docs](self) for the task layout. Cheap to share behind
/// an `Arc`; all methods take `&self`.
pub struct EventPublisher<T> {
    buffer: Arc<EventBuffer<T>>,
    publish_tx: mpsc::Sender<ChangeEvents<T>>,
    subscriptions: Arc<SubscriptionSet>,
}

impl<T: Clone + Send + Sync + 'static> EventPublisher<T> {
    /// Creates a publisher and spawns its writer task, plus the pruner task
    /// when `config.prune_interval` is non-zero.
    ///
    /// Cancelling `cancel` terminates both tasks and force-closes all live
    /// subscriptions.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(config: PublisherConfig, cancel: CancellationToken) -> Self {
        let buffer = Arc::new(EventBuffer::new(config.buffer_size, config.effective_ttl()));
        let write_lock = Arc::new(Mutex::new(()));
        let subscriptions = Arc::new(SubscriptionSet::default());
        let (publish_tx, publish_rx) = mpsc::channel(1);

        tokio::spawn(write_loop(
            publish_rx,
            Arc::clone(&buffer),
            Arc::clone(&write_lock),
            Arc::clone(&subscriptions),
            cancel.clone(),
        ));
        if !config.prune_interval.is_zero() {
            tokio::spawn(prune_loop(
                Arc::clone(&buffer),
                Arc::clone(&write_lock),
                config.prune_interval,
                cancel,
            ));
        }

        Self {
            buffer,
            publish_tx,
            subscriptions,
        }
    }

    /// Publishes the events of one commit to all interested subscribers.
    ///
    /// An empty `events` slice is a no-op. Otherwise this is a rendezvous
    /// with the writer task: the call waits for the writer to accept the
    /// batch, not for the append or for any subscriber.
    pub async fn publish(&self, index: u64, events: Vec<Event<T>>) {
        if events.is_empty() {
            return;
        }
        if self
            .publish_tx
            .send(ChangeEvents { index, events })
            .await
            .is_err()
        {
            tracing::warn!(
                "event stream writer has stopped; dropping publish at index {index}"
            );
        }
    }

    /// Creates a subscription whose cursor parks on the current tail: it
    /// observes only events published after this call.
    #[must_use]
    pub fn subscribe(&self, req: SubscribeRequest) -> Subscription<T> {
        let handle = Arc::new(SubscriptionHandle::new());
        self.subscriptions.register(&handle);
        Subscription::new(req, self.buffer.tail().next_link(), handle)
    }

    /// Force-closes every live subscription.
    ///
    /// Each parked or future read returns
    /// [`StreamError::SubscriptionClosed`](super::StreamError::SubscriptionClosed);
    /// clients must subscribe again. The embedding system decides the
    /// policy — e.g. resetting streams after an access-control change.
    pub fn close_all(&self) {
        self.subscriptions.close_all();
    }

    /// Returns the number of items currently retained in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if the buffer retains no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<T> std::fmt::Debug for EventPublisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

/// Writer task: the sole mutator of the buffer.
async fn write_loop<T>(
    mut publish_rx: mpsc::Receiver<ChangeEvents<T>>,
    buffer: Arc<EventBuffer<T>>,
    write_lock: Arc<Mutex<()>>,
    subscriptions: Arc<SubscriptionSet>,
    cancel: CancellationToken,
) where
    T: Send + Sync + 'static,
{
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                subscriptions.close_all();
                return;
            }
            update = publish_rx.recv() => {
                // A closed channel means the publisher itself was dropped.
                let Some(update) = update else { return };
                let _guard = write_lock.lock();
                tracing::trace!(
                    "appending {} events at index {}",
                    update.events.len(),
                    update.index
                );
                buffer.append(update.index, update.events);
            }
        }
    }
}

/// Pruner task: ages buffered items out on a fixed tick.
async fn prune_loop<T>(
    buffer: Arc<EventBuffer<T>>,
    write_lock: Arc<Mutex<()>>,
    interval: Duration,
    cancel: CancellationToken,
) where
    T: Send + Sync + 'static,
{
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = tick.tick() => {
                let _guard = write_lock.lock();
                let before = buffer.len();
                buffer.prune();
                let pruned = before - buffer.len();
                if pruned > 0 {
                    tracing::debug!("pruned {pruned} expired items from event buffer");
                }
            }
        }
    }
}
