//! Single-writer, many-reader event buffer.
//!
//! [`EventBuffer<T>`] is a fixed-capacity, TTL-aged, singly-linked list of
//! [`BufferItem`]s — the head and tail of the list are the only shared cells,
//! and each node carries the one-shot signals subscribers park on. The design
//! gives broadcast to an unbounded set of readers without per-reader
//! channels:
//!
//! ```text
//!  head                                   tail
//!   │                                      │
//!   ▼                                      ▼
//!  ┌────────┐  next   ┌────────┐  next   ┌────────┐
//!  │ item 3 │ ──────► │ item 4 │ ──────► │ item 5 │  next = unset
//!  │ ready✓ │         │ ready✓ │         │ ready─ │ ◄── cursors park here
//!  └────────┘         └────────┘         └────────┘
//! ```
//!
//! Appending a new item sets the old tail's `next` pointer and then fires
//! the old tail's ready latch; every cursor parked on that latch wakes and
//! follows the pointer. Readers never take the writer's locks — after
//! [`EventBuffer::tail`] hands them a starting point they only touch
//! write-once `next` pointers and latches.
//!
//! A new buffer holds a sentinel item with no events so that subscribers
//! created before the first publication have a stable wait point. Consumers
//! must treat items with empty event slices as no-ops.
//!
//! # Single-writer contract
//!
//! [`append`](EventBuffer::append), [`append_err`](EventBuffer::append_err)
//! and [`prune`](EventBuffer::prune) support a single concurrent caller and
//! must be externally serialized; the publisher serializes them behind its
//! writer mutex. Everything else is safe to call from any number of tasks.
//!
//! # Retention
//!
//! The buffer keeps at most `max_size` appended items, evicting from the
//! head; the pruner additionally ages items out by TTL. Evicted items are
//! only freed once the slowest cursor drops its reference, so real memory
//! is bounded by `max_size` plus whatever prefix slow readers still hold.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::error::StreamError;
use super::event::Event;
use super::signal::Latch;

/// Shared link metadata, decoupled from item content.
///
/// The indirection lets a cursor wait on "the next item" without retaining
/// the current item's payload: [`BufferItem::next_link`] hands out an empty
/// item that shares this link. Allocated with its item and never reassigned.
struct BufferLink<T> {
    /// Successor pointer, written exactly once by the single writer before
    /// `ready` fires.
    next: OnceLock<Arc<BufferItem<T>>>,
    /// Fired when `next` has been set. Reading `next` is only valid after
    /// observing this signal.
    ready: Latch,
    /// Fired when the owning item is evicted from the buffer. A cursor
    /// observing this on the item it is about to consume has fallen behind.
    dropped: Latch,
}

impl<T> BufferLink<T> {
    fn new() -> Self {
        Self {
            next: OnceLock::new(),
            ready: Latch::new(),
            dropped: Latch::new(),
        }
    }
}

/// One node of the buffer: the batch of events published at a single commit
/// index, plus the signals cursors wait on.
///
/// Items are shared read-only between the writer and all cursors. Holding an
/// item keeps every later item reachable, so subscribers should not retain
/// items after consuming them unless they intentionally cache history.
pub struct BufferItem<T> {
    /// Commit index whose events this item carries.
    index: u64,
    /// Events published at `index`. Empty for the sentinel and for
    /// error-terminator items.
    events: Arc<[Event<T>]>,
    /// Terminal error, present only on items appended by
    /// [`EventBuffer::append_err`]. Subscribers surface it and stop.
    err: Option<StreamError>,
    /// Construction timestamp, used for TTL pruning.
    created_at: Instant,
    link: Arc<BufferLink<T>>,
}

impl<T> BufferItem<T> {
    fn new(index: u64, events: Vec<Event<T>>) -> Self {
        Self {
            index,
            events: events.into(),
            err: None,
            created_at: Instant::now(),
            link: Arc::new(BufferLink::new()),
        }
    }

    fn terminal(err: StreamError) -> Self {
        Self {
            index: 0,
            events: Vec::new().into(),
            err: Some(err),
            created_at: Instant::now(),
            link: Arc::new(BufferLink::new()),
        }
    }

    /// An empty item that shares `link` — a wait point without the payload.
    fn empty_from_link(link: Arc<BufferLink<T>>) -> Self {
        Self {
            index: 0,
            events: Vec::new().into(),
            err: None,
            created_at: Instant::now(),
            link,
        }
    }

    /// Returns the commit index of this item.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns the events carried by this item. Empty for the sentinel.
    #[must_use]
    pub fn events(&self) -> &Arc<[Event<T>]> {
        &self.events
    }

    /// Returns the terminal error, if this item ends the stream.
    #[must_use]
    pub fn err(&self) -> Option<&StreamError> {
        self.err.as_ref()
    }

    /// Waits for and returns the successor of this item.
    ///
    /// Parks until the writer publishes a successor, the cancellation token
    /// fires, or `force_close` fires.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Cancelled`] if `cancel` fired first.
    /// - [`StreamError::SubscriptionClosed`] if `force_close` fired first.
    /// - [`StreamError::SlowReader`] if this item was evicted before the
    ///   successor could be read.
    /// - [`StreamError::Terminated`] (or whatever error the producer
    ///   appended) if the successor is a terminal item.
    /// - [`StreamError::InvalidNextItem`] if the ready signal fired without
    ///   a successor being set — a single-writer discipline bug.
    pub async fn next(
        &self,
        cancel: &CancellationToken,
        force_close: &Latch,
    ) -> Result<Arc<BufferItem<T>>, StreamError> {
        tokio::select! {
            () = cancel.cancelled() => return Err(StreamError::Cancelled),
            () = force_close.fired() => return Err(StreamError::SubscriptionClosed),
            () = self.link.ready.fired() => {}
        }

        // The writer may have evicted this item between notification and
        // inspection; the reader is too slow in that case.
        if self.link.dropped.is_fired() {
            return Err(StreamError::SlowReader);
        }

        let Some(next) = self.link.next.get() else {
            return Err(StreamError::InvalidNextItem);
        };
        if let Some(err) = &next.err {
            return Err(err.clone());
        }
        Ok(Arc::clone(next))
    }

    /// Returns the successor without blocking, or `None` at the tail.
    #[must_use]
    pub fn next_no_block(&self) -> Option<Arc<BufferItem<T>>> {
        self.link.next.get().cloned()
    }

    /// Returns the successor if one exists, or an empty item sharing this
    /// item's link.
    ///
    /// The empty item carries none of this item's content but wakes on the
    /// same ready signal, which is how a new subscription parks on the
    /// current tail without holding the tail's payload.
    #[must_use]
    pub fn next_link(&self) -> Arc<BufferItem<T>> {
        match self.next_no_block() {
            Some(next) => next,
            None => Arc::new(BufferItem::empty_from_link(Arc::clone(&self.link))),
        }
    }
}

impl<T> std::fmt::Debug for BufferItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferItem")
            .field("index", &self.index)
            .field("events", &self.events.len())
            .field("err", &self.err)
            .finish_non_exhaustive()
    }
}

/// Single-writer, many-reader, fixed-capacity buffer of published events.
///
/// See the [module docs](self) for the design. Constructed via
/// [`EventBuffer::new`]; the capacity counts appended items, not the
/// sentinel.
pub struct EventBuffer<T> {
    /// Number of live appended items. The list always holds one more node
    /// than `size`: the consumed head the next live item hangs off.
    size: AtomicUsize,
    max_size: usize,
    max_item_ttl: Duration,
    head: RwLock<Arc<BufferItem<T>>>,
    tail: RwLock<Arc<BufferItem<T>>>,
}

impl<T> EventBuffer<T> {
    /// Creates a buffer holding at most `max_size` items, each aged out
    /// after `max_item_ttl` by [`prune`](EventBuffer::prune).
    ///
    /// The buffer starts with a sentinel item so subscribers can wait for
    /// the first publication immediately.
    #[must_use]
    pub fn new(max_size: usize, max_item_ttl: Duration) -> Self {
        let sentinel = Arc::new(BufferItem::new(0, Vec::new()));
        Self {
            size: AtomicUsize::new(0),
            max_size,
            max_item_ttl,
            head: RwLock::new(Arc::clone(&sentinel)),
            tail: RwLock::new(sentinel),
        }
    }

    /// Appends the events of one commit and notifies waiting cursors.
    ///
    /// After the call the events are exposed to subscribers on other tasks
    /// and must not be mutated. Single concurrent caller only; see the
    /// [module docs](self).
    ///
    /// # Panics
    ///
    /// Panics if two writers append concurrently (the single-writer
    /// contract was broken).
    pub fn append(&self, index: u64, events: Vec<Event<T>>) {
        self.append_item(Arc::new(BufferItem::new(index, events)));
    }

    /// Appends a terminal error item.
    ///
    /// Used by a producer that cannot complete its work: subscribers
    /// reaching the item surface the error and stop, and the buffer stays
    /// structurally consistent. Single concurrent caller only.
    ///
    /// # Panics
    ///
    /// Panics if two writers append concurrently (the single-writer
    /// contract was broken).
    pub fn append_err(&self, err: StreamError) {
        self.append_item(Arc::new(BufferItem::terminal(err)));
    }

    fn append_item(&self, item: Arc<BufferItem<T>>) {
        let old_tail = self.tail();

        // Publish the successor pointer before updating tail. The link is
        // written exactly once; a second write means two writers.
        assert!(
            old_tail.link.next.set(Arc::clone(&item)).is_ok(),
            "event buffer item linked twice; append callers must be serialized"
        );
        *self.tail.write() = item;

        let size = self.size.fetch_add(1, Ordering::Release) + 1;
        if size > self.max_size {
            self.advance_head();
        }

        // Wake parked cursors last, so a reader that races the eviction
        // above still observes an already-pruned head.
        old_tail.link.ready.fire();
    }

    /// Drops the current head and signals cursors still parked on it that
    /// they have fallen behind.
    fn advance_head(&self) {
        let old = self.head();
        let next = old
            .link
            .next
            .get()
            .cloned()
            .expect("non-empty event buffer head has no successor");

        old.link.dropped.fire();
        *self.head.write() = next;
        self.size.fetch_sub(1, Ordering::Release);
    }

    /// Ages out items whose TTL has expired, oldest first.
    ///
    /// Must be serialized with [`append`](EventBuffer::append) by the
    /// caller; the publisher runs this under its writer mutex.
    pub fn prune(&self) {
        loop {
            if self.len() == 0 {
                return;
            }
            if self.head().created_at.elapsed() > self.max_item_ttl {
                self.advance_head();
            } else {
                return;
            }
        }
    }

    /// Returns the current head item.
    ///
    /// Always exists, but may be the sentinel or an already-consumed item
    /// with an empty event slice.
    #[must_use]
    pub fn head(&self) -> Arc<BufferItem<T>> {
        Arc::clone(&self.head.read())
    }

    /// Returns the current tail item.
    #[must_use]
    pub fn tail(&self) -> Arc<BufferItem<T>> {
        Arc::clone(&self.tail.read())
    }

    /// Returns the number of live appended items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Returns `true` if no appended items are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for EventBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("max_item_ttl", &self.max_item_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(topic: &str, key: &str, index: u64) -> Event<u64> {
        Event::new(topic, key, index, index)
    }

    fn walk_indices(buffer: &EventBuffer<u64>) -> Vec<u64> {
        let mut indices = Vec::new();
        let mut item = buffer.head();
        while let Some(next) = item.next_no_block() {
            indices.push(next.index());
            item = next;
        }
        indices
    }

    #[test]
    fn test_new_buffer_has_sentinel() {
        let buffer = EventBuffer::<u64>::new(4, Duration::from_secs(3600));
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert!(Arc::ptr_eq(&buffer.head(), &buffer.tail()));
        assert!(buffer.head().events().is_empty());
    }

    #[test]
    fn test_append_links_items_in_order() {
        let buffer = EventBuffer::new(8, Duration::from_secs(3600));
        for index in 1..=3 {
            buffer.append(index, vec![event("jobs", "a", index)]);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(walk_indices(&buffer), vec![1, 2, 3]);
        assert_eq!(buffer.tail().index(), 3);
    }

    #[test]
    fn test_append_evicts_past_max_size() {
        let buffer = EventBuffer::new(2, Duration::from_secs(3600));
        for index in 1..=4 {
            buffer.append(index, vec![event("jobs", "a", index)]);
        }

        assert_eq!(buffer.len(), 2);
        // Head is the consumed predecessor of the oldest live item.
        assert_eq!(walk_indices(&buffer), vec![3, 4]);
    }

    #[test]
    fn test_eviction_fires_dropped_signal() {
        let buffer = EventBuffer::new(1, Duration::from_secs(3600));
        let sentinel = buffer.head();

        buffer.append(1, vec![event("jobs", "a", 1)]);
        assert!(!sentinel.link.dropped.is_fired());

        buffer.append(2, vec![event("jobs", "a", 2)]);
        assert!(sentinel.link.dropped.is_fired());
    }

    #[test]
    fn test_ready_fires_after_eviction() {
        // A reader woken by an append must already see the pruned head.
        let buffer = EventBuffer::new(1, Duration::from_secs(3600));
        buffer.append(1, vec![event("jobs", "a", 1)]);
        let first = buffer.tail();

        buffer.append(2, vec![event("jobs", "a", 2)]);
        assert!(first.link.ready.is_fired());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_prune_expired_items() {
        let buffer = EventBuffer::new(10, Duration::ZERO);
        for index in 1..=3 {
            buffer.append(index, vec![event("jobs", "a", index)]);
        }
        let tail = buffer.tail();

        std::thread::sleep(Duration::from_millis(5));
        buffer.prune();

        assert_eq!(buffer.len(), 0);
        // The tail node itself is retained as the next wait point.
        assert!(Arc::ptr_eq(&buffer.head(), &tail));
    }

    #[test]
    fn test_prune_retains_fresh_items() {
        let buffer = EventBuffer::new(10, Duration::from_secs(3600));
        buffer.append(1, vec![event("jobs", "a", 1)]);
        buffer.prune();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_next_link_parks_on_tail() {
        let buffer = EventBuffer::<u64>::new(4, Duration::from_secs(3600));
        let cursor = buffer.tail().next_link();
        assert!(cursor.events().is_empty());

        buffer.append(1, vec![event("jobs", "a", 1)]);
        let next = cursor.next_no_block().expect("append must set next");
        assert_eq!(next.index(), 1);
    }

    #[tokio::test]
    async fn test_next_wakes_on_publish() {
        let buffer = Arc::new(EventBuffer::new(4, Duration::from_secs(3600)));
        let cursor = buffer.tail().next_link();
        let cancel = CancellationToken::new();
        let force_close = Latch::new();

        let writer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                buffer.append(7, vec![event("jobs", "a", 7)]);
            })
        };

        let next = tokio::time::timeout(
            Duration::from_secs(5),
            cursor.next(&cancel, &force_close),
        )
        .await
        .expect("next must wake on publish")
        .expect("next must succeed");

        assert_eq!(next.index(), 7);
        writer.await.expect("writer task");
    }

    #[tokio::test]
    async fn test_next_returns_published_item_immediately() {
        let buffer = EventBuffer::new(4, Duration::from_secs(3600));
        let cursor = buffer.tail().next_link();
        buffer.append(1, vec![event("jobs", "a", 1)]);

        let next = cursor
            .next(&CancellationToken::new(), &Latch::new())
            .await
            .expect("published item must be returned");
        assert_eq!(next.index(), 1);
    }

    #[tokio::test]
    async fn test_next_cancelled() {
        let buffer = EventBuffer::<u64>::new(4, Duration::from_secs(3600));
        let cursor = buffer.tail().next_link();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cursor
            .next(&cancel, &Latch::new())
            .await
            .expect_err("cancelled wait must fail");
        assert_eq!(err, StreamError::Cancelled);
    }

    #[tokio::test]
    async fn test_next_force_closed() {
        let buffer = EventBuffer::<u64>::new(4, Duration::from_secs(3600));
        let cursor = buffer.tail().next_link();

        let force_close = Latch::new();
        force_close.fire();

        let err = cursor
            .next(&CancellationToken::new(), &force_close)
            .await
            .expect_err("force-closed wait must fail");
        assert_eq!(err, StreamError::SubscriptionClosed);
    }

    #[tokio::test]
    async fn test_next_detects_slow_reader() {
        let buffer = EventBuffer::new(1, Duration::from_secs(3600));
        let cursor = buffer.tail().next_link();

        buffer.append(1, vec![event("jobs", "a", 1)]);
        buffer.append(2, vec![event("jobs", "a", 2)]);

        let err = cursor
            .next(&CancellationToken::new(), &Latch::new())
            .await
            .expect_err("evicted cursor must fail");
        assert_eq!(err, StreamError::SlowReader);
    }

    #[tokio::test]
    async fn test_append_err_terminates_readers() {
        let buffer = EventBuffer::<u64>::new(4, Duration::from_secs(3600));
        let cursor = buffer.tail().next_link();

        buffer.append_err(StreamError::Terminated("snapshot failed".to_string()));

        let err = cursor
            .next(&CancellationToken::new(), &Latch::new())
            .await
            .expect_err("terminal item must surface its error");
        assert_eq!(err, StreamError::Terminated("snapshot failed".to_string()));
    }

    #[tokio::test]
    async fn test_multiple_cursors_observe_same_events() {
        let buffer = Arc::new(EventBuffer::new(8, Duration::from_secs(3600)));
        let c1 = buffer.tail().next_link();
        let c2 = buffer.tail().next_link();

        buffer.append(1, vec![event("jobs", "a", 1), event("jobs", "b", 1)]);

        let cancel = CancellationToken::new();
        let force_close = Latch::new();
        let i1 = c1.next(&cancel, &force_close).await.expect("cursor one");
        let i2 = c2.next(&cancel, &force_close).await.expect("cursor two");

        // Both cursors share the identical batch, not copies.
        assert!(Arc::ptr_eq(i1.events(), i2.events()));
        assert_eq!(i1.events().len(), 2);
    }
}
