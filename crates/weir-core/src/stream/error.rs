//! Event stream error types.

/// Error type for subscription reads and buffer traversal.
///
/// [`Cancelled`](StreamError::Cancelled) is recoverable — the subscription
/// stays open and a later call may succeed. Every other variant is terminal
/// for the subscription that observes it; the client must subscribe again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The subscription was closed by the server; the client should
    /// resubscribe.
    #[error("subscription closed by server, client should resubscribe")]
    SubscriptionClosed,

    /// The item the cursor was standing on was evicted from the buffer
    /// before it could be read; the subscriber fell behind the retention
    /// window.
    #[error("event dropped from buffer, subscriber fell behind")]
    SlowReader,

    /// The caller's cancellation token fired while waiting for the next
    /// item. The subscription remains usable.
    #[error("event stream read cancelled")]
    Cancelled,

    /// The producer terminated the stream with an error; no further events
    /// will be published past this point.
    #[error("event stream terminated by producer: {0}")]
    Terminated(String),

    /// The buffer announced a successor that was not present. This is a
    /// bug in the single-writer discipline, not an expected runtime state.
    #[error("invalid next item in event buffer")]
    InvalidNextItem,
}
