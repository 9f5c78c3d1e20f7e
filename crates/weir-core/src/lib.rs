//! # Weir Core
//!
//! The in-process event stream core for a cluster-coordination service: a
//! bounded publish/subscribe buffer that lets one committing writer fan
//! state-change events out to any number of subscribers without per-reader
//! channels and without ever blocking on a slow consumer.
//!
//! See the [`stream`] module for the full design; the main entry points are
//! [`EventPublisher`](stream::EventPublisher) and
//! [`Subscription`](stream::Subscription).

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod stream;

pub use stream::{
    Event, EventBuffer, EventPublisher, PublisherConfig, StreamError, SubscribeRequest,
    Subscription, ALL_KEYS, ALL_TOPICS,
};

/// Result type for event stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
