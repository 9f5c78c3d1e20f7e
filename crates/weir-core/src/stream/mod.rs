//! # Event Stream
//!
//! In-process publish/subscribe event stream for cluster coordination:
//! producers commit state changes tagged with a monotonically increasing
//! index, and any number of subscribers receive the subset of events whose
//! topic/key they registered interest in, in commit order, without blocking
//! producers.
//!
//! ## Overview
//!
//! - [`EventBuffer`]: single-writer, many-reader, fixed-capacity, TTL-aged
//!   linked list whose nodes double as per-subscriber wait points
//! - [`EventPublisher`]: serializes appends onto one buffer through a
//!   hand-off channel and runs the periodic pruner
//! - [`Subscription`]: per-reader cursor with a blocking
//!   [`next`](Subscription::next), interest-set filtering, and typed
//!   slow-reader/closure/cancellation failures
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  publish   ┌────────────────┐  append   ┌─────────────┐
//! │ committer │ ─────────► │ EventPublisher │ ────────► │ EventBuffer │
//! └───────────┘ (hand-off) │ writer, pruner │ (1 writer)└──────┬──────┘
//!                          └────────────────┘                  │ wake
//!                                                              ▼
//!                          ┌──────────────┐  next()   ┌──────────────┐
//!                          │  subscriber  │ ◄──────── │ Subscription │
//!                          └──────────────┘ (filtered)└──────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use weir_core::stream::{Event, EventPublisher, PublisherConfig, SubscribeRequest, ALL_KEYS};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let publisher = EventPublisher::new(PublisherConfig::default(), CancellationToken::new());
//!
//! let mut sub = publisher.subscribe(SubscribeRequest::new().topic("jobs", [ALL_KEYS]));
//!
//! publisher
//!     .publish(1, vec![Event::new("jobs", "job-1", 1, "payload")])
//!     .await;
//!
//! let events = sub.next(&CancellationToken::new()).await.unwrap();
//! assert_eq!(events[0].key, "job-1");
//! # }
//! ```
//!
//! ## Delivery model
//!
//! Subscribers advance at independent paces; the buffer bounds memory by
//! capacity and age, and a reader that falls out of the retention window
//! gets [`StreamError::SlowReader`] instead of stalling the producer. A new
//! subscription observes only events published after it was created.

pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod publisher;
pub mod signal;
pub mod subscription;

pub use buffer::{BufferItem, EventBuffer};
pub use config::{PublisherConfig, PublisherConfigBuilder, DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_TTL};
pub use error::StreamError;
pub use event::{Event, ALL_KEYS, ALL_TOPICS};
pub use filter::{filter_events, SubscribeRequest};
pub use publisher::EventPublisher;
pub use signal::Latch;
pub use subscription::Subscription;
