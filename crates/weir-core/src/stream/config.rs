//! Publisher configuration.

use std::time::Duration;

/// Default capacity of the event buffer (appended items, not events).
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default TTL applied when the configured TTL is zero.
pub const DEFAULT_BUFFER_TTL: Duration = Duration::from_secs(60 * 60);

/// Publisher configuration.
///
/// A zero `buffer_ttl` falls back to [`DEFAULT_BUFFER_TTL`]; a zero
/// `prune_interval` disables the pruner entirely.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum number of buffered items before head eviction.
    pub buffer_size: usize,

    /// Maximum age of a buffered item before the pruner drops it.
    pub buffer_ttl: Duration,

    /// How often the pruner wakes to age items out. Zero disables pruning.
    pub prune_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_ttl: DEFAULT_BUFFER_TTL,
            prune_interval: Duration::ZERO,
        }
    }
}

impl PublisherConfig {
    /// Creates a configuration with the given buffer capacity and defaults
    /// for everything else.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..Default::default()
        }
    }

    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> PublisherConfigBuilder {
        PublisherConfigBuilder::default()
    }

    /// Returns the TTL with the zero-means-default rule applied.
    #[must_use]
    pub fn effective_ttl(&self) -> Duration {
        if self.buffer_ttl.is_zero() {
            DEFAULT_BUFFER_TTL
        } else {
            self.buffer_ttl
        }
    }
}

/// Builder for [`PublisherConfig`].
#[derive(Debug, Default)]
pub struct PublisherConfigBuilder {
    buffer_size: Option<usize>,
    buffer_ttl: Option<Duration>,
    prune_interval: Option<Duration>,
}

impl PublisherConfigBuilder {
    /// Sets the buffer capacity.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Sets the item TTL.
    #[must_use]
    pub fn buffer_ttl(mut self, buffer_ttl: Duration) -> Self {
        self.buffer_ttl = Some(buffer_ttl);
        self
    }

    /// Sets the prune interval. Zero disables pruning.
    #[must_use]
    pub fn prune_interval(mut self, prune_interval: Duration) -> Self {
        self.prune_interval = Some(prune_interval);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> PublisherConfig {
        let defaults = PublisherConfig::default();
        PublisherConfig {
            buffer_size: self.buffer_size.unwrap_or(defaults.buffer_size),
            buffer_ttl: self.buffer_ttl.unwrap_or(defaults.buffer_ttl),
            prune_interval: self.prune_interval.unwrap_or(defaults.prune_interval),
        }
    }
}
