use std::time::Duration;

use crate::retry::RetryPolicy;

/// Client-wide defaults for queries and mutations.
///
/// Per-call [`QueryOptions`](crate::query::QueryOptions) and
/// [`MutationOptions`](crate::mutation::MutationOptions) start from these
/// values and may override them.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long fetched data is served from the cache without refetching.
    ///
    /// The default of zero means every run goes to the transport.
    pub stale_time: Duration,

    /// Retry policy applied to failed attempts.
    pub retry: RetryPolicy,

    /// Whether activating a query triggers a fetch.
    pub refetch_on_mount: bool,

    /// Whether a focus-regain signal triggers a fetch for active queries.
    pub refetch_on_window_focus: bool,

    /// Buffer size of the invalidation and focus broadcast channels.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(0), // immediately stale
            retry: RetryPolicy::default(),
            refetch_on_mount: true,
            refetch_on_window_focus: true,
            channel_capacity: 100,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with the given stale time and retry policy.
    #[must_use]
    pub const fn new(stale_time: Duration, retry: RetryPolicy) -> Self {
        Self {
            stale_time,
            retry,
            refetch_on_mount: true,
            refetch_on_window_focus: true,
            channel_capacity: 100,
        }
    }

    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_refetch_on_mount(mut self, enabled: bool) -> Self {
        self.refetch_on_mount = enabled;
        self
    }

    #[must_use]
    pub const fn with_refetch_on_window_focus(mut self, enabled: bool) -> Self {
        self.refetch_on_window_focus = enabled;
        self
    }

    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
