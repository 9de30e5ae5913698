use std::time::Duration;

/// Bucket count of the subject registry
pub const DEFAULT_BUCKETS: usize = 512;

/// What a main-thread-only operation does when called from another thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPolicy {
    /// Log a warning and return [`DispatchError::WrongThread`](crate::DispatchError::WrongThread)
    #[default]
    Soft,
    /// Panic
    Strict,
}

/// Tuning for a [`SignalHandler`](crate::SignalHandler).
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Registry bucket count (at least 1)
    pub buckets: usize,
    /// Sleep between checks while `post_message_blocking` waits for the main thread
    pub blocking_poll_interval: Duration,
    pub thread_policy: ThreadPolicy,
    /// Panic when the handler is dropped with observers registered or work queued
    pub assert_quiescent_on_drop: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS,
            blocking_poll_interval: Duration::from_millis(1),
            thread_policy: ThreadPolicy::Soft,
            assert_quiescent_on_drop: cfg!(debug_assertions),
        }
    }
}

impl DispatcherConfig {
    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets.max(1);
        self
    }

    pub fn with_blocking_poll_interval(mut self, interval: Duration) -> Self {
        self.blocking_poll_interval = interval;
        self
    }

    pub fn with_thread_policy(mut self, policy: ThreadPolicy) -> Self {
        self.thread_policy = policy;
        self
    }

    pub fn with_assert_quiescent_on_drop(mut self, assert: bool) -> Self {
        self.assert_quiescent_on_drop = assert;
        self
    }
}
