//! Queue manager configuration.

use std::time::Duration;

use civdl_core::Settings;

use crate::store::DEFAULT_HISTORY_LIMIT;

/// Tuning for the queue manager.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum concurrent transfers in the main lane.
    pub max_concurrent: usize,
    /// Concurrent transfers reserved for `is_test` tasks.
    pub test_lane_slots: usize,
    /// Cadence of progress writes to the store.
    pub progress_interval: Duration,
    /// How long a completed task counts as recent.
    pub recent_window: Duration,
    /// Finished tasks kept before the oldest are evicted.
    pub history_limit: usize,
    /// How long to stay in direct-only mode after the delegate went away.
    pub delegate_cooldown: Duration,
    /// How long `cancel` waits for a running transfer to wind down.
    pub cancel_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            test_lane_slots: 1,
            progress_interval: Duration::from_millis(300),
            recent_window: Duration::from_secs(10 * 60),
            history_limit: DEFAULT_HISTORY_LIMIT,
            delegate_cooldown: Duration::from_secs(60),
            cancel_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Defaults with the concurrency cap taken from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::default().with_max_concurrent(settings.max_concurrent_downloads)
    }

    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    #[must_use]
    pub const fn with_test_lane_slots(mut self, slots: usize) -> Self {
        self.test_lane_slots = slots;
        self
    }

    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_recent_window(mut self, window: Duration) -> Self {
        self.recent_window = window;
        self
    }

    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_delegate_cooldown(mut self, cooldown: Duration) -> Self {
        self.delegate_cooldown = cooldown;
        self
    }

    #[must_use]
    pub const fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    pub(crate) fn recent_window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.recent_window).unwrap_or(chrono::Duration::MAX)
    }
}
