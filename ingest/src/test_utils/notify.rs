use std::time::Duration;
use std::{fmt, sync::Arc};

use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::warn;

/// Default timeout for notifications.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// A wrapper around [`Arc<Notify>`] failing tests that wait for a condition never reached.
#[derive(Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    /// Creates a new [`TimedNotify`] with the default timeout.
    pub fn new(notify: Arc<Notify>) -> Self {
        Self::with_timeout(notify, DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(notify: Arc<Notify>, timeout_duration: Duration) -> Self {
        Self {
            notify,
            timeout_duration,
        }
    }

    /// Waits for a notification.
    ///
    /// # Panics
    ///
    /// Panics if the timeout elapses before the notification is received.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "Test notification timed out after {:?}. \
                 The awaited condition was never reached.",
                self.timeout_duration
            );
        }
    }

    /// Waits for a notification, only logging when the timeout elapses.
    pub async fn try_notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            warn!(
                "Test notification timed out after {:?}. \
                 The awaited condition was never reached.",
                self.timeout_duration
            );
        }
    }

    pub fn inner(&self) -> &Arc<Notify> {
        &self.notify
    }
}

impl fmt::Debug for TimedNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedNotify")
            .field("timeout_duration", &self.timeout_duration)
            .finish()
    }
}
