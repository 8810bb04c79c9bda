//! Engine configuration.

use std::time::Duration;

/// Identity used for calls made without a message header.
pub const DEFAULT_FAKE_HEADER: &str = "eyJpZGVudGl0eSI6IHsiYWNjb3VudF9udW1iZXIiOiAiMTIzNDUiLCAidXNlciI6IHsiaXNfb3JnX2FkbWluIjogImZhbHNlIiwgInVzZXJuYW1lIjogInNvdXJjZXMiLCAiZW1haWwiOiAic291cmNlc0Bzb3VyY2VzLmlvIn0sICJpbnRlcm5hbCI6IHsib3JnX2lkIjogIjU0MzIxIn19fQ==";

/// Synchronization engine settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay before a recoverable failure is re-enqueued.
    pub retry_delay: Duration,

    /// Maximum concurrent downstream calls.
    pub max_in_flight: usize,

    /// Period of the reconciliation sweep; `None` disables it.
    pub reconcile_interval: Option<Duration>,

    /// Identity header for records that have none.
    pub fake_auth_header: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(10),
            max_in_flight: 4,
            reconcile_interval: None,
            fake_auth_header: DEFAULT_FAKE_HEADER.to_string(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    #[must_use]
    pub fn with_reconcile_interval(mut self, interval: Option<Duration>) -> Self {
        self.reconcile_interval = interval;
        self
    }

    #[must_use]
    pub fn with_fake_auth_header(mut self, header: impl Into<String>) -> Self {
        self.fake_auth_header = header.into();
        self
    }
}
