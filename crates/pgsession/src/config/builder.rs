//! Configuration builder

use std::num::NonZeroUsize;

use crate::status::IsolationLevel;

const DEFAULT_NOTICE_CAPACITY: NonZeroUsize = NonZeroUsize::new(50).unwrap();
const DEFAULT_NOTIFY_CAPACITY: NonZeroUsize = NonZeroUsize::new(1024).unwrap();

/// Per-connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Notices kept per connection; the oldest are dropped first.
    pub notice_capacity: NonZeroUsize,
    /// Notifications kept per connection until taken.
    pub notify_capacity: NonZeroUsize,
    /// Isolation level of blocking connections after setup and reset.
    pub default_isolation_level: IsolationLevel,
    pub logging: LoggingConfig,
}

impl SessionConfig {
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigBuilder::new().build()
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    notice_capacity: NonZeroUsize,
    notify_capacity: NonZeroUsize,
    default_isolation_level: IsolationLevel,
    logging: LoggingConfig,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
            default_isolation_level: IsolationLevel::ReadCommitted,
            logging: LoggingConfig::default(),
        }
    }

    #[must_use]
    pub const fn notice_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.notice_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn notify_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.notify_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn default_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.default_isolation_level = level;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.log_level = level.into();
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.logging.json_logs = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            notice_capacity: self.notice_capacity,
            notify_capacity: self.notify_capacity,
            default_isolation_level: self.default_isolation_level,
            logging: self.logging,
        }
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
