pub const DEFAULT_MAX_MESSAGES_PER_SECOND: u64 = 5;
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u64 = 10_000;
pub const DEFAULT_MAX_FAILED_TRANSACTIONS_PER_DAY: u64 = 3;

/// The three limits applied by a [QuotaEngine](crate::QuotaEngine).
///
/// This is a plain value: each `with_*` method returns an updated copy, there is no shared
/// mutable configuration.
///
/// ```
/// # use actix_quota_gate::QuotaConfig;
/// let config = QuotaConfig::new()
///     .with_max_messages(1)
///     .with_max_requests(10)
///     .with_max_failed_transactions(1);
/// assert_eq!(config.max_requests_per_minute(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    max_messages_per_second: u64,
    max_requests_per_minute: u64,
    max_failed_transactions_per_day: u64,
}

impl QuotaConfig {
    pub fn new() -> Self {
        Self {
            max_messages_per_second: DEFAULT_MAX_MESSAGES_PER_SECOND,
            max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
            max_failed_transactions_per_day: DEFAULT_MAX_FAILED_TRANSACTIONS_PER_DAY,
        }
    }

    /// Override the number of messages a principal may send per second.
    ///
    /// Default is 5.
    pub fn with_max_messages(mut self, max: u64) -> Self {
        self.max_messages_per_second = max;
        self
    }

    /// Override the number of requests a source address may make per minute.
    ///
    /// Default is 10000.
    pub fn with_max_requests(mut self, max: u64) -> Self {
        self.max_requests_per_minute = max;
        self
    }

    /// Override the number of failed transactions a principal may attempt per day.
    ///
    /// Default is 3.
    pub fn with_max_failed_transactions(mut self, max: u64) -> Self {
        self.max_failed_transactions_per_day = max;
        self
    }

    pub fn max_messages_per_second(&self) -> u64 {
        self.max_messages_per_second
    }

    pub fn max_requests_per_minute(&self) -> u64 {
        self.max_requests_per_minute
    }

    pub fn max_failed_transactions_per_day(&self) -> u64 {
        self.max_failed_transactions_per_day
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self::new()
    }
}
