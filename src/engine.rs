use crate::config::QuotaConfig;
use crate::counter::{SharedCounter, WindowCounter};
use crate::store::{CounterStore, InMemoryStore};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// One independently tracked quota axis, each with its own key space, window and limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Requests per source address, per minute.
    Request,
    /// Messages per principal, per second.
    Message,
    /// Failed transactions per principal, per day.
    Transaction,
}

impl Dimension {
    /// Length of the fixed window for this dimension.
    pub fn interval(self) -> Duration {
        match self {
            Dimension::Request => MINUTE,
            Dimension::Message => SECOND,
            Dimension::Transaction => DAY,
        }
    }

    /// The storage key for `subject` within this dimension, e.g. `ip:10.0.0.1` or `msg:alice`.
    pub fn key(self, subject: &str) -> String {
        let prefix = match self {
            Dimension::Request => "ip",
            Dimension::Message => "msg",
            Dimension::Transaction => "txn",
        };
        format!("{prefix}:{subject}")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Request => "request",
            Dimension::Message => "message",
            Dimension::Transaction => "transaction",
        }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request category label, selecting which principal quota (if any) applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCategory {
    Message,
    Transaction,
    /// Any other label, including an empty one. Only the request rate applies.
    Other,
}

impl RequestCategory {
    /// The principal dimension checked after the request rate.
    pub fn dimension(self) -> Option<Dimension> {
        match self {
            RequestCategory::Message => Some(Dimension::Message),
            RequestCategory::Transaction => Some(Dimension::Transaction),
            RequestCategory::Other => None,
        }
    }
}

impl From<&str> for RequestCategory {
    fn from(label: &str) -> Self {
        match label {
            "message" => RequestCategory::Message,
            "transaction" => RequestCategory::Transaction,
            _ => RequestCategory::Other,
        }
    }
}

/// The outcome of [QuotaEngine::decide].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    RateLimited(Dimension),
}

impl Verdict {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn is_denied(self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// The dimension whose quota was exhausted, if the request was denied.
    pub fn limited_by(self) -> Option<Dimension> {
        match self {
            Self::Ok => None,
            Self::RateLimited(dimension) => Some(dimension),
        }
    }
}

/// Applies the request, message and failed-transaction quotas to incoming requests.
///
/// An engine is cheap to clone; clones share the same [CounterStore].
#[derive(Clone)]
pub struct QuotaEngine<S = InMemoryStore> {
    config: QuotaConfig,
    store: S,
}

impl QuotaEngine {
    /// An engine with the default limits and a fresh [InMemoryStore].
    pub fn new() -> Self {
        Self::with_config(QuotaConfig::default())
    }

    pub fn with_config(config: QuotaConfig) -> Self {
        Self::with_store(config, InMemoryStore::new())
    }
}

impl Default for QuotaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CounterStore> QuotaEngine<S> {
    /// # Arguments
    ///
    /// * `config`: The limits to apply.
    /// * `store`: Where the window counters live.
    pub fn with_store(config: QuotaConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configured limit for a dimension.
    pub fn limit(&self, dimension: Dimension) -> u64 {
        match dimension {
            Dimension::Request => self.config.max_requests_per_minute(),
            Dimension::Message => self.config.max_messages_per_second(),
            Dimension::Transaction => self.config.max_failed_transactions_per_day(),
        }
    }

    /// Decide whether to admit a request.
    ///
    /// The request rate of `source_address` is always checked first; if it is exhausted the
    /// request is denied without touching the principal's counters. Otherwise `category` selects
    /// at most one principal dimension:
    ///
    /// - `"message"`: the message rate of `principal_id`.
    /// - `"transaction"`: the failed-transaction quota of `principal_id`. Every such call counts
    ///   as one failure, denied or not, and is denied once the day's count exceeds the limit.
    /// - anything else: nothing further.
    ///
    /// Counters are committed independently; a request denied by its principal quota still
    /// consumes request rate.
    pub fn decide(
        &self,
        source_address: &str,
        principal_id: &str,
        category: &str,
    ) -> Result<Verdict, S::Error> {
        if !self.check(Dimension::Request, source_address)? {
            return Ok(Verdict::RateLimited(Dimension::Request));
        }
        let dimension = match RequestCategory::from(category).dimension() {
            Some(dimension) => dimension,
            None => return Ok(Verdict::Ok),
        };
        if self.check(dimension, principal_id)? {
            Ok(Verdict::Ok)
        } else {
            Ok(Verdict::RateLimited(dimension))
        }
    }

    /// Clear every counter.
    ///
    /// Must not run concurrently with [QuotaEngine::decide].
    pub fn reset(&self) -> Result<(), S::Error> {
        log::debug!("Resetting all quota counters");
        self.store.reset_all()
    }

    fn check(&self, dimension: Dimension, subject: &str) -> Result<bool, S::Error> {
        let key = dimension.key(subject);
        let counter = self.counter(&key)?;
        let limit = self.limit(dimension);
        let allowed = match dimension {
            Dimension::Transaction => counter.record(limit, dimension.interval()),
            Dimension::Request | Dimension::Message => counter.allow(limit, dimension.interval()),
        };
        if allowed {
            log::trace!("Quota available for {key} ({} of {limit})", counter.count());
        } else {
            log::debug!("Rate limited by the {dimension} quota for {key} (limit {limit})");
        }
        Ok(allowed)
    }

    fn counter(&self, key: &str) -> Result<SharedCounter, S::Error> {
        let (counter, _) = self
            .store
            .load_or_initialize(key, Arc::new(WindowCounter::new()))?;
        Ok(counter)
    }
}
