#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod counter;
mod engine;
pub mod identity;
mod middleware;
pub mod store;

pub use config::{
    QuotaConfig, DEFAULT_MAX_FAILED_TRANSACTIONS_PER_DAY, DEFAULT_MAX_MESSAGES_PER_SECOND,
    DEFAULT_MAX_REQUESTS_PER_MINUTE,
};
pub use counter::{SharedCounter, WindowCounter};
pub use engine::{Dimension, QuotaEngine, RequestCategory, Verdict};
pub use identity::{IdentityFunctionBuilder, RequestIdentity};
pub use middleware::builder::{QuotaGateBuilder, X_RATELIMIT_DIMENSION};
pub use middleware::{QuotaGate, QuotaGateMiddleware};
