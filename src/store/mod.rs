//! Key-value storage for window counters.
//!
//! The [QuotaEngine](crate::QuotaEngine) only depends on the [CounterStore] capability set, so
//! the default [InMemoryStore] can be replaced by any other implementation supplied at
//! construction time.

mod memory;

pub use memory::{InMemoryStore, InMemoryStoreBuilder};

use crate::counter::SharedCounter;

/// Describes a concurrency-safe store mapping opaque keys to counter values.
///
/// A store is required to implement [Clone], with every clone addressing the same underlying
/// data; usually this means wrapping the map within an [Arc](std::sync::Arc).
///
/// Implementations backed by something that can fail (e.g. a network service) report it through
/// [CounterStore::Error]; the [QuotaGate](crate::QuotaGate) then applies its fail open / fail
/// closed policy. In-memory implementations should use [Infallible](std::convert::Infallible).
pub trait CounterStore<V: 'static = SharedCounter>: Clone {
    type Error;

    /// Return the value stored for `key`, storing `initial` first if the key is unseen.
    ///
    /// The boolean is true when the key was already present (and `initial` was discarded).
    ///
    /// This must be atomic with respect to concurrent calls on the same key: exactly one caller
    /// can ever observe `false` for a given key, and every caller observes the same value.
    fn load_or_initialize(&self, key: &str, initial: V) -> Result<(V, bool), Self::Error>;

    /// Unconditionally overwrite the value for `key`.
    fn store(&self, key: &str, value: V) -> Result<(), Self::Error>;

    /// Remove every key.
    ///
    /// Not intended to run concurrently with in-flight decisions; use it at startup, between
    /// tests, or for an explicit administrative reset.
    fn reset_all(&self) -> Result<(), Self::Error>;
}
