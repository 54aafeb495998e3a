//! Expiring key/value store: TTL envelopes over a raw `KeyValueStore`.
//!
//! Eviction is lazy. An entry is only deleted when a read finds it expired or
//! unparseable, or when `clear_by_prefix` sweeps it. Keys written and never
//! read again stay on disk until a prefix clear; at this scale that is fine,
//! but a long-lived shared cache would need a bounded sweep.
//!
//! Storage failures never reach the caller as errors. `set` reports `false`
//! and the pipeline simply recomputes next time.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Clock, EpochMillis, SystemClock};
use crate::store::KeyValueStore;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// The on-disk envelope. `expires` is accepted for values written by older clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    #[serde(rename = "expiresAt", alias = "expires")]
    pub expires_at: EpochMillis,
}

impl CacheEntry {
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        now > self.expires_at
    }
}

pub struct ExpiringStore<S> {
    store: S,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl<S: KeyValueStore> ExpiringStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), DEFAULT_TTL)
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            store,
            clock,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The underlying namespace, for callers that store unwrapped values.
    pub fn raw(&self) -> &S {
        &self.store
    }

    /// Stores `value` under `key` with the default TTL. Last write wins.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    /// Returns `false` if the value could not be serialized or persisted.
    pub fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Cache set '{key}' skipped: value not serializable: {e}");
                return false;
            }
        };
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            value,
            expires_at: self.clock.now_millis().saturating_add(ttl_ms),
        };

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache set '{key}' skipped: envelope not serializable: {e}");
                return false;
            }
        };

        match self.store.set(key, &raw) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache set '{key}' failed, continuing without cache: {e}");
                false
            }
        }
    }

    /// Returns the live value at `key`. Expired, corrupt or foreign entries are
    /// deleted and reported absent.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache get '{key}' failed, treating as absent: {e}");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Cache entry '{key}' unreadable, evicting: {e}");
                self.evict(key);
                return None;
            }
        };

        if entry.is_expired(self.clock.now_millis()) {
            debug!("Cache entry '{key}' expired, evicting");
            self.evict(key);
            return None;
        }

        Some(entry.value)
    }

    /// Typed read. A live value of the wrong shape counts as corrupt.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("Cache entry '{key}' has unexpected shape, evicting: {e}");
                self.evict(key);
                None
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.evict(key);
    }

    /// Deletes every key starting with `prefix`, wrapped or not. Returns how many went.
    pub fn clear_by_prefix(&self, prefix: &str) -> usize {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cache clear '{prefix}*' failed to list keys: {e}");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            match self.store.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Cache clear could not remove '{key}': {e}"),
            }
        }
        debug!("Cleared {removed} keys with prefix '{prefix}'");
        removed
    }

    fn evict(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("Cache evict '{key}' failed: {e}");
        }
    }
}
