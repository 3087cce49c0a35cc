//! Short-lived cache of aggregate fetches, served stale while revalidating.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::KvHandle;
use crate::error::CoreError;

/// A cached value and when it was written (Unix epoch milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub timestamp: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, at: DateTime<Utc>) -> Self {
        Self {
            value,
            timestamp: at.timestamp_millis(),
        }
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.is_fresh_at(max_age, Utc::now())
    }

    /// `now - timestamp < max_age`.
    pub fn is_fresh_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let age_ms = now.timestamp_millis() - self.timestamp;
        i128::from(age_ms) < max_age.as_millis() as i128
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// What a cache read found, tagged with freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct Peeked<T> {
    pub value: T,
    pub fresh: bool,
    pub stored_at: Option<DateTime<Utc>>,
}

/// Result of refreshing a cached key.
#[derive(Debug)]
pub enum Revalidated<T> {
    /// The fetch succeeded and the cache now holds this value.
    Updated(T),
    /// The fetch failed; the previous value is untouched and still served.
    /// The error is only meant to be shown as a notification.
    KeptStale { value: T, error: CoreError },
    /// The fetch failed and there was nothing cached to fall back to.
    Failed(CoreError),
}

impl<T> Revalidated<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Revalidated::Updated(v) | Revalidated::KeptStale { value: v, .. } => Some(v),
            Revalidated::Failed(_) => None,
        }
    }

    /// The error to surface as a notification, if the refresh failed.
    pub fn notice(&self) -> Option<&CoreError> {
        match self {
            Revalidated::Updated(_) => None,
            Revalidated::KeptStale { error, .. } | Revalidated::Failed(error) => Some(error),
        }
    }
}

/// JSON cache entries in the key/value store. No eviction: entries live
/// until overwritten or removed under the same key.
#[derive(Clone)]
pub struct Cache {
    kv: KvHandle,
}

impl Cache {
    pub fn new(kv: KvHandle) -> Self {
        Self { kv }
    }

    /// Read an entry. Values that no longer parse as `T` read as absent.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<CacheEntry<T>>, CoreError> {
        let Some(raw) = self.kv.get_item(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(key, error = %e, "unreadable cache entry, ignoring");
                Ok(None)
            }
        }
    }

    /// Overwrite `key` with `value`, stamped with the current time.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CoreError> {
        let raw = Self::encode(value)?;
        self.kv.set_item(key, raw).await
    }

    /// Serialize `value` as a cache entry stamped with the current time.
    pub fn encode<T: Serialize>(value: &T) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&CacheEntry::new(value, Utc::now()))?)
    }

    /// Store pre-encoded entries in one transaction.
    pub async fn set_encoded(&self, entries: Vec<(String, String)>) -> Result<(), CoreError> {
        self.kv.set_items(entries).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.kv.remove_item(key).await
    }

    /// Last stored value for `key`, with its freshness against `ttl`.
    pub async fn peek<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Peeked<T>>, CoreError> {
        Ok(self.get::<T>(key).await?.map(|entry| Peeked {
            fresh: entry.is_fresh(ttl),
            stored_at: entry.stored_at(),
            value: entry.value,
        }))
    }

    /// Run `fetch` and store its result under `key`.
    ///
    /// A failed fetch never replaces what is cached; the last good value is
    /// handed back alongside the error.
    pub async fn revalidate<T, F, Fut>(&self, key: &str, fetch: F) -> Revalidated<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        match fetch().await {
            Ok(value) => {
                if let Err(e) = self.set(key, &value).await {
                    tracing::warn!(key, error = %e, "failed to write cache entry");
                }
                Revalidated::Updated(value)
            }
            Err(error) => {
                tracing::warn!(key, error = %error, "refresh failed, keeping cached value");
                match self.get::<T>(key).await {
                    Ok(Some(entry)) => Revalidated::KeptStale {
                        value: entry.value,
                        error,
                    },
                    Ok(None) => Revalidated::Failed(error),
                    Err(read_err) => {
                        tracing::warn!(key, error = %read_err, "cache read failed");
                        Revalidated::Failed(error)
                    }
                }
            }
        }
    }
}
