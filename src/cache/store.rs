//! Named response caches, keyed by request path.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use bytes::Bytes;

/// A stored (or freshly fetched) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl CachedResponse {
    /// A `200 OK` response.
    #[must_use]
    pub fn ok(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }

    /// The `503` served when neither network nor cache can answer.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            status: 503,
            content_type: Some("text/plain".to_string()),
            body: Bytes::from_static(b"Offline"),
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

type Entries = HashMap<String, CachedResponse>;

/// All caches of one origin, by cache name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: RwLock<BTreeMap<String, Entries>>,
}

impl CacheStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the named cache if it does not exist yet.
    pub fn open(&self, name: &str) {
        self.caches.write().unwrap().entry(name.to_string()).or_default();
    }

    /// Names of all caches.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.caches.read().unwrap().keys().cloned().collect()
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.caches.read().unwrap().contains_key(name)
    }

    /// Deletes a cache and all of its entries. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.caches.write().unwrap().remove(name).is_some()
    }

    /// Stores a response, creating the cache if needed.
    pub fn put(&self, name: &str, key: &str, response: CachedResponse) {
        self.caches
            .write()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), response);
    }

    /// Looks up `key` in one cache.
    #[must_use]
    pub fn match_in(&self, name: &str, key: &str) -> Option<CachedResponse> {
        self.caches.read().unwrap().get(name)?.get(key).cloned()
    }

    /// Looks up `key` across every cache, in name order.
    #[must_use]
    pub fn match_any(&self, key: &str) -> Option<CachedResponse> {
        self.caches
            .read()
            .unwrap()
            .values()
            .find_map(|entries| entries.get(key).cloned())
    }

    /// Number of entries in one cache.
    #[must_use]
    pub fn len(&self, name: &str) -> usize {
        self.caches.read().unwrap().get(name).map_or(0, HashMap::len)
    }
}
