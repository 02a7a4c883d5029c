//! Versioned cache of the app shell, served network-first.
//!
//! A [`CacheManager`] owns one cache version. Installing pre-fetches the
//! shell manifest, activating deletes every cache of another version, and
//! requests are answered from the network with the cache as fallback.

mod fetch;
mod share;
mod store;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{StreamExt, stream};

use crate::config::CacheConfig;

pub use fetch::{Fetch, HttpFetcher};
pub use share::{SharedFile, inject_shared_file, shared_file_script};
pub use store::{CacheStorage, CachedResponse};

/// Lifecycle of one cache version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Created, nothing fetched yet.
    Registered,
    /// Pre-fetching the manifest.
    Installing,
    /// Manifest fetched, waiting for activation.
    Installed,
    /// Serving requests.
    Activated,
    /// A newer version deleted this cache.
    Superseded,
}

/// Result of pre-fetching the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: usize,
    pub failed: Vec<String>,
}

/// Answer to a share-target POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareResponse {
    /// The share-handler document with the file embedded.
    Page(String),
    /// `303 See Other` to this location.
    Redirect(String),
}

/// Service-worker style manager for one cache version.
pub struct CacheManager {
    config: CacheConfig,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetch>,
    state: Mutex<CacheState>,
    claimed: AtomicBool,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("version", &self.config.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    #[must_use]
    pub fn new(config: CacheConfig, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            config,
            storage,
            fetcher,
            state: Mutex::new(CacheState::Registered),
            claimed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.config.version
    }

    #[must_use]
    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        let state = *self.state.lock().unwrap();
        if state == CacheState::Activated && !self.storage.has(&self.config.version) {
            return CacheState::Superseded;
        }
        state
    }

    /// Whether this version has claimed its clients.
    #[must_use]
    pub fn is_controlling(&self) -> bool {
        self.claimed.load(Ordering::SeqCst) && self.state() == CacheState::Activated
    }

    fn set_state(&self, state: CacheState) {
        *self.state.lock().unwrap() = state;
    }

    /// Opens the versioned cache and pre-fetches the manifest.
    ///
    /// A manifest entry that cannot be fetched is logged and skipped; it
    /// never fails the install.
    pub async fn install(&self) -> InstallReport {
        self.set_state(CacheState::Installing);
        self.storage.open(&self.config.version);
        log::info!("Cache {} opened", self.config.version);

        let results: Vec<(String, Option<CachedResponse>)> = stream::iter(self.config.manifest.clone())
            .map(|path| async move {
                match self.fetcher.fetch(&path).await {
                    Ok(response) if response.is_ok() => (path, Some(response)),
                    Ok(response) => {
                        log::warn!("Pre-cache of {path} failed: status {}", response.status);
                        (path, None)
                    }
                    Err(e) => {
                        log::warn!("Pre-cache of {path} failed: {e}");
                        (path, None)
                    }
                }
            })
            .buffer_unordered(self.config.manifest.len().max(1))
            .collect()
            .await;

        let mut report = InstallReport::default();
        for (path, response) in results {
            match response {
                Some(response) => {
                    self.storage.put(&self.config.version, &path, response);
                    report.cached += 1;
                }
                None => report.failed.push(path),
            }
        }
        report.failed.sort();

        self.set_state(CacheState::Installed);
        report
    }

    /// Deletes every cache not named after this version and claims clients.
    ///
    /// Returns the names of the deleted caches.
    pub fn activate(&self) -> Vec<String> {
        let mut deleted = Vec::new();
        for name in self.storage.keys() {
            if name != self.config.version && self.storage.delete(&name) {
                log::info!("Deleting old cache: {name}");
                deleted.push(name);
            }
        }

        self.storage.open(&self.config.version);
        self.set_state(CacheState::Activated);
        self.claimed.store(true, Ordering::SeqCst);
        log::info!("Cache {} activated", self.config.version);
        deleted
    }

    /// Installs, then activates immediately.
    pub async fn start(&self) -> InstallReport {
        let report = self.install().await;
        self.activate();
        report
    }

    /// Serves a GET network-first.
    ///
    /// A `200` from the network is stored under `key` and returned. Other
    /// statuses are returned uncached. On network failure the cached match
    /// for `key` is served, then the cached root document, then an offline
    /// `503`.
    pub async fn handle_get(&self, key: &str) -> CachedResponse {
        match self.fetcher.fetch(key).await {
            Ok(response) => {
                if response.is_ok() {
                    self.storage.put(&self.config.version, key, response.clone());
                }
                response
            }
            Err(e) => {
                log::warn!("Network fetch of {key} failed, using cache: {e}");
                self.storage
                    .match_any(key)
                    .or_else(|| self.storage.match_any(&self.config.root_document))
                    .unwrap_or_else(|| {
                        log::error!("No cached response for {key}");
                        CachedResponse::offline()
                    })
            }
        }
    }

    /// Serves a GET for a client this version does not control yet: straight
    /// to the network, nothing cached.
    pub async fn fetch_uncontrolled(&self, key: &str) -> CachedResponse {
        self.fetcher.fetch(key).await.unwrap_or_else(|e| {
            log::warn!("Network fetch of {key} failed: {e}");
            CachedResponse::offline()
        })
    }

    /// Serves a share-target POST.
    ///
    /// With a file, answers the cached share-handler document with the file
    /// embedded. Without one, or with no cached handler, redirects to the
    /// root document.
    #[must_use]
    pub fn handle_share(&self, file: Option<&SharedFile>) -> ShareResponse {
        let redirect = || ShareResponse::Redirect(self.config.root_document.clone());

        let Some(file) = file else {
            log::info!("Share request without a file");
            return redirect();
        };
        let Some(handler) = self
            .storage
            .match_in(&self.config.version, &self.config.share_handler)
        else {
            log::warn!("Share handler {} not cached", self.config.share_handler);
            return redirect();
        };

        log::info!("Shared file received: {} ({})", file.file_name, file.content_type);
        ShareResponse::Page(inject_shared_file(&handler.text(), file))
    }
}
