//! In-process model of the web content behind the rendering surface.
//!
//! A page defines its bridge only after its scripts finish initializing,
//! and every load gets a fresh [`Bridge`] with the listeners the page init
//! hook registers. Reloading discards the old bridge and its listeners.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::Bridge;
use crate::encode::EncodedPayload;
use crate::error::{Error, Result};
use crate::surface::WebSurface;

/// Page script run on every load; registers the page's listeners.
pub type PageInit = Arc<dyn Fn(&Bridge) + Send + Sync>;

struct PageState {
    bridge: RwLock<Option<Arc<Bridge>>>,
    init: PageInit,
    init_delay: Duration,
    generation: AtomicU64,
    loads: AtomicU32,
    resets: AtomicU32,
}

impl PageState {
    fn install(&self, generation: u64) {
        // A later load superseded this one while it was initializing.
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let bridge = Arc::new(Bridge::new());
        (self.init)(&bridge);
        *self.bridge.write().unwrap() = Some(bridge);
        self.loads.fetch_add(1, Ordering::SeqCst);
        log::info!("Content page loaded, bridge defined");
    }
}

/// Web content hosted by a rendering surface.
#[derive(Clone)]
pub struct ContentPage {
    state: Arc<PageState>,
}

impl std::fmt::Debug for ContentPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentPage")
            .field("ready", &self.is_ready())
            .field("loads", &self.loads())
            .field("resets", &self.resets())
            .finish_non_exhaustive()
    }
}

impl ContentPage {
    /// Creates an unloaded page. Call [`Self::load`] to start it.
    pub fn new<F>(init: F, init_delay: Duration) -> Self
    where
        F: Fn(&Bridge) + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(PageState {
                bridge: RwLock::new(None),
                init: Arc::new(init),
                init_delay,
                generation: AtomicU64::new(0),
                loads: AtomicU32::new(0),
                resets: AtomicU32::new(0),
            }),
        }
    }

    /// Starts loading the page. The bridge is undefined until the init
    /// delay has passed. Must be called within a tokio runtime when the
    /// delay is non-zero.
    pub fn load(&self) {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.bridge.write().unwrap() = None;

        if self.state.init_delay.is_zero() {
            self.state.install(generation);
            return;
        }

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(state.init_delay).await;
            state.install(generation);
        });
    }

    /// The bridge of the current page load, if it is defined.
    #[must_use]
    pub fn bridge(&self) -> Option<Arc<Bridge>> {
        self.state.bridge.read().unwrap().clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.bridge().is_some()
    }

    /// Number of completed page loads.
    #[must_use]
    pub fn loads(&self) -> u32 {
        self.state.loads.load(Ordering::SeqCst)
    }

    /// Number of state resets requested by the native side.
    #[must_use]
    pub fn resets(&self) -> u32 {
        self.state.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSurface for ContentPage {
    async fn reset_state(&self) -> Result<()> {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
        log::debug!("Content state reset");
        Ok(())
    }

    async fn invoke_bridge(&self, payload: &EncodedPayload) -> Result<()> {
        let bridge = self.bridge().ok_or(Error::BridgeNotReady)?;
        bridge.deliver(&payload.file_name, &payload.content, Some(payload.encoding));
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        log::warn!("Reloading content page");
        self.load();
        Ok(())
    }
}
