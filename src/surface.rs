//! The native side's view of the rendering surface hosting the web content.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::encode::EncodedPayload;
use crate::error::Result;

/// Operations the orchestrator performs on the web content.
#[async_trait]
pub trait WebSurface: Send + Sync {
    /// Asks the content to drop any state from a previously opened file.
    async fn reset_state(&self) -> Result<()>;

    /// Calls the bridge entry point with the payload.
    ///
    /// Fails with [`crate::Error::BridgeNotReady`] while the content has not
    /// defined the entry point yet.
    async fn invoke_bridge(&self, payload: &EncodedPayload) -> Result<()>;

    /// Reloads the content from scratch.
    async fn reload(&self) -> Result<()>;
}

/// Holder for the surface, which only exists once the host has built it.
#[derive(Clone, Default)]
pub struct SurfaceSlot {
    inner: Arc<RwLock<Option<Arc<dyn WebSurface>>>>,
}

impl std::fmt::Debug for SurfaceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceSlot")
            .field("attached", &self.get().is_some())
            .finish()
    }
}

impl SurfaceSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the host once the rendering surface is constructed.
    pub fn attach(&self, surface: Arc<dyn WebSurface>) {
        *self.inner.write().unwrap() = Some(surface);
        log::info!("Rendering surface attached");
    }

    pub fn detach(&self) {
        *self.inner.write().unwrap() = None;
    }

    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn WebSurface>> {
        self.inner.read().unwrap().clone()
    }
}
