//! viewer-shell - Native host core for an HTML and 3D model viewer.
//!
//! This library hands files opened with the app to its web content and
//! keeps a versioned, network-first cache of the app shell, abstracted
//! from any specific platform webview.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use viewer_shell::{Bridge, ContentPage, DeliveryConfig, LaunchSource, Orchestrator, SurfaceSlot};
//!
//! # async fn example() {
//! // The web content: registers one listener per page load.
//! let page = ContentPage::new(
//!     |bridge: &Bridge| {
//!         bridge.register(|file| {
//!             println!("opened {} ({})", file.file_name, file.encoding);
//!             Ok(())
//!         });
//!     },
//!     Duration::from_millis(200),
//! );
//! page.load();
//!
//! let surface = SurfaceSlot::new();
//! surface.attach(Arc::new(page));
//!
//! let orchestrator = Orchestrator::new(DeliveryConfig::default(), surface);
//! if let Some(delivery) = orchestrator.open_file("model.stl", LaunchSource::OpenUrl) {
//!     println!("{:?}", delivery.await);
//! }
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod access;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod encode;
pub mod error;
pub mod orchestrator;
pub mod page;
pub mod pending;
#[cfg(feature = "server")]
pub mod server;
pub mod surface;

// Re-export main types for convenience
pub use access::{FileReader, SecurityScope, TokioFileReader, Unscoped, read_scoped};
pub use bridge::{Bridge, ListenerError, OpenedFile};
pub use cache::{CacheManager, CacheState, CacheStorage, CachedResponse, Fetch, HttpFetcher, ShareResponse, SharedFile};
pub use config::{CacheConfig, DeliveryConfig, RetryPolicy, ServerConfig, ShellConfig};
pub use encode::{EncodedPayload, Encoding, FileKind, encode};
pub use error::{Error, Result};
pub use orchestrator::{DeliveryObserver, DeliveryOutcome, DeliveryState, LaunchSource, NoObserver, Orchestrator};
pub use page::ContentPage;
pub use pending::{PendingFile, PendingRegister};
pub use surface::{SurfaceSlot, WebSurface};
