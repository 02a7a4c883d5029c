//! Drives the hand-off of an opened file into the web content.
//!
//! Each delivery attempt walks `WaitingForSurface → Resetting → Injecting`
//! and ends `Delivered` or `GaveUp`. All waiting is done with scheduled
//! sleeps that wake early when the attempt's pending entry is superseded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::access::{FileReader, SecurityScope, TokioFileReader, Unscoped, read_scoped};
use crate::config::DeliveryConfig;
use crate::encode::{EncodedPayload, FileKind, encode};
use crate::error::{Error, Result};
use crate::pending::{PendingFile, PendingRegister};
use crate::surface::{SurfaceSlot, WebSurface};

/// How the file reached the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchSource {
    /// The app was started to open the file.
    ColdLaunch,
    /// The file was opened while the app was running.
    OpenUrl,
}

/// States of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    WaitingForSurface,
    Resetting,
    Injecting,
    Delivered,
    GaveUp,
}

/// How a delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The bridge accepted the payload after `attempts` injection tries.
    Delivered { attempts: u32 },
    /// A newer pending entry replaced this one before delivery.
    Superseded,
    /// The rendering surface never appeared within the surface policy.
    SurfaceUnavailable,
    /// The bridge was never defined within the bridge policy.
    BridgeUnavailable { reloaded: bool },
    /// The file could not be read or decoded.
    ReadFailed(String),
    /// The surface rejected the injection for another reason.
    Failed(String),
}

impl DeliveryOutcome {
    /// Converts the outcome into the attempt count on success, or the error
    /// describing why the file was not delivered.
    ///
    /// # Errors
    ///
    /// Every outcome other than [`DeliveryOutcome::Delivered`] maps to an
    /// error: `Superseded` to [`Error::Cancelled`], `SurfaceUnavailable` to
    /// [`Error::SurfaceNotReady`], `BridgeUnavailable` to
    /// [`Error::BridgeNotReady`], the rest to [`Error::Delivery`].
    pub fn into_result(self) -> Result<u32> {
        match self {
            Self::Delivered { attempts } => Ok(attempts),
            Self::Superseded => Err(Error::Cancelled),
            Self::SurfaceUnavailable => Err(Error::SurfaceNotReady),
            Self::BridgeUnavailable { .. } => Err(Error::BridgeNotReady),
            Self::ReadFailed(reason) | Self::Failed(reason) => Err(Error::Delivery(reason)),
        }
    }
}

/// Receives state transitions of delivery attempts.
///
/// All methods have default no-op implementations.
pub trait DeliveryObserver: Send + Sync {
    fn on_state(&self, _file: &PendingFile, _state: DeliveryState) {}

    fn on_outcome(&self, _file: &PendingFile, _outcome: &DeliveryOutcome) {}
}

/// Observer that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl DeliveryObserver for NoObserver {}

/// Coordinates file-open events, the pending register and the surface.
#[derive(Clone)]
pub struct Orchestrator {
    config: DeliveryConfig,
    register: Arc<PendingRegister>,
    surface: SurfaceSlot,
    scope: Arc<dyn SecurityScope>,
    reader: Arc<dyn FileReader>,
    observer: Arc<dyn DeliveryObserver>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("register", &self.register)
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator reading files with `tokio::fs` and no
    /// security scope.
    #[must_use]
    pub fn new(config: DeliveryConfig, surface: SurfaceSlot) -> Self {
        Self {
            config,
            register: Arc::new(PendingRegister::new()),
            surface,
            scope: Arc::new(Unscoped),
            reader: Arc::new(TokioFileReader),
            observer: Arc::new(NoObserver),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Arc<dyn SecurityScope>) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.reader = reader;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn register(&self) -> &PendingRegister {
        &self.register
    }

    #[must_use]
    pub const fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Handles a file-open event.
    ///
    /// Files with unrecognized extensions are ignored and `None` is
    /// returned. Otherwise the file becomes the pending file, superseding
    /// any earlier one, and a delivery task is scheduled.
    pub fn open_file(&self, path: impl Into<PathBuf>, source: LaunchSource) -> Option<JoinHandle<DeliveryOutcome>> {
        let path = path.into();
        let Some(kind) = FileKind::from_path(&path) else {
            log::debug!("Ignoring unsupported file {}", path.display());
            return None;
        };
        log::info!("File opened ({source:?}): {}", path.display());

        let file = PendingFile::new(path);
        self.register.set_pending(file.clone());

        let delay = match source {
            LaunchSource::ColdLaunch => Duration::from_millis(self.config.launch_delay_ms),
            LaunchSource::OpenUrl => Duration::from_millis(self.config.open_delay_ms),
        };
        Some(self.spawn_delivery(file, kind, delay))
    }

    /// Handles the app returning to the foreground.
    ///
    /// A still-pending file is taken from the register, which stops the
    /// attempt that owned it, and delivery re-enters for that file after
    /// the settle delay.
    pub fn resume_foreground(&self) -> Option<JoinHandle<DeliveryOutcome>> {
        let taken = self.register.take_if_present()?;
        let kind = FileKind::from_path(&taken.path)?;
        log::info!("Resumed with pending file {}", taken.path.display());

        let file = taken.renewed();
        self.register.set_pending(file.clone());
        Some(self.spawn_delivery(file, kind, self.config.settle_delay()))
    }

    fn spawn_delivery(&self, file: PendingFile, kind: FileKind, delay: Duration) -> JoinHandle<DeliveryOutcome> {
        let this = self.clone();
        tokio::spawn(async move {
            let token = file.token();
            if !pause(delay, &token).await {
                return this.finish(&file, DeliveryOutcome::Superseded);
            }

            let outcome = this.attempt(&file, kind, true).await;
            if outcome != (DeliveryOutcome::BridgeUnavailable { reloaded: true }) {
                return outcome;
            }

            // The reloaded content gets one more attempt, without another reload.
            match this.take_after_reload(&file).await {
                Some(file) => this.attempt(&file, kind, false).await,
                None => outcome,
            }
        })
    }

    /// Waits for the reloaded content to settle, then takes the pending
    /// entry if it is still the one whose attempt triggered the reload.
    async fn take_after_reload(&self, file: &PendingFile) -> Option<PendingFile> {
        tokio::time::sleep(self.config.settle_delay()).await;
        let taken = self.register.take_if_matches(file.id)?;
        let renewed = taken.renewed();
        self.register.set_pending(renewed.clone());
        log::info!("Re-checking pending file {} after reload", renewed.path.display());
        Some(renewed)
    }

    /// Runs one pass of the state machine for `file`.
    async fn attempt(&self, file: &PendingFile, kind: FileKind, allow_reload: bool) -> DeliveryOutcome {
        let token = file.token();

        self.observer.on_state(file, DeliveryState::WaitingForSurface);
        let surface = match self.wait_for_surface(file, &token).await {
            Ok(surface) => surface,
            Err(outcome) => return self.finish(file, outcome),
        };

        let payload = match self.read_payload(&file.path, kind).await {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Error reading {}: {e}", file.path.display());
                self.register.clear_if_matches(file.id);
                return self.finish(file, DeliveryOutcome::ReadFailed(e.to_string()));
            }
        };
        if token.is_cancelled() {
            return self.finish(file, DeliveryOutcome::Superseded);
        }

        self.observer.on_state(file, DeliveryState::Resetting);
        self.reset(surface.as_ref()).await;

        self.observer.on_state(file, DeliveryState::Injecting);
        let outcome = self.inject(file, surface.as_ref(), &payload, &token).await;

        if let DeliveryOutcome::BridgeUnavailable { .. } = outcome {
            self.observer.on_state(file, DeliveryState::GaveUp);
            let reloaded = allow_reload && self.config.reload_on_exhaustion && reload(surface.as_ref()).await;
            return self.finish(file, DeliveryOutcome::BridgeUnavailable { reloaded });
        }
        self.finish(file, outcome)
    }

    async fn wait_for_surface(
        &self,
        file: &PendingFile,
        token: &CancellationToken,
    ) -> std::result::Result<Arc<dyn WebSurface>, DeliveryOutcome> {
        let policy = self.config.surface;
        for attempt in 1..=policy.max_attempts {
            if let Some(surface) = self.surface.get() {
                return Ok(surface);
            }
            log::warn!(
                "Surface not ready for {} (attempt {attempt}/{})",
                file.path.display(),
                policy.max_attempts
            );
            self.register.touch(file.id);
            if !pause(policy.interval(), token).await {
                return Err(DeliveryOutcome::Superseded);
            }
        }
        self.surface.get().ok_or_else(|| {
            log::error!(
                "Surface never became ready for {} within {:?}",
                file.path.display(),
                policy.budget()
            );
            DeliveryOutcome::SurfaceUnavailable
        })
    }

    async fn read_payload(&self, path: &Path, kind: FileKind) -> Result<EncodedPayload> {
        let bytes = read_scoped(self.scope.as_ref(), self.reader.as_ref(), path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::UnsupportedFile(path.display().to_string()))?;
        encode(&file_name, &bytes, kind)
    }

    /// Resets the content, assuming completion if it is not acknowledged
    /// within the reset timeout.
    async fn reset(&self, surface: &dyn WebSurface) {
        match tokio::time::timeout(self.config.reset_timeout(), surface.reset_state()).await {
            Ok(Ok(())) => log::debug!("Content reset acknowledged"),
            Ok(Err(e)) => log::warn!("Content reset failed: {e}"),
            Err(_) => log::warn!(
                "Content reset not acknowledged within {:?}, continuing",
                self.config.reset_timeout()
            ),
        }
    }

    async fn inject(
        &self,
        file: &PendingFile,
        surface: &dyn WebSurface,
        payload: &EncodedPayload,
        token: &CancellationToken,
    ) -> DeliveryOutcome {
        let policy = self.config.bridge;
        for attempt in 1..=policy.max_attempts {
            if token.is_cancelled() {
                return DeliveryOutcome::Superseded;
            }
            self.register.touch(file.id);

            match surface.invoke_bridge(payload).await {
                Ok(()) => {
                    self.observer.on_state(file, DeliveryState::Delivered);
                    if !self.register.clear_if_matches(file.id) {
                        log::debug!("Pending slot already moved on from {}", file.path.display());
                    }
                    log::info!("Delivered {} after {attempt} attempt(s)", file.path.display());
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(Error::BridgeNotReady) => {
                    log::debug!("Bridge not ready (attempt {attempt}/{})", policy.max_attempts);
                }
                Err(e) => {
                    log::error!("Injection into content failed: {e}");
                    return DeliveryOutcome::Failed(e.to_string());
                }
            }

            if attempt < policy.max_attempts && !pause(policy.interval(), token).await {
                return DeliveryOutcome::Superseded;
            }
        }

        log::error!(
            "Bridge never defined after {} attempts ({:?}) for {}",
            policy.max_attempts,
            policy.budget(),
            file.path.display()
        );
        DeliveryOutcome::BridgeUnavailable { reloaded: false }
    }

    fn finish(&self, file: &PendingFile, outcome: DeliveryOutcome) -> DeliveryOutcome {
        if outcome == DeliveryOutcome::Superseded {
            log::info!("Delivery of {} superseded", file.path.display());
        }
        self.observer.on_outcome(file, &outcome);
        outcome
    }
}

/// Sleeps for `duration`. Returns `false` if `token` was cancelled first.
async fn pause(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => !token.is_cancelled(),
        () = token.cancelled() => false,
    }
}

async fn reload(surface: &dyn WebSurface) -> bool {
    match surface.reload().await {
        Ok(()) => true,
        Err(e) => {
            log::error!("Content reload failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::encode::{Encoding, decode_base64};
    use crate::page::ContentPage;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory file reader.
    #[derive(Default)]
    struct MemoryReader {
        files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    }

    impl MemoryReader {
        fn with<B: AsRef<[u8]>>(files: &[(&str, B)]) -> Arc<Self> {
            let reader = Self::default();
            for (path, bytes) in files {
                reader
                    .files
                    .lock()
                    .unwrap()
                    .insert(PathBuf::from(path), bytes.as_ref().to_vec());
            }
            Arc::new(reader)
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    #[async_trait::async_trait]
    impl FileReader for MemoryReader {
        async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        states: Mutex<Vec<(PathBuf, DeliveryState)>>,
    }

    impl RecordingObserver {
        fn states_for(&self, path: &str) -> Vec<DeliveryState> {
            self.states
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == Path::new(path))
                .map(|(_, s)| *s)
                .collect()
        }
    }

    impl DeliveryObserver for RecordingObserver {
        fn on_state(&self, file: &PendingFile, state: DeliveryState) {
            self.states.lock().unwrap().push((file.path.clone(), state));
        }
    }

    #[derive(Default)]
    struct CountingScope {
        open: AtomicU32,
        started: AtomicU32,
    }

    impl SecurityScope for CountingScope {
        fn start_access(&self, _path: &Path) -> bool {
            self.open.fetch_add(1, Ordering::SeqCst);
            self.started.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn stop_access(&self, _path: &Path) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Surface whose bridge is only defined after a reload.
    #[derive(Default)]
    struct ReloadOnlySurface {
        reloads: AtomicU32,
        delivered: Mutex<Vec<EncodedPayload>>,
        reset_delay: Option<Duration>,
    }

    #[async_trait::async_trait]
    impl WebSurface for ReloadOnlySurface {
        async fn reset_state(&self) -> Result<()> {
            if let Some(delay) = self.reset_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }

        async fn invoke_bridge(&self, payload: &EncodedPayload) -> Result<()> {
            if self.reloads.load(Ordering::SeqCst) == 0 {
                return Err(Error::BridgeNotReady);
            }
            self.delivered.lock().unwrap().push(payload.clone());
            Ok(())
        }

        async fn reload(&self) -> Result<()> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_config() -> DeliveryConfig {
        DeliveryConfig::new()
            .with_surface_policy(crate::RetryPolicy::new(Duration::from_millis(50), 10))
            .with_bridge_policy(crate::RetryPolicy::new(Duration::from_millis(100), 50))
            .with_reset_timeout(Duration::from_millis(50))
            .with_settle_delay(Duration::from_millis(20))
            .with_entry_delays(Duration::ZERO, Duration::ZERO)
    }

    /// A page whose single listener records every file it receives.
    fn recording_page(init_delay: Duration) -> (ContentPage, Arc<Mutex<Vec<crate::OpenedFile>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let page = ContentPage::new(
            move |bridge: &Bridge| {
                let sink = Arc::clone(&sink);
                bridge.register(move |file| {
                    sink.lock().unwrap().push(file.clone());
                    Ok(())
                });
            },
            init_delay,
        );
        page.load();
        (page, received)
    }

    fn attached(page: &ContentPage) -> SurfaceSlot {
        let slot = SurfaceSlot::new();
        slot.attach(Arc::new(page.clone()));
        slot
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_extension_is_ignored() {
        let orchestrator = Orchestrator::new(fast_config(), SurfaceSlot::new());
        assert!(orchestrator.open_file("/in/notes.txt", LaunchSource::OpenUrl).is_none());
        assert!(orchestrator.register().current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_html_in_state_order() {
        let html = "<p class=\"x\">it's\r\n\\here</p>";
        let (page, received) = recording_page(Duration::ZERO);
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = Orchestrator::new(fast_config(), attached(&page))
            .with_reader(MemoryReader::with(&[("/in/page.html", html.as_bytes())]))
            .with_observer(observer.clone());

        let outcome = orchestrator
            .open_file("/in/page.html", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(
            observer.states_for("/in/page.html"),
            vec![
                DeliveryState::WaitingForSurface,
                DeliveryState::Resetting,
                DeliveryState::Injecting,
                DeliveryState::Delivered,
            ]
        );
        assert_eq!(page.resets(), 1);
        assert!(orchestrator.register().current().is_none());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].file_name, "page.html");
        assert_eq!(received[0].content, html);
        assert_eq!(received[0].encoding, Encoding::Text);
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_model_bytes_exactly() {
        let bytes: Vec<u8> = (0..=255).collect();
        let (page, received) = recording_page(Duration::ZERO);
        let orchestrator = Orchestrator::new(fast_config(), attached(&page))
            .with_reader(MemoryReader::with(&[("/in/Mesh.STL", &bytes)]));

        let outcome = orchestrator
            .open_file("/in/Mesh.STL", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
        let received = received.lock().unwrap();
        assert_eq!(received[0].encoding, Encoding::Base64);
        assert_eq!(decode_base64(&received[0].content).unwrap(), bytes);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_surface_to_be_attached() {
        let (page, received) = recording_page(Duration::ZERO);
        let slot = SurfaceSlot::new();
        let orchestrator = Orchestrator::new(fast_config(), slot.clone())
            .with_reader(MemoryReader::with(&[("/in/a.html", b"a")]));

        let handle = orchestrator.open_file("/in/a.html", LaunchSource::ColdLaunch).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(orchestrator.register().holds(Path::new("/in/a.html")));

        slot.attach(Arc::new(page.clone()));
        assert!(matches!(handle.await.unwrap(), DeliveryOutcome::Delivered { .. }));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn surface_wait_is_bounded() {
        let orchestrator = Orchestrator::new(fast_config(), SurfaceSlot::new())
            .with_reader(MemoryReader::with(&[("/in/a.html", b"a")]));

        let outcome = orchestrator
            .open_file("/in/a.html", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::SurfaceUnavailable);
        assert!(orchestrator.register().holds(Path::new("/in/a.html")));
    }

    #[tokio::test(start_paused = true)]
    async fn detached_surface_is_unavailable() {
        let (page, _received) = recording_page(Duration::ZERO);
        let slot = attached(&page);
        slot.detach();
        let orchestrator = Orchestrator::new(fast_config(), slot)
            .with_reader(MemoryReader::with(&[("/in/a.html", b"a")]));

        let outcome = orchestrator
            .open_file("/in/a.html", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert!(matches!(outcome.into_result(), Err(Error::SurfaceNotReady)));
    }

    #[test]
    fn outcomes_map_to_errors() {
        assert_eq!(DeliveryOutcome::Delivered { attempts: 3 }.into_result().unwrap(), 3);
        assert!(matches!(DeliveryOutcome::Superseded.into_result(), Err(Error::Cancelled)));
        assert!(matches!(
            DeliveryOutcome::BridgeUnavailable { reloaded: true }.into_result(),
            Err(Error::BridgeNotReady)
        ));
        assert!(matches!(
            DeliveryOutcome::ReadFailed("gone".to_string()).into_result(),
            Err(Error::Delivery(reason)) if reason == "gone"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_bridge_is_defined() {
        let (page, received) = recording_page(Duration::from_millis(350));
        let orchestrator = Orchestrator::new(fast_config(), attached(&page))
            .with_reader(MemoryReader::with(&[("/in/a.htm", b"late")]));

        let outcome = orchestrator
            .open_file("/in/a.htm", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 5 });
        assert_eq!(received.lock().unwrap()[0].content, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bridge_reloads_and_rechecks_pending() {
        let surface = Arc::new(ReloadOnlySurface::default());
        let slot = SurfaceSlot::new();
        slot.attach(surface.clone());
        let config = fast_config().with_bridge_policy(crate::RetryPolicy::new(Duration::from_millis(10), 3));
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = Orchestrator::new(config, slot)
            .with_reader(MemoryReader::with(&[("/in/a.obj", b"v 0 0 0")]))
            .with_observer(observer.clone());

        let outcome = orchestrator
            .open_file("/in/a.obj", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(surface.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(surface.delivered.lock().unwrap().len(), 1);
        assert!(observer.states_for("/in/a.obj").contains(&DeliveryState::GaveUp));
        assert!(orchestrator.register().current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn file_opened_during_reload_settle_keeps_its_own_kind() {
        let surface = Arc::new(ReloadOnlySurface::default());
        let slot = SurfaceSlot::new();
        slot.attach(surface.clone());
        let config = fast_config().with_bridge_policy(crate::RetryPolicy::new(Duration::from_millis(10), 3));
        let orchestrator = Orchestrator::new(config, slot).with_reader(MemoryReader::with(&[
            ("/in/a.obj", b"v 0 0 0".as_slice()),
            ("/in/b.html", b"<p>b</p>".as_slice()),
        ]));

        let first = orchestrator.open_file("/in/a.obj", LaunchSource::OpenUrl).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(surface.reloads.load(Ordering::SeqCst), 1);
        let second = orchestrator.open_file("/in/b.html", LaunchSource::OpenUrl).unwrap();

        assert_eq!(first.await.unwrap(), DeliveryOutcome::BridgeUnavailable { reloaded: true });
        assert!(matches!(second.await.unwrap(), DeliveryOutcome::Delivered { .. }));

        let delivered = surface.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].file_name, "b.html");
        assert_eq!(delivered[0].encoding, Encoding::Text);
        assert_eq!(delivered[0].content, "<p>b</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bridge_without_reload_gives_up() {
        let surface = Arc::new(ReloadOnlySurface::default());
        let slot = SurfaceSlot::new();
        slot.attach(surface.clone());
        let config = fast_config()
            .with_bridge_policy(crate::RetryPolicy::new(Duration::from_millis(10), 3))
            .with_reload_on_exhaustion(false);
        let orchestrator = Orchestrator::new(config, slot)
            .with_reader(MemoryReader::with(&[("/in/a.ply", b"ply")]));

        let outcome = orchestrator
            .open_file("/in/a.ply", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::BridgeUnavailable { reloaded: false });
        assert_eq!(surface.reloads.load(Ordering::SeqCst), 0);
        assert!(surface.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_file_supersedes_in_flight_delivery() {
        let (page, received) = recording_page(Duration::from_millis(500));
        let orchestrator = Orchestrator::new(fast_config(), attached(&page))
            .with_reader(MemoryReader::with(&[("/in/a.html", b"A"), ("/in/b.html", b"B")]));

        let first = orchestrator.open_file("/in/a.html", LaunchSource::OpenUrl).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = orchestrator.open_file("/in/b.html", LaunchSource::OpenUrl).unwrap();

        assert!(orchestrator.register().holds(Path::new("/in/b.html")));
        assert_eq!(first.await.unwrap(), DeliveryOutcome::Superseded);
        assert!(orchestrator.register().holds(Path::new("/in/b.html")));

        assert!(matches!(second.await.unwrap(), DeliveryOutcome::Delivered { .. }));
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "B");
        assert!(orchestrator.register().current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_releases_scope_and_clears_slot() {
        let (page, received) = recording_page(Duration::ZERO);
        let scope = Arc::new(CountingScope::default());
        let orchestrator = Orchestrator::new(fast_config(), attached(&page))
            .with_reader(MemoryReader::empty())
            .with_scope(scope.clone());

        let outcome = orchestrator
            .open_file("/in/gone.html", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert!(matches!(outcome, DeliveryOutcome::ReadFailed(_)));
        assert_eq!(scope.started.load(Ordering::SeqCst), 1);
        assert_eq!(scope.open.load(Ordering::SeqCst), 0);
        assert!(orchestrator.register().current().is_none());
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_utf8_html_is_not_delivered() {
        let (page, received) = recording_page(Duration::ZERO);
        let orchestrator = Orchestrator::new(fast_config(), attached(&page))
            .with_reader(MemoryReader::with(&[("/in/bad.html", b"\xff\xfe\x00")]));

        let outcome = orchestrator
            .open_file("/in/bad.html", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert!(matches!(outcome, DeliveryOutcome::ReadFailed(_)));
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_takes_pending_and_delivers_once() {
        let (page, received) = recording_page(Duration::ZERO);
        let slot = SurfaceSlot::new();
        let orchestrator = Orchestrator::new(fast_config(), slot.clone())
            .with_reader(MemoryReader::with(&[("/in/a.html", b"A")]));

        let backgrounded = orchestrator.open_file("/in/a.html", LaunchSource::OpenUrl).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let resumed = orchestrator.resume_foreground().unwrap();
        assert_eq!(backgrounded.await.unwrap(), DeliveryOutcome::Superseded);

        slot.attach(Arc::new(page.clone()));
        assert!(matches!(resumed.await.unwrap(), DeliveryOutcome::Delivered { .. }));
        assert_eq!(received.lock().unwrap().len(), 1);
        assert!(orchestrator.resume_foreground().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reset_does_not_block_injection() {
        let surface = Arc::new(ReloadOnlySurface {
            reloads: AtomicU32::new(1),
            reset_delay: Some(Duration::from_secs(30)),
            ..ReloadOnlySurface::default()
        });
        let slot = SurfaceSlot::new();
        slot.attach(surface.clone());
        let orchestrator = Orchestrator::new(fast_config(), slot)
            .with_reader(MemoryReader::with(&[("/in/a.html", b"A")]));

        let started = tokio::time::Instant::now();
        let outcome = orchestrator
            .open_file("/in/a.html", LaunchSource::OpenUrl)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cold_launch_waits_launch_delay() {
        let (page, received) = recording_page(Duration::ZERO);
        let config = fast_config().with_entry_delays(Duration::from_secs(1), Duration::from_millis(500));
        let orchestrator = Orchestrator::new(config, attached(&page))
            .with_reader(MemoryReader::with(&[("/in/a.html", b"A")]));

        let handle = orchestrator.open_file("/in/a.html", LaunchSource::ColdLaunch).unwrap();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(received.lock().unwrap().is_empty());

        handle.await.unwrap();
        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
