//! Single-slot register of the file waiting to be handed to the web content.
//!
//! Last writer wins. Each entry carries its own cancellation token, so
//! replacing or taking an entry stops the delivery attempt that owned it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A file waiting to be delivered.
#[derive(Debug, Clone)]
pub struct PendingFile {
    /// Identity of this open event. A re-entry of the same path gets a new id.
    pub id: Uuid,
    pub path: PathBuf,
    pub last_attempt: DateTime<Utc>,
    token: CancellationToken,
}

impl PendingFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            last_attempt: Utc::now(),
            token: CancellationToken::new(),
        }
    }

    /// A fresh entry for the same path, used when re-entering delivery.
    #[must_use]
    pub fn renewed(&self) -> Self {
        Self::new(&self.path)
    }

    /// Token cancelled once this entry is superseded or taken.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

}

/// The pending-file slot.
#[derive(Debug, Default)]
pub struct PendingRegister {
    slot: Mutex<Option<PendingFile>>,
}

impl PendingRegister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slot content, cancelling the superseded entry's attempt.
    pub fn set_pending(&self, file: PendingFile) {
        let mut slot = self.slot.lock().unwrap();
        if let Some(previous) = slot.replace(file) {
            log::info!(
                "Pending file {} superseded by {}",
                previous.path.display(),
                slot.as_ref().map_or_else(String::new, |f| f.path.display().to_string())
            );
            previous.token.cancel();
        }
    }

    /// Clears the slot only if it still holds the entry with `id`.
    ///
    /// Returns whether the slot was cleared.
    pub fn clear_if_matches(&self, id: Uuid) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Reads and clears the slot in one step, cancelling the taken entry's
    /// in-flight attempt so it cannot also deliver.
    pub fn take_if_present(&self) -> Option<PendingFile> {
        let taken = self.slot.lock().unwrap().take();
        if let Some(file) = &taken {
            file.token.cancel();
        }
        taken
    }

    /// Takes the slot only if it still holds the entry with `id`, checking
    /// and clearing under one lock. The taken entry is cancelled.
    pub fn take_if_matches(&self, id: Uuid) -> Option<PendingFile> {
        let mut slot = self.slot.lock().unwrap();
        if !slot.as_ref().is_some_and(|f| f.id == id) {
            return None;
        }
        let taken = slot.take();
        if let Some(file) = &taken {
            file.token.cancel();
        }
        taken
    }

    /// Records a new attempt on the entry with `id`, if it is still current.
    pub fn touch(&self, id: Uuid) {
        if let Some(file) = self.slot.lock().unwrap().as_mut().filter(|f| f.id == id) {
            file.last_attempt = Utc::now();
        }
    }

    /// Snapshot of the slot.
    #[must_use]
    pub fn current(&self) -> Option<PendingFile> {
        self.slot.lock().unwrap().clone()
    }

    /// Whether the slot holds an entry for `path`.
    #[must_use]
    pub fn holds(&self, path: &Path) -> bool {
        self.slot.lock().unwrap().as_ref().is_some_and(|f| f.path == path)
    }
}
