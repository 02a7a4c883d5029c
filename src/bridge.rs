//! The call surface between native file delivery and web content listeners.
//!
//! A [`Bridge`] lives exactly as long as one content page load. Listeners
//! can only be added; the list never shrinks within a page lifetime.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::encode::{Encoding, unescape_script_string};

/// What a web-side listener receives: `{fileName, content, encoding}`.
///
/// Text content arrives unescaped (the literal has been read), base64
/// content arrives still encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedFile {
    pub file_name: String,
    pub content: String,
    pub encoding: Encoding,
}

/// Error type a listener may fail with.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener = Arc<dyn Fn(&OpenedFile) -> Result<(), ListenerError> + Send + Sync>;

/// Listener registry plus the single delivery entry point.
#[derive(Default)]
pub struct Bridge {
    listeners: Mutex<Vec<Listener>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Bridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. Every registered listener runs on each delivery.
    pub fn register<F>(&self, listener: F)
    where
        F: Fn(&OpenedFile) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
        log::debug!("Bridge listener added");
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Native-side entry point. Reads the escaped literals, then invokes
    /// every listener in registration order. `encoding` defaults to text.
    ///
    /// Runs over the listeners registered when the call starts; a listener
    /// may register more, which take part from the next delivery on. A
    /// failing or panicking listener is logged and does not stop the others.
    /// Returns the number of listeners that completed without error.
    pub fn deliver(&self, file_name: &str, content: &str, encoding: Option<Encoding>) -> usize {
        let encoding = encoding.unwrap_or_default();
        log::info!("Bridge: opening file {file_name} (encoding: {encoding})");

        let opened = OpenedFile {
            file_name: unescape_script_string(file_name),
            content: match encoding {
                Encoding::Text => unescape_script_string(content),
                Encoding::Base64 => content.to_string(),
            },
            encoding,
        };

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut completed = 0;
        for (index, listener) in listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(&opened))) {
                Ok(Ok(())) => completed += 1,
                Ok(Err(e)) => log::error!("Bridge listener {index} failed: {e}"),
                Err(_) => log::error!("Bridge listener {index} panicked"),
            }
        }
        completed
    }
}
