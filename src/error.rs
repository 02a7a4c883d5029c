//! Error types for the viewer-shell library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while handing files to the web content or serving
/// cached assets.
#[derive(Error, Debug)]
pub enum Error {
    /// The rendering surface has not been constructed yet.
    #[error("rendering surface not ready")]
    SurfaceNotReady,

    /// The web content has not defined its delivery entry point yet.
    #[error("bridge entry point not defined by web content")]
    BridgeNotReady,

    /// Reading the opened file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file being opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A text-kind file did not contain valid UTF-8.
    #[error("{file_name} is not valid UTF-8 text")]
    InvalidUtf8 {
        /// Name of the offending file.
        file_name: String,
    },

    /// The file extension is not one the shell opens.
    #[error("unsupported file: {0}")]
    UnsupportedFile(String),

    /// The delivery attempt was superseded by a newer file.
    #[error("delivery cancelled")]
    Cancelled,

    /// The opened file could not be handed to the web content.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Some files given on the command line were not delivered.
    #[error("{0} file(s) not delivered")]
    Undelivered(usize),

    /// A network fetch did not produce a usable response.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP front failed to bind or serve.
    #[error("server error: {0}")]
    Server(String),

    /// Configuration could not be parsed or written.
    #[error("config error: {0}")]
    Config(String),
}

/// A specialized `Result` type for viewer-shell operations.
pub type Result<T> = std::result::Result<T, Error>;
