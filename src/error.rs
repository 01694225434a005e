//! Error types for the reconstruction engine.
//!
//! None of these abort a reconstruction pass. Page fetch failures are
//! absorbed by [`PageFetcher`](crate::fetch::PageFetcher), store failures by
//! [`Reconstructor`](crate::session::Reconstructor). They surface only from
//! direct calls into a page source, a watermark store, or config parsing.

use thiserror::Error;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while assembling a thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The page source answered with a non-success status
    #[error("page {page} returned HTTP status {status}")]
    Http {
        /// Page number that was requested
        page: u32,
        /// Status code returned by the server
        status: u16,
    },

    /// The page could not be retrieved at all
    #[error("failed to fetch page {page}: {reason}")]
    Fetch {
        /// Page number that was requested
        page: u32,
        /// Transport-level description of the failure
        reason: String,
    },

    /// I/O error (when using runtime integrations)
    #[error("I/O error: {0}")]
    Io(String),

    /// Watermark store failure
    #[error("watermark store error: {0}")]
    Store(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Page number associated with a fetch failure, if any.
    pub fn page(&self) -> Option<u32> {
        match self {
            Error::Http { page, .. } | Error::Fetch { page, .. } => Some(*page),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
