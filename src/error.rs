//! Error type shared by the transport, extraction, and persistence layers.
//!
//! Every variant here is fatal for the current crawl. Expected absences
//! (a day without an image, the end of the archive) are modelled as `Option`
//! values by the callers and never surface as errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection failure, timeout, TLS failure, or a broken response body.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("server returned {status} for {url}")]
    Status { url: String, status: u16 },

    /// The output directory could not be created.
    #[error("could not create output directory {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file operation on {} failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Neither `Last-Modified` nor the page's date label yielded a timestamp.
    #[error("could not derive a timestamp from date label {label:?}")]
    DateParse { label: String },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl CrawlError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CrawlError::Io {
            path: path.into(),
            source,
        }
    }
}
