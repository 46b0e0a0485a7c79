//! Error types for loading a layer and decoding channel messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Anything that aborts a layer load. The worker never becomes ready after one of these.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A feature is missing its id or `Hierarchy`, or repeats an id.
    #[error("malformed feature #{index}: {reason}")]
    MalformedFeature { index: usize, reason: String },

    /// The side table could not be written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The dataset could not be opened or parsed.
    #[error("failed to read features from {}: {message}", path.display())]
    Reader { path: PathBuf, message: String },

    #[error("no supported dataset found at {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The load task died before reporting back.
    #[error("load of layer {layer} aborted: {reason}")]
    Aborted { layer: String, reason: String },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A line on the channel that could not be turned into a request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("invalid `{kind}` message: {reason}")]
    InvalidFields { kind: String, reason: String },
}
