//! # Storage Errors

use thiserror::Error;

/// Errors of the block store and its backends.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Underlying I/O or batch failure. The owning atomic operation
    /// aborts; recurring I/O errors are fatal for the node.
    #[error("storage backend error: {0}")]
    Io(String),

    /// A stored record failed to decode.
    #[error(transparent)]
    Codec(#[from] ember_codec::CodecError),

    /// A record that must exist is absent.
    #[error("{what} not found for {key}")]
    NotFound { what: &'static str, key: String },

    /// Cross-record inconsistency, e.g. an index pointing at nothing.
    #[error("store corruption: {0}")]
    Corruption(String),
}
