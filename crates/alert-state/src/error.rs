use thiserror::Error;

/// Errors raised by a [`crate::StateStore`] adapter.
///
/// Mirrors the transient/data split in the error-handling design: transient
/// errors are worth a retry or a skip-and-continue, data errors mean the
/// stored value itself is unusable.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("not found")]
    NotFound,

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("stored data error: {0}")]
    Data(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("backend not configured: {0}")]
    NotConfigured(String),
}
