use thiserror::Error;

/// Errors raised while building or validating core data-model values.
///
/// Transport- and rule-specific errors live in their own crates
/// (`alert-state::StateError`, `alert-bus::BusError`, `alert-notify::NotifyError`,
/// `alert-rules::EvaluatorError`) — this enum only covers the shared model.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
