use thiserror::Error;

/// Errors a [`crate::traits::Notifier`] can report. The `Dispatcher` uses the
/// variant to decide whether a delivery is retryable (see §7 of the error
/// handling design: rate-limit and server errors retry, client errors don't).
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("webhook rejected the request ({status}): {body}")]
    ClientError { status: u16, body: String },

    #[error("webhook server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl NotifyError {
    /// Whether the `Dispatcher`'s retry stage should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotifyError::Transport(_)
                | NotifyError::ServerError { .. }
                | NotifyError::RateLimited { .. }
        )
    }

    /// `Retry-After`, if this error carries one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            NotifyError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }

    /// Re-materialize this error for delivery to every waiter on a batched
    /// send. `Transport` isn't `Clone` (`reqwest::Error` isn't), so it's
    /// downgraded to a `Config` error carrying the original message.
    pub fn for_broadcast(&self) -> NotifyError {
        match self {
            NotifyError::RateLimited { retry_after_secs } => NotifyError::RateLimited {
                retry_after_secs: *retry_after_secs,
            },
            NotifyError::ClientError { status, body } => NotifyError::ClientError {
                status: *status,
                body: body.clone(),
            },
            NotifyError::ServerError { status, body } => NotifyError::ServerError {
                status: *status,
                body: body.clone(),
            },
            NotifyError::Transport(e) => NotifyError::Config(e.to_string()),
            NotifyError::Template(s) => NotifyError::Template(s.clone()),
            NotifyError::Config(s) => NotifyError::Config(s.clone()),
        }
    }
}
