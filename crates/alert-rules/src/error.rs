use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("state store error: {0}")]
    Store(#[from] alert_state::StateError),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}
