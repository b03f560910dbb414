use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("state store error: {0}")]
    Store(#[from] alert_state::StateError),

    #[error("bus error: {0}")]
    Bus(#[from] alert_bus::BusError),

    #[error("rule error: {0}")]
    Rule(#[from] alert_rules::RuleError),

    #[error("evaluator error: {0}")]
    Evaluator(#[from] alert_rules::EvaluatorError),

    #[error("notification error: {0}")]
    Notify(#[from] alert_notify::NotifyError),

    #[error("startup error: {0}")]
    Startup(String),
}
