//! Rule schema (re-exported from `alert-core`), hot-reloading loader, and
//! the pure matching/threshold evaluator.

pub mod error;
pub mod evaluator;
pub mod loader;
pub mod validation;

pub use error::RuleError;
pub use evaluator::{test_rule, EvaluatorError, RuleEvaluator, RuleTestResult};
pub use loader::RuleLoader;
pub use validation::{validate_rule, ValidationResult};
