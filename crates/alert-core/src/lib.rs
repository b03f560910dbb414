pub mod config;
pub mod error;
pub mod model;

pub use config::Config;
pub use error::CoreError;
pub use model::*;
