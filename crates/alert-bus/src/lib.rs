pub mod adapter;
pub mod backend;
pub mod batcher;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod validation;

#[cfg(feature = "queue-redis")]
pub mod redis_bus;

#[cfg(feature = "queue-sqs")]
pub mod sqs;

pub use adapter::{BusAdapter, BusHealth, BusMessage};
pub use backend::build_backend;
pub use batcher::MicroBatcher;
pub use envelope::parse_envelope;
pub use error::BusError;
pub use memory::InMemoryBusAdapter;
pub use validation::validate_and_default;
