pub mod backend;
pub mod error;
pub mod memory;
pub mod store;

#[cfg(feature = "redis-backend")]
pub mod redis_store;

pub use backend::build_backend;
pub use error::StateError;
pub use memory::InMemoryStateStore;
pub use store::StateStore;

#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStateStore;
