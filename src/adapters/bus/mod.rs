//! Cross-instance bus adapters implementing the `EventBus` port.

mod in_memory;
mod redis;

pub use in_memory::InMemoryEventBus;
pub use redis::RedisEventBus;
