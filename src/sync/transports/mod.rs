pub mod memory;
pub mod redis;

pub use memory::{MemoryBus, MemoryTransport};
pub use redis::{RedisTransport, RedisTransportConfig};
