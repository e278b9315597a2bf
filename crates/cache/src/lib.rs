//! Multi-instance cache coordination.
//!
//! Cache instances are treated as independent, not replicated: writes fan
//! out best-effort to every instance and reads report only the instances
//! that answered with a value. Replicas coordinate through the Redis
//! instances they share.

pub mod config;
pub mod coordinator;
pub mod keys;
pub mod memory;
pub mod remote;

pub use config::CacheConfig;
pub use coordinator::{CacheCoordinator, InstanceRef};
pub use memory::MemoryCache;
pub use remote::RedisCache;
