pub mod cache;
pub mod config;
pub mod controller;
pub mod database;
pub mod error;
pub mod utils;

pub use cache::{CacheBackend, GroupCache, MemoryBackend, MetaCache, RedisBackend};
pub use controller::GroupDatabase;
pub use error::{CacheError, CacheResult};
