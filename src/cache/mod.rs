// 缓存模块
// 包含缓存后端、键、缓存数据结构和操作逻辑

pub mod backend;
pub mod keys;
pub mod models;
pub mod operations;

// 重新导出常用类型和函数，方便其他模块使用
pub use backend::{CacheBackend, LockOptions, MemoryBackend, RedisBackend};
pub use models::GroupSimpleUserId;
pub use operations::{GroupCache, MetaCache, batch_get_cache, get_cache};
