/// 缓存操作
/// 读穿透加载、延迟失效和群组缓存

// 单键与批量加载
pub mod loader;

// 待删除键的累加器
pub mod meta;

// 群组缓存操作
pub mod group;

// 重新导出常用操作
pub use group::{GROUP_CACHE_EXPIRE, GroupCache};
pub use loader::{batch_get_cache, get_cache};
pub use meta::MetaCache;
