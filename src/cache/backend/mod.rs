/// 缓存后端
/// 定义缓存读写、批量删除和单飞加载的统一接口
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::time::Duration;

use crate::error::CacheResult;

pub use self::memory::MemoryBackend;
pub use self::redis::{LockOptions, RedisBackend};

/// 缓存后端接口
///
/// 后端是进程外的共享服务，跨调用的协调只依赖后端自身的原语。
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// 读取一个键，不存在或已过期返回 None
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// 一次往返读取多个键，结果与 `keys` 一一对应
    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// 批量删除，返回实际删除的数量
    ///
    /// 部分失败时返回 `CacheError::Invalidation`，其中只包含未确认删除的键。
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// 读取键，未命中时在键锁保护下执行 `load` 并写入缓存
    ///
    /// 同一个键的并发调用中只有锁持有者会驱动 `load`，其余调用等待结果。
    /// `load` 失败时不写入任何值。
    async fn fetch_locked<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
        load: BoxFuture<'a, CacheResult<Vec<u8>>>,
    ) -> CacheResult<Vec<u8>>;
}
