use async_trait::async_trait;
use futures_util::future::BoxFuture;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::CacheBackend;
use crate::cache::keys::lock_key;
use crate::config::Config;
use crate::error::{CacheError, CacheResult};

/// 只释放自己持有的锁
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// 键锁参数
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// 锁的过期时间，持有者崩溃或被取消后锁自动释放
    pub lock_expire: Duration,
    /// 等待其他持有者的最长时间
    pub wait_timeout: Duration,
    /// 轮询间隔
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lock_expire: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(15),
            retry_interval: Duration::from_millis(50),
        }
    }
}

impl LockOptions {
    /// 等待时间至少要覆盖一次锁过期，否则持有者崩溃后所有等待者都会超时
    pub fn normalized(mut self) -> Self {
        let floor = self.lock_expire + self.retry_interval;
        if self.wait_timeout < floor {
            tracing::warn!(
                wait_ms = self.wait_timeout.as_millis() as u64,
                floor_ms = floor.as_millis() as u64,
                "cache lock wait is shorter than lock expiry, raising it"
            );
            self.wait_timeout = floor;
        }
        self
    }
}

impl From<&Config> for LockOptions {
    fn from(config: &Config) -> Self {
        Self {
            lock_expire: config.lock_expire(),
            wait_timeout: config.lock_wait(),
            retry_interval: config.lock_retry(),
        }
        .normalized()
    }
}

/// Redis 缓存后端
#[derive(Clone)]
pub struct RedisBackend {
    redis_client: Arc<RedisClient>,
    options: LockOptions,
}

impl RedisBackend {
    /// 创建新的 Redis 缓存后端
    pub fn new(redis_client: Arc<RedisClient>, options: LockOptions) -> Self {
        Self {
            redis_client,
            options,
        }
    }

    /// 尝试获取键锁，成功返回持有中的锁
    async fn try_lock(
        &self,
        conn: &mut MultiplexedConnection,
        lock_key: &str,
    ) -> CacheResult<Option<HeldLock>> {
        let token = Uuid::new_v4().to_string();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(lock_key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.options.lock_expire.as_millis() as u64)
            .query_async(conn)
            .await?;

        Ok(acquired.map(|_| HeldLock {
            redis_client: self.redis_client.clone(),
            lock_key: lock_key.to_string(),
            token,
            released: false,
        }))
    }
}

/// 持有中的键锁
///
/// 正常路径调用 `release`；加载被取消或提前返回时，drop 会在后台释放锁，
/// 等待者不必等到锁过期。
struct HeldLock {
    redis_client: Arc<RedisClient>,
    lock_key: String,
    token: String,
    released: bool,
}

impl HeldLock {
    async fn release(mut self, conn: &mut MultiplexedConnection) {
        self.released = true;
        release_lock(conn, &self.lock_key, &self.token).await;
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(lock_key = %self.lock_key, "no runtime to release cache lock");
            return;
        };
        let redis_client = self.redis_client.clone();
        let lock_key = std::mem::take(&mut self.lock_key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            match redis_client.get_multiplexed_async_connection().await {
                Ok(mut conn) => release_lock(&mut conn, &lock_key, &token).await,
                Err(e) => {
                    tracing::warn!(lock_key = %lock_key, error = %e, "failed to release cache lock")
                }
            }
        });
    }
}

async fn release_lock(conn: &mut MultiplexedConnection, lock_key: &str, token: &str) {
    let released = redis::Script::new(RELEASE_LOCK_SCRIPT)
        .key(lock_key)
        .arg(token)
        .invoke_async::<i64>(conn)
        .await;

    // 释放失败时锁会在过期后自动消失
    if let Err(e) = released {
        tracing::warn!(lock_key, error = %e, "failed to release cache lock");
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let result: Option<Vec<u8>> = conn.get(key).await?;
        Ok(result)
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;

        Ok(values)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        // 单条 DEL 命令要么整体成功要么整体失败
        let deleted: Result<u64, redis::RedisError> = async {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            conn.del(keys).await
        }
        .await;

        deleted.map_err(|e| {
            tracing::error!(keys = keys.len(), error = %e, "batch cache delete failed");
            CacheError::Invalidation {
                unresolved: keys.to_vec(),
                cause: Some(Arc::new(CacheError::from(e))),
            }
        })
    }

    async fn fetch_locked<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
        load: BoxFuture<'a, CacheResult<Vec<u8>>>,
    ) -> CacheResult<Vec<u8>> {
        let lock_key = lock_key(key);
        let deadline = Instant::now() + self.options.wait_timeout;
        let mut load = Some(load);
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        loop {
            let cached: Option<Vec<u8>> = conn.get(key).await?;
            if let Some(bytes) = cached {
                return Ok(bytes);
            }

            if let Some(lock) = self.try_lock(&mut conn, &lock_key).await? {
                // 上一个持有者可能在两次读取之间写入并释放了锁
                let cached: Option<Vec<u8>> = conn.get(key).await?;
                if let Some(bytes) = cached {
                    lock.release(&mut conn).await;
                    return Ok(bytes);
                }

                let Some(load) = load.take() else {
                    lock.release(&mut conn).await;
                    return Err(CacheError::loader("loader already consumed"));
                };
                tracing::debug!(key, "cache miss, loading under lock");
                let result = load.await;
                let stored = match &result {
                    Ok(bytes) => {
                        let written: Result<(), redis::RedisError> =
                            conn.set_ex(key, bytes.clone(), ttl.as_secs().max(1)).await;
                        written.map_err(CacheError::from)
                    }
                    Err(_) => Ok(()),
                };
                lock.release(&mut conn).await;
                stored?;
                return result;
            }

            // 持有者可能加载失败而没有写入值，到期前继续竞争锁
            if Instant::now() >= deadline {
                return Err(CacheError::LockTimeout {
                    key: key.to_string(),
                });
            }
            tokio::time::sleep(self.options.retry_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(lock_expire_ms: u64, lock_wait_ms: u64) -> Config {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            group_cache_expire_secs: 60,
            lock_expire_ms,
            lock_wait_ms,
            lock_retry_ms: 20,
        }
    }

    #[test]
    fn lock_options_follow_config() {
        let options = LockOptions::from(&config(2_000, 5_000));
        assert_eq!(options.lock_expire, Duration::from_secs(2));
        assert_eq!(options.wait_timeout, Duration::from_secs(5));
        assert_eq!(options.retry_interval, Duration::from_millis(20));
    }

    #[test]
    fn lock_wait_outlasts_lock_expiry() {
        let options = LockOptions::from(&config(2_000, 300));
        assert_eq!(options.wait_timeout, Duration::from_millis(2_020));

        let defaults = LockOptions::default();
        assert!(defaults.wait_timeout > defaults.lock_expire);
    }

    fn redis_backend(options: LockOptions) -> RedisBackend {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let client = RedisClient::open(url).unwrap();
        RedisBackend::new(Arc::new(client), options)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    async fn concurrent_misses_load_once() {
        let backend = Arc::new(redis_backend(LockOptions::default()));
        let key = format!("TEST_SINGLE_FLIGHT:{}", Uuid::new_v4());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let backend = backend.clone();
                let key = key.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    let load = async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, CacheError>(b"v".to_vec())
                    }
                    .boxed();
                    backend.fetch_locked(&key, Duration::from_secs(60), load).await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), b"v".to_vec());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        backend.delete(&[key]).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    async fn cancelled_leader_releases_lock() {
        let options = LockOptions {
            lock_expire: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(31),
            retry_interval: Duration::from_millis(20),
        };
        let backend = Arc::new(redis_backend(options));
        let key = format!("TEST_CANCELLED:{}", Uuid::new_v4());
        let lock = lock_key(&key);

        let stalled = {
            let backend = backend.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let load = async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, CacheError>(b"never".to_vec())
                }
                .boxed();
                backend.fetch_locked(&key, Duration::from_secs(60), load).await
            })
        };

        let mut conn = backend
            .redis_client
            .get_multiplexed_async_connection()
            .await
            .unwrap();
        let mut held = false;
        for _ in 0..100 {
            held = conn.exists(&lock).await.unwrap();
            if held {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(held);

        stalled.abort();
        let _ = stalled.await;

        // 远早于锁过期时间就能拿到锁
        let load = async { Ok::<_, CacheError>(b"fresh".to_vec()) }.boxed();
        let value = tokio::time::timeout(
            Duration::from_secs(2),
            backend.fetch_locked(&key, Duration::from_secs(60), load),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(value, b"fresh".to_vec());
        backend.delete(&[key]).await.unwrap();
    }
}
