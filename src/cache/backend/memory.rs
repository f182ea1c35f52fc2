// 内存缓存后端
// 与 Redis 后端遵守同一套接口，过期时间基于 tokio 时钟，测试中可以暂停和快进

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use dashmap::mapref::entry::Entry;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::CacheBackend;
use crate::error::{CacheError, CacheResult};

type LoadState = Option<CacheResult<Vec<u8>>>;

struct CachedEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// 内存缓存后端
///
/// 同一个键的并发未命中共享一次加载：持有者把结果（包括错误）广播给所有等待者。
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, CachedEntry>,
    inflight: DashMap<String, watch::Receiver<LoadState>>,
    // 删除时无法确认的键，用于模拟部分失效失败
    stuck: DashSet<String>,
    offline: AtomicBool,
}

enum Claim {
    Leader(watch::Sender<LoadState>),
    Waiter(watch::Receiver<LoadState>),
}

// 持有者结束或被取消时释放单飞槽位
struct InflightGuard<'a> {
    inflight: &'a DashMap<String, watch::Receiver<LoadState>>,
    key: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(self.key);
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 键是否存在且未过期
    pub fn contains(&self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// 当前未过期的键数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 模拟后端不可用
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 之后对这些键的删除都会报告为未确认
    pub fn stick_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            self.stuck.insert(key.into());
        }
    }

    pub fn unstick_all(&self) {
        self.stuck.clear();
    }

    fn check_online(&self) -> CacheResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::from(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "memory backend offline",
            ))));
        }
        Ok(())
    }

    fn live(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.expires_at > now {
            return Some(entry.value.clone());
        }
        drop(entry);
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        None
    }

    fn insert(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn claim(&self, key: &str) -> Claim {
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(e) => Claim::Waiter(e.get().clone()),
            Entry::Vacant(e) => {
                let (tx, rx) = watch::channel(None);
                e.insert(rx);
                Claim::Leader(tx)
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check_online()?;
        Ok(self.live(key))
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        self.check_online()?;
        Ok(keys.iter().map(|k| self.live(k)).collect())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.check_online()?;
        self.insert(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        self.check_online()?;
        let mut deleted = 0;
        let mut unresolved = Vec::new();
        for key in keys {
            if self.stuck.contains(key) {
                unresolved.push(key.clone());
            } else if self.entries.remove(key).is_some() {
                deleted += 1;
            }
        }

        if !unresolved.is_empty() {
            return Err(CacheError::unresolved(unresolved));
        }
        Ok(deleted)
    }

    async fn fetch_locked<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
        load: BoxFuture<'a, CacheResult<Vec<u8>>>,
    ) -> CacheResult<Vec<u8>> {
        let mut load = Some(load);

        loop {
            self.check_online()?;
            if let Some(bytes) = self.live(key) {
                return Ok(bytes);
            }

            match self.claim(key) {
                Claim::Leader(tx) => {
                    let guard = InflightGuard {
                        inflight: &self.inflight,
                        key,
                    };
                    // 上一个持有者可能刚写入
                    if let Some(bytes) = self.live(key) {
                        tx.send_replace(Some(Ok(bytes.clone())));
                        return Ok(bytes);
                    }
                    let Some(load) = load.take() else {
                        return Err(CacheError::loader("loader already consumed"));
                    };
                    let result = load.await;
                    if let Ok(bytes) = &result {
                        self.insert(key, bytes.clone(), ttl);
                    }
                    tx.send_replace(Some(result.clone()));
                    drop(guard);
                    return result;
                }
                Claim::Waiter(mut rx) => {
                    // 持有者被取消时发送端被丢弃，回到循环重新竞争
                    if let Ok(state) = rx.wait_for(|state| state.is_some()).await {
                        if let Some(result) = state.as_ref() {
                            return result.clone();
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let backend = MemoryBackend::new();
        backend
            .set("GROUP_INFO:g1", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(backend.contains("GROUP_INFO:g1"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(backend.get("GROUP_INFO:g1").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_stuck_keys_only() {
        let backend = MemoryBackend::new();
        for key in ["a", "b", "c"] {
            backend
                .set(key, b"1".to_vec(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        backend.stick_keys(["b"]);

        let err = backend
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap_err();
        match err {
            CacheError::Invalidation { unresolved, cause } => {
                assert_eq!(unresolved, vec!["b"]);
                assert!(cause.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!backend.contains("a"));
        assert!(backend.contains("b"));
        assert!(!backend.contains("c"));
    }

    #[tokio::test]
    async fn offline_backend_is_unavailable() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        let err = backend.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn cancelled_leader_releases_slot() {
        let backend = Arc::new(MemoryBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));

        // 持有者在加载中途被取消
        let stalled = {
            let backend = backend.clone();
            tokio::spawn(async move {
                let load = async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, CacheError>(b"never".to_vec())
                }
                .boxed();
                backend.fetch_locked("k", Duration::from_secs(60), load).await
            })
        };
        tokio::task::yield_now().await;
        stalled.abort();
        let _ = stalled.await;

        let counted = calls.clone();
        let load = async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(b"fresh".to_vec())
        }
        .boxed();
        let value = backend
            .fetch_locked("k", Duration::from_secs(60), load)
            .await
            .unwrap();

        assert_eq!(value, b"fresh".to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
