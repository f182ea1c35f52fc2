// 延迟失效
// 先收集待删除的键，等调用方确认写入已持久化后再一次性批量删除

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::cache::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};

/// 待删除键的累加器
///
/// `add_keys` 只修改进程内状态；`commit` 发出一次批量删除。
/// 删除失败的键会留在待删除集合中，可以再次 `commit`。
#[derive(Clone)]
pub struct MetaCache {
    backend: Arc<dyn CacheBackend>,
    keys: BTreeSet<String>,
}

impl MetaCache {
    pub fn new<I, S>(backend: Arc<dyn CacheBackend>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// 追加待删除的键，重复的键只保留一个
    pub fn add_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
    }

    /// 当前待删除的键
    pub fn pending_keys(&self) -> Vec<String> {
        self.keys.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 批量删除所有待删除的键
    pub async fn commit(&mut self) -> CacheResult<()> {
        if self.keys.is_empty() {
            return Ok(());
        }

        let keys = self.pending_keys();
        match self.backend.delete(&keys).await {
            Ok(deleted) => {
                tracing::debug!(keys = keys.len(), deleted, "cache keys invalidated");
                self.keys.clear();
                Ok(())
            }
            Err(CacheError::Invalidation { unresolved, cause }) => {
                tracing::warn!(
                    keys = keys.len(),
                    unresolved = unresolved.len(),
                    "cache invalidation partially failed"
                );
                self.keys = unresolved.iter().cloned().collect();
                Err(CacheError::Invalidation { unresolved, cause })
            }
            // 没有确认任何删除，保留全部键
            Err(e) => {
                tracing::error!(keys = keys.len(), error = %e, "cache invalidation failed");
                Err(CacheError::Invalidation {
                    unresolved: keys,
                    cause: Some(Arc::new(e)),
                })
            }
        }
    }
}

impl fmt::Debug for MetaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaCache").field("keys", &self.keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryBackend;
    use std::time::Duration;

    async fn seeded(keys: &[&str]) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        for key in keys {
            backend
                .set(key, b"1".to_vec(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn add_keys_does_no_io_until_commit() {
        let backend = seeded(&["a", "b"]).await;
        let mut meta = MetaCache::new(backend.clone(), Vec::<String>::new());

        meta.add_keys(["a", "b", "a"]);
        assert_eq!(meta.pending_keys(), vec!["a", "b"]);
        assert!(backend.contains("a"));

        meta.commit().await.unwrap();
        assert!(meta.is_empty());
        assert!(!backend.contains("a"));
        assert!(!backend.contains("b"));
    }

    #[tokio::test]
    async fn partial_failure_keeps_unresolved_keys_for_retry() {
        let backend = seeded(&["a", "b"]).await;
        backend.stick_keys(["b"]);
        let mut meta = MetaCache::new(backend.clone(), ["a", "b"]);

        let err = meta.commit().await.unwrap_err();
        assert!(matches!(err, CacheError::Invalidation { ref unresolved, .. } if unresolved == &["b"]));
        assert_eq!(meta.pending_keys(), vec!["b"]);

        backend.unstick_all();
        meta.commit().await.unwrap();
        assert!(!backend.contains("b"));
        assert!(meta.is_empty());
    }

    #[tokio::test]
    async fn backend_outage_keeps_every_key() {
        let backend = seeded(&["a"]).await;
        backend.set_offline(true);
        let mut meta = MetaCache::new(backend.clone(), ["a", "b"]);

        let err = meta.commit().await.unwrap_err();
        match err {
            CacheError::Invalidation { unresolved, cause } => {
                assert_eq!(unresolved.len(), 2);
                let cause = cause.expect("outage should keep its cause");
                assert!(matches!(*cause, CacheError::BackendUnavailable(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(meta.pending_keys().len(), 2);

        backend.set_offline(false);
        meta.commit().await.unwrap();
        assert!(!backend.contains("a"));
    }
}
