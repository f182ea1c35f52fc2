// 读穿透缓存
// 单键与批量的获取或加载，未命中时每个键只有一个加载者

use futures_util::FutureExt;
use futures_util::future::try_join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use crate::cache::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};

/// 获取缓存值，未命中时调用 `load` 并写入缓存
///
/// 值只有在加载成功并编码完成后才会写入；加载失败原样返回给调用方。
pub async fn get_cache<'a, T, F, Fut>(
    backend: &'a dyn CacheBackend,
    key: &'a str,
    ttl: Duration,
    load: F,
) -> CacheResult<T>
where
    T: Serialize + DeserializeOwned + Send + 'a,
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = CacheResult<T>> + Send + 'a,
{
    let fetch = async move {
        tracing::debug!(key, "loading cache value from store");
        let value = load().await?;
        Ok::<_, CacheError>(serde_json::to_vec(&value)?)
    }
    .boxed();

    let bytes = backend.fetch_locked(key, ttl, fetch).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// 批量获取缓存值
///
/// 先一次性读取所有键，只对未命中的键走 [`get_cache`]。
/// 结果保持 `ids` 的顺序；存储中不存在的记录直接跳过，其他加载错误使整个调用失败。
pub async fn batch_get_cache<'a, T, I, K, F, Fut>(
    backend: &'a dyn CacheBackend,
    ttl: Duration,
    ids: &'a [I],
    key_of: K,
    load: F,
) -> CacheResult<Vec<T>>
where
    T: Serialize + DeserializeOwned + Send + 'a,
    I: Sync + 'a,
    K: Fn(&I) -> String,
    F: Fn(&'a I) -> Fut,
    Fut: Future<Output = CacheResult<T>> + Send + 'a,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let keys: Vec<String> = ids.iter().map(&key_of).collect();
    let cached = backend.get_many(&keys).await?;

    let mut slots: Vec<Option<T>> = Vec::with_capacity(ids.len());
    let mut misses = Vec::new();
    for (index, (id, hit)) in ids.iter().zip(cached).enumerate() {
        match hit {
            Some(bytes) => slots.push(Some(serde_json::from_slice(&bytes)?)),
            None => {
                slots.push(None);
                misses.push((index, id));
            }
        }
    }

    if !misses.is_empty() {
        tracing::debug!(total = ids.len(), misses = misses.len(), "batch cache misses");
    }

    let keys = &keys;
    let loads = misses.into_iter().map(|(index, id)| {
        let pending = load(id);
        async move {
            match get_cache(backend, &keys[index], ttl, move || pending).await {
                Ok(value) => Ok((index, Some(value))),
                Err(CacheError::NotFound) => Ok((index, None)),
                Err(e) => Err(e),
            }
        }
    });

    for (index, value) in try_join_all(loads).await? {
        slots[index] = value;
    }

    Ok(slots.into_iter().flatten().collect())
}
