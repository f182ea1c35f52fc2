// 缓存层错误定义
// 所有缓存与存储操作统一返回 CacheError

use std::sync::Arc;

/// 缓存操作结果
pub type CacheResult<T> = Result<T, CacheError>;

/// 缓存层错误
///
/// 必须可克隆：同一个键的加载结果（包括失败）会被分发给所有等待者。
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// 存储中没有对应记录，不会写入缓存
    #[error("record not found")]
    NotFound,

    /// 缓存后端 I/O 失败
    #[error("cache backend unavailable: {0}")]
    BackendUnavailable(#[source] Arc<redis::RedisError>),

    /// 数据库加载失败
    #[error("database error: {0}")]
    Database(#[source] Arc<sqlx::Error>),

    /// 其他加载函数失败
    #[error("loader failed: {0}")]
    Loader(String),

    /// 批量删除后仍未确认删除的键，调用方可以重试提交
    ///
    /// 后端整体失败时 `cause` 保存原始错误；只有部分键未确认时为 None。
    #[error("failed to invalidate {} cache keys", .unresolved.len())]
    Invalidation {
        unresolved: Vec<String>,
        #[source]
        cause: Option<Arc<CacheError>>,
    },

    /// 在批量结果的键列表中找不到对应条目
    #[error("item is not indexed in the batch result")]
    NotIndexed,

    /// 缓存值编解码失败
    #[error("cache value encoding failed: {0}")]
    Serialization(#[source] Arc<serde_json::Error>),

    /// 等待键锁超时
    #[error("timed out waiting for cache lock on {key}")]
    LockTimeout { key: String },
}

impl CacheError {
    /// 用于模拟或包装任意加载错误
    pub fn loader(message: impl Into<String>) -> Self {
        CacheError::Loader(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }

    /// 部分键未确认删除，不附带后端错误
    pub fn unresolved(unresolved: Vec<String>) -> Self {
        CacheError::Invalidation {
            unresolved,
            cause: None,
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::BackendUnavailable(Arc::new(err))
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CacheError::NotFound,
            other => CacheError::Database(Arc::new(other)),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(Arc::new(err))
    }
}
