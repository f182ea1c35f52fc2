use std::env;
use std::time::Duration;

/// 群组缓存默认过期时间（秒）：12小时
pub const DEFAULT_GROUP_CACHE_EXPIRE_SECS: u64 = 60 * 60 * 12;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub group_cache_expire_secs: u64,
    pub lock_expire_ms: u64,
    pub lock_wait_ms: u64,
    pub lock_retry_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            group_cache_expire_secs: parse_or("GROUP_CACHE_EXPIRE", DEFAULT_GROUP_CACHE_EXPIRE_SECS),
            lock_expire_ms: parse_or("CACHE_LOCK_EXPIRE_MS", 10_000),
            lock_wait_ms: parse_or("CACHE_LOCK_WAIT_MS", 15_000),
            lock_retry_ms: parse_or("CACHE_LOCK_RETRY_MS", 50),
        })
    }

    pub fn group_cache_expire(&self) -> Duration {
        Duration::from_secs(self.group_cache_expire_secs)
    }

    /// 键锁的持有上限，持有者崩溃后锁自动过期
    pub fn lock_expire(&self) -> Duration {
        Duration::from_millis(self.lock_expire_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms)
    }
}

// 可选变量缺失或无法解析时使用默认值
fn parse_or(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
