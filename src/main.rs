use std::sync::Arc;

use group_cache::{
    GroupCache, RedisBackend, cache::LockOptions, config::Config,
    database::GroupOperation, utils::hash_code_from_store,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    let group_ids: Vec<String> = std::env::args().skip(1).collect();
    if group_ids.is_empty() {
        eprintln!("usage: group-cache <group_id>...");
        std::process::exit(2);
    }

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'group_cache';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let backend = Arc::new(RedisBackend::new(
        Arc::new(redis_client),
        LockOptions::from(&config),
    ));

    let store = Arc::new(GroupOperation::new(Arc::new(pool)));
    let cache = GroupCache::new(
        backend,
        store.clone(),
        store.clone(),
        hash_code_from_store(store),
        config.group_cache_expire(),
    );

    match cache.get_group_member_hash_map(&group_ids).await {
        Ok(hash_map) => match serde_json::to_string_pretty(&hash_map) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                tracing::error!("序列化结果失败: {}", err);
                std::process::exit(1);
            }
        },
        Err(err) => {
            tracing::error!("获取群组成员哈希失败: {}", err);
            std::process::exit(1);
        }
    }
}
