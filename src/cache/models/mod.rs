/// 缓存数据模型
/// 定义缓存数据的结构体

// 群组缓存模型
pub mod group;

// 重新导出常用类型
pub use group::GroupSimpleUserId;
