/// 存储写入与缓存失效的组合操作
pub mod group;

pub use group::GroupDatabase;
