/// 缓存键模块
/// 提供各种缓存键生成函数

// 群组缓存键模块
pub mod group_keys;

// 重新导出常用的键生成函数
pub use group_keys::{
    group_info_key, group_member_ids_key, group_member_info_key, group_member_num_key,
    group_members_hash_key, joined_groups_key, lock_key,
};
