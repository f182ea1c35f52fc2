// 存储接口
// 缓存未命中时调用的群组与群组成员存储操作

use async_trait::async_trait;

use crate::database::models::group::{GroupEntity, GroupMemberEntity, GroupUpdate};
use crate::error::CacheResult;

/// 群组存储
#[async_trait]
pub trait GroupModel: Send + Sync {
    /// 根据ID获取群组，不存在时返回 `CacheError::NotFound`
    async fn take(&self, group_id: &str) -> CacheResult<GroupEntity>;

    /// 在同一个事务中创建群组和初始成员
    async fn create(&self, group: &GroupEntity, members: &[GroupMemberEntity]) -> CacheResult<()>;

    async fn update(&self, group_id: &str, update: &GroupUpdate) -> CacheResult<()>;

    async fn update_status(&self, group_id: &str, status: i32) -> CacheResult<()>;
}

/// 群组成员存储
#[async_trait]
pub trait GroupMemberModel: Send + Sync {
    /// 群组成员ID，按加入时间排序
    async fn find_member_user_ids(&self, group_id: &str) -> CacheResult<Vec<String>>;

    /// 用户已加入的群组ID
    async fn find_user_joined_group_ids(&self, user_id: &str) -> CacheResult<Vec<String>>;

    async fn take(&self, group_id: &str, user_id: &str) -> CacheResult<GroupMemberEntity>;

    async fn take_group_member_num(&self, group_id: &str) -> CacheResult<i64>;

    async fn create(&self, members: &[GroupMemberEntity]) -> CacheResult<()>;

    async fn delete(&self, group_id: &str, user_ids: &[String]) -> CacheResult<()>;

    async fn update_role_level(
        &self,
        group_id: &str,
        user_id: &str,
        role_level: i32,
    ) -> CacheResult<()>;
}
