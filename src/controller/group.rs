// 群组数据库控制器
// 每个写操作先落存储，成功后再提交对应的缓存失效

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::models::GroupSimpleUserId;
use crate::cache::operations::GroupCache;
use crate::database::models::group::{
    GROUP_STATUS_DISMISSED, GroupEntity, GroupMemberEntity, GroupUpdate,
};
use crate::database::operations::interface::{GroupMemberModel, GroupModel};
use crate::error::CacheResult;

#[derive(Clone)]
pub struct GroupDatabase {
    group_db: Arc<dyn GroupModel>,
    member_db: Arc<dyn GroupMemberModel>,
    cache: GroupCache,
}

impl GroupDatabase {
    pub fn new(
        group_db: Arc<dyn GroupModel>,
        member_db: Arc<dyn GroupMemberModel>,
        cache: GroupCache,
    ) -> Self {
        Self {
            group_db,
            member_db,
            cache,
        }
    }

    pub fn cache(&self) -> &GroupCache {
        &self.cache
    }

    /// 创建群组及初始成员
    pub async fn create_group(
        &self,
        group: &GroupEntity,
        members: &[GroupMemberEntity],
    ) -> CacheResult<()> {
        self.group_db.create(group, members).await?;

        let user_ids: Vec<&str> = members.iter().map(|m| m.user_id.as_str()).collect();
        let mut cache = self
            .cache
            .del_groups_info([&group.group_id])
            .del_group_membership(&group.group_id, &user_ids);
        cache.commit().await?;

        tracing::info!(
            "群组 {} 创建成功，初始成员 {} 人",
            group.group_id,
            members.len()
        );
        Ok(())
    }

    pub async fn take_group(&self, group_id: &str) -> CacheResult<GroupEntity> {
        self.cache.get_group_info(group_id).await
    }

    pub async fn find_groups(&self, group_ids: &[String]) -> CacheResult<Vec<GroupEntity>> {
        self.cache.get_groups_info(group_ids).await
    }

    pub async fn find_group_member(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> CacheResult<GroupMemberEntity> {
        self.cache.get_group_member_info(group_id, user_id).await
    }

    /// 分页获取群组成员，页码从 1 开始
    pub async fn page_group_members(
        &self,
        group_id: &str,
        show_number: i32,
        page_number: i32,
    ) -> CacheResult<(u32, Vec<GroupMemberEntity>)> {
        self.cache
            .get_group_members_page(group_id, None, show_number, page_number)
            .await
    }

    pub async fn find_group_member_user_ids(&self, group_id: &str) -> CacheResult<Vec<String>> {
        self.cache.get_group_member_ids(group_id).await
    }

    pub async fn find_joined_group_ids(&self, user_id: &str) -> CacheResult<Vec<String>> {
        self.cache.get_joined_group_ids(user_id).await
    }

    pub async fn group_member_hash_map(
        &self,
        group_ids: &[String],
    ) -> CacheResult<HashMap<String, GroupSimpleUserId>> {
        self.cache.get_group_member_hash_map(group_ids).await
    }

    /// 更新群组资料，没有任何字段需要修改时直接返回
    pub async fn update_group(&self, group_id: &str, update: &GroupUpdate) -> CacheResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        self.group_db.update(group_id, update).await?;
        self.cache.del_groups_info([group_id]).commit().await
    }

    /// 加入群组，成员可以属于不同的群组
    pub async fn join_group(&self, members: &[GroupMemberEntity]) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }

        self.member_db.create(members).await?;

        let mut cache = self.cache.new_cache();
        for member in members {
            cache = cache.del_group_membership(&member.group_id, &[&member.user_id]);
        }
        cache.commit().await
    }

    pub async fn delete_group_members(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> CacheResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }

        self.member_db.delete(group_id, user_ids).await?;
        self.cache
            .del_group_membership(group_id, user_ids)
            .commit()
            .await
    }

    pub async fn update_group_member_role(
        &self,
        group_id: &str,
        user_id: &str,
        role_level: i32,
    ) -> CacheResult<()> {
        self.member_db
            .update_role_level(group_id, user_id, role_level)
            .await?;
        self.cache
            .del_group_members_info(group_id, [user_id])
            .commit()
            .await
    }

    /// 解散群组，移除全部成员
    pub async fn dismiss_group(&self, group_id: &str) -> CacheResult<()> {
        // 直接读存储，缓存中的成员列表可能已经过期
        let user_ids = self.member_db.find_member_user_ids(group_id).await?;

        self.group_db
            .update_status(group_id, GROUP_STATUS_DISMISSED)
            .await?;
        // 状态已经落库，成员删除失败也不能留下旧的群组信息
        self.cache.del_groups_info([group_id]).commit().await?;

        if !user_ids.is_empty() {
            self.member_db.delete(group_id, &user_ids).await?;
        }
        self.cache
            .del_group_membership(group_id, &user_ids)
            .commit()
            .await?;

        tracing::info!("群组 {} 已解散，移除成员 {} 人", group_id, user_ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::cache::backend::MemoryBackend;
    use crate::cache::operations::group::GROUP_CACHE_EXPIRE;
    use crate::database::models::group::{GROUP_STATUS_OK, role_level};
    use crate::database::operations::memory::MemoryGroupStore;
    use crate::error::CacheError;
    use crate::utils::hash_code_from_store;

    fn setup() -> (Arc<MemoryBackend>, Arc<MemoryGroupStore>, GroupDatabase) {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(MemoryGroupStore::new());
        let cache = GroupCache::new(
            backend.clone(),
            store.clone(),
            store.clone(),
            hash_code_from_store(store.clone()),
            GROUP_CACHE_EXPIRE,
        );
        let db = GroupDatabase::new(store.clone(), store.clone(), cache);
        (backend, store, db)
    }

    // 成员删除总是失败的存储
    struct RejectingDelete(Arc<MemoryGroupStore>);

    #[async_trait]
    impl GroupMemberModel for RejectingDelete {
        async fn find_member_user_ids(&self, group_id: &str) -> CacheResult<Vec<String>> {
            GroupMemberModel::find_member_user_ids(&*self.0, group_id).await
        }

        async fn find_user_joined_group_ids(&self, user_id: &str) -> CacheResult<Vec<String>> {
            GroupMemberModel::find_user_joined_group_ids(&*self.0, user_id).await
        }

        async fn take(&self, group_id: &str, user_id: &str) -> CacheResult<GroupMemberEntity> {
            GroupMemberModel::take(&*self.0, group_id, user_id).await
        }

        async fn take_group_member_num(&self, group_id: &str) -> CacheResult<i64> {
            GroupMemberModel::take_group_member_num(&*self.0, group_id).await
        }

        async fn create(&self, members: &[GroupMemberEntity]) -> CacheResult<()> {
            GroupMemberModel::create(&*self.0, members).await
        }

        async fn delete(&self, _group_id: &str, _user_ids: &[String]) -> CacheResult<()> {
            Err(CacheError::loader("member delete rejected"))
        }

        async fn update_role_level(
            &self,
            group_id: &str,
            user_id: &str,
            role_level: i32,
        ) -> CacheResult<()> {
            GroupMemberModel::update_role_level(&*self.0, group_id, user_id, role_level).await
        }
    }

    #[tokio::test]
    async fn failed_member_delete_still_refreshes_group_status() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(MemoryGroupStore::new());
        let members: Arc<dyn GroupMemberModel> = Arc::new(RejectingDelete(store.clone()));
        let cache = GroupCache::new(
            backend.clone(),
            store.clone(),
            members.clone(),
            hash_code_from_store(members.clone()),
            GROUP_CACHE_EXPIRE,
        );
        let db = GroupDatabase::new(store.clone(), members, cache);
        db.create_group(
            &GroupEntity::new("g1", "chat", "u1"),
            &[GroupMemberEntity::new("g1", "u1", role_level::OWNER)],
        )
        .await
        .unwrap();
        assert_eq!(db.take_group("g1").await.unwrap().status, GROUP_STATUS_OK);

        let err = db.dismiss_group("g1").await.unwrap_err();
        assert!(matches!(err, CacheError::Loader(_)));

        assert_eq!(
            GroupModel::take(&*store, "g1").await.unwrap().status,
            GROUP_STATUS_DISMISSED
        );
        assert_eq!(
            db.take_group("g1").await.unwrap().status,
            GROUP_STATUS_DISMISSED
        );
    }

    #[tokio::test]
    async fn role_change_reloads_member() {
        let (_, _, db) = setup();
        let group = GroupEntity::new("g1", "chat", "u1");
        db.create_group(&group, &[GroupMemberEntity::new("g1", "u2", role_level::ORDINARY)])
            .await
            .unwrap();

        let before = db.find_group_member("g1", "u2").await.unwrap();
        assert_eq!(before.role_level, role_level::ORDINARY);

        db.update_group_member_role("g1", "u2", role_level::ADMIN)
            .await
            .unwrap();
        let after = db.find_group_member("g1", "u2").await.unwrap();
        assert_eq!(after.role_level, role_level::ADMIN);
    }

    #[tokio::test]
    async fn failed_invalidation_surfaces_after_write() {
        let (backend, store, db) = setup();
        store.put_group(GroupEntity::new("g1", "chat", "u1"));
        db.take_group("g1").await.unwrap();

        backend.stick_keys(["GROUP_INFO:g1"]);
        let update = GroupUpdate {
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        let err = db.update_group("g1", &update).await.unwrap_err();

        assert!(matches!(err, CacheError::Invalidation { ref unresolved, .. } if unresolved == &["GROUP_INFO:g1"]));
        assert_eq!(GroupModel::take(&*store, "g1").await.unwrap().name, "renamed");
    }
}
