// 内存存储
// 实现与 PostgreSQL 存储相同的接口，用于测试和本地运行

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::database::models::group::{GroupEntity, GroupMemberEntity, GroupUpdate};
use crate::database::operations::interface::{GroupMemberModel, GroupModel};
use crate::error::{CacheError, CacheResult};

/// 内存群组存储，同时实现群组和群组成员接口
#[derive(Default)]
pub struct MemoryGroupStore {
    groups: DashMap<String, GroupEntity>,
    // 按加入顺序保存
    members: DashMap<String, Vec<GroupMemberEntity>>,
    calls: DashMap<&'static str, usize>,
    failing: AtomicBool,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入群组，不经过缓存失效流程
    pub fn put_group(&self, group: GroupEntity) {
        self.groups.insert(group.group_id.clone(), group);
    }

    /// 直接写入成员，已存在则整体替换
    pub fn put_member(&self, member: GroupMemberEntity) {
        let mut list = self.members.entry(member.group_id.clone()).or_default();
        match list.iter_mut().find(|m| m.user_id == member.user_id) {
            Some(existing) => *existing = member,
            None => list.push(member),
        }
    }

    pub fn remove_member(&self, group_id: &str, user_id: &str) {
        if let Some(mut list) = self.members.get_mut(group_id) {
            list.retain(|m| m.user_id != user_id);
        }
    }

    /// 某个读操作被调用的次数
    pub fn call_count(&self, op: &str) -> usize {
        self.calls.get(op).map(|c| *c).unwrap_or(0)
    }

    /// 打开后所有读操作都返回加载失败
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, op: &'static str) -> CacheResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::loader(format!("{} failed: store offline", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl GroupModel for MemoryGroupStore {
    async fn take(&self, group_id: &str) -> CacheResult<GroupEntity> {
        self.record("take_group")?;
        self.groups
            .get(group_id)
            .map(|g| g.clone())
            .ok_or(CacheError::NotFound)
    }

    async fn create(&self, group: &GroupEntity, members: &[GroupMemberEntity]) -> CacheResult<()> {
        self.put_group(group.clone());
        for member in members {
            self.put_member(member.clone());
        }
        Ok(())
    }

    async fn update(&self, group_id: &str, update: &GroupUpdate) -> CacheResult<()> {
        let mut group = self.groups.get_mut(group_id).ok_or(CacheError::NotFound)?;
        update.apply(&mut group);
        Ok(())
    }

    async fn update_status(&self, group_id: &str, status: i32) -> CacheResult<()> {
        let mut group = self.groups.get_mut(group_id).ok_or(CacheError::NotFound)?;
        group.status = status;
        Ok(())
    }
}

#[async_trait]
impl GroupMemberModel for MemoryGroupStore {
    async fn find_member_user_ids(&self, group_id: &str) -> CacheResult<Vec<String>> {
        self.record("find_member_user_ids")?;
        Ok(self
            .members
            .get(group_id)
            .map(|list| list.iter().map(|m| m.user_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn find_user_joined_group_ids(&self, user_id: &str) -> CacheResult<Vec<String>> {
        self.record("find_user_joined_group_ids")?;
        let mut joined: Vec<_> = self
            .members
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .iter()
                    .find(|m| m.user_id == user_id)
                    .map(|m| (m.joined_at, m.group_id.clone()))
            })
            .collect();
        joined.sort();
        Ok(joined.into_iter().map(|(_, group_id)| group_id).collect())
    }

    async fn take(&self, group_id: &str, user_id: &str) -> CacheResult<GroupMemberEntity> {
        self.record("take_member")?;
        self.members
            .get(group_id)
            .and_then(|list| list.iter().find(|m| m.user_id == user_id).cloned())
            .ok_or(CacheError::NotFound)
    }

    async fn take_group_member_num(&self, group_id: &str) -> CacheResult<i64> {
        self.record("take_group_member_num")?;
        Ok(self
            .members
            .get(group_id)
            .map(|list| list.len() as i64)
            .unwrap_or(0))
    }

    async fn create(&self, members: &[GroupMemberEntity]) -> CacheResult<()> {
        for member in members {
            self.put_member(member.clone());
        }
        Ok(())
    }

    async fn delete(&self, group_id: &str, user_ids: &[String]) -> CacheResult<()> {
        if let Some(mut list) = self.members.get_mut(group_id) {
            list.retain(|m| !user_ids.contains(&m.user_id));
        }
        Ok(())
    }

    async fn update_role_level(
        &self,
        group_id: &str,
        user_id: &str,
        role_level: i32,
    ) -> CacheResult<()> {
        let mut list = self.members.get_mut(group_id).ok_or(CacheError::NotFound)?;
        let member = list
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or(CacheError::NotFound)?;
        member.role_level = role_level;
        Ok(())
    }
}
