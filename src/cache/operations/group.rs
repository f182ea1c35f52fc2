use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::backend::CacheBackend;
use crate::cache::keys::{
    group_info_key, group_member_ids_key, group_member_info_key, group_member_num_key,
    group_members_hash_key, joined_groups_key,
};
use crate::cache::models::GroupSimpleUserId;
use crate::cache::operations::loader::{batch_get_cache, get_cache};
use crate::cache::operations::meta::MetaCache;
use crate::config::DEFAULT_GROUP_CACHE_EXPIRE_SECS;
use crate::database::models::group::{GroupEntity, GroupMemberEntity};
use crate::database::operations::interface::{GroupMemberModel, GroupModel};
use crate::error::{CacheError, CacheResult};
use crate::utils::{HashCodeFn, paginate};

/// 群组缓存的默认过期时间
pub const GROUP_CACHE_EXPIRE: Duration = Duration::from_secs(DEFAULT_GROUP_CACHE_EXPIRE_SECS);

/// 群组缓存操作
///
/// 读操作走读穿透缓存，未命中时从存储加载。`del_*` 不直接删除缓存，
/// 而是返回一个携带待删除键的新实例，由调用方在写入持久化后 `commit`：
///
/// ```ignore
/// group_db.delete(group_id, &user_ids).await?;
/// cache
///     .del_group_membership(group_id, &user_ids)
///     .del_groups_info([group_id])
///     .commit()
///     .await?;
/// ```
#[derive(Clone)]
pub struct GroupCache {
    meta: MetaCache,
    group_db: Arc<dyn GroupModel>,
    member_db: Arc<dyn GroupMemberModel>,
    hash_code: HashCodeFn,
    expire: Duration,
}

impl GroupCache {
    /// 创建新的群组缓存实例
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        group_db: Arc<dyn GroupModel>,
        member_db: Arc<dyn GroupMemberModel>,
        hash_code: HashCodeFn,
        expire: Duration,
    ) -> Self {
        Self {
            meta: MetaCache::new(backend, Vec::<String>::new()),
            group_db,
            member_db,
            hash_code,
            expire,
        }
    }

    /// 复制当前待删除的键到一个新实例
    pub fn new_cache(&self) -> Self {
        Self {
            meta: MetaCache::new(self.meta.backend().clone(), self.meta.pending_keys()),
            group_db: self.group_db.clone(),
            member_db: self.member_db.clone(),
            hash_code: self.hash_code.clone(),
            expire: self.expire,
        }
    }

    pub fn add_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.add_keys(keys);
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.meta.pending_keys()
    }

    /// 批量删除所有待删除的键，应在对应的写入持久化之后调用
    pub async fn commit(&mut self) -> CacheResult<()> {
        self.meta.commit().await
    }

    fn backend(&self) -> &dyn CacheBackend {
        self.meta.backend().as_ref()
    }

    fn with_keys<I>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut cache = self.new_cache();
        cache.add_keys(keys);
        cache
    }

    /// 群组在批量键列表中的位置
    pub fn get_group_index(group: &GroupEntity, keys: &[String]) -> CacheResult<usize> {
        let key = group_info_key(&group.group_id);
        keys.iter()
            .position(|k| *k == key)
            .ok_or(CacheError::NotIndexed)
    }

    /// 群组成员在批量键列表中的位置
    pub fn get_group_member_index(
        member: &GroupMemberEntity,
        keys: &[String],
    ) -> CacheResult<usize> {
        let key = group_member_info_key(&member.group_id, &member.user_id);
        keys.iter()
            .position(|k| *k == key)
            .ok_or(CacheError::NotIndexed)
    }

    // 群组信息

    pub async fn get_groups_info(&self, group_ids: &[String]) -> CacheResult<Vec<GroupEntity>> {
        batch_get_cache(
            self.backend(),
            self.expire,
            group_ids,
            |group_id| group_info_key(group_id),
            |group_id| self.group_db.take(group_id),
        )
        .await
    }

    pub async fn get_group_info(&self, group_id: &str) -> CacheResult<GroupEntity> {
        let key = group_info_key(group_id);
        get_cache(self.backend(), &key, self.expire, || {
            self.group_db.take(group_id)
        })
        .await
    }

    pub fn del_groups_info<I, S>(&self, group_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_keys(group_ids.into_iter().map(|id| group_info_key(id.as_ref())))
    }

    // 群组成员哈希

    pub async fn get_group_members_hash(&self, group_id: &str) -> CacheResult<u64> {
        let key = group_members_hash_key(group_id);
        get_cache(self.backend(), &key, self.expire, || {
            (self.hash_code)(group_id.to_string())
        })
        .await
    }

    /// 每个群组的成员哈希和成员数，任意一个群组失败则整体失败
    pub async fn get_group_member_hash_map(
        &self,
        group_ids: &[String],
    ) -> CacheResult<HashMap<String, GroupSimpleUserId>> {
        let mut res = HashMap::with_capacity(group_ids.len());
        for group_id in group_ids {
            let hash = self.get_group_members_hash(group_id).await?;
            tracing::info!(group_id = %group_id, hash, "get group member hash map");
            let num = self.get_group_member_num(group_id).await?;
            res.insert(
                group_id.clone(),
                GroupSimpleUserId {
                    hash,
                    member_num: num as u32,
                },
            );
        }

        Ok(res)
    }

    pub fn del_group_members_hash(&self, group_id: &str) -> Self {
        self.with_keys([group_members_hash_key(group_id)])
    }

    // 群组成员ID

    pub async fn get_group_member_ids(&self, group_id: &str) -> CacheResult<Vec<String>> {
        let key = group_member_ids_key(group_id);
        get_cache(self.backend(), &key, self.expire, || {
            self.member_db.find_member_user_ids(group_id)
        })
        .await
    }

    pub async fn get_groups_member_ids(
        &self,
        group_ids: &[String],
    ) -> CacheResult<HashMap<String, Vec<String>>> {
        let mut m = HashMap::with_capacity(group_ids.len());
        for group_id in group_ids {
            let user_ids = self.get_group_member_ids(group_id).await?;
            m.insert(group_id.clone(), user_ids);
        }

        Ok(m)
    }

    pub fn del_group_member_ids(&self, group_id: &str) -> Self {
        self.with_keys([group_member_ids_key(group_id)])
    }

    // 用户已加入的群组

    pub async fn get_joined_group_ids(&self, user_id: &str) -> CacheResult<Vec<String>> {
        let key = joined_groups_key(user_id);
        get_cache(self.backend(), &key, self.expire, || {
            self.member_db.find_user_joined_group_ids(user_id)
        })
        .await
    }

    pub fn del_joined_group_id<I, S>(&self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_keys(user_ids.into_iter().map(|id| joined_groups_key(id.as_ref())))
    }

    // 群组成员信息

    pub async fn get_group_member_info(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> CacheResult<GroupMemberEntity> {
        let key = group_member_info_key(group_id, user_id);
        get_cache(self.backend(), &key, self.expire, || {
            self.member_db.take(group_id, user_id)
        })
        .await
    }

    /// 批量获取成员信息，已离开群组的成员不会出现在结果中
    pub async fn get_group_members_info(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> CacheResult<Vec<GroupMemberEntity>> {
        batch_get_cache(
            self.backend(),
            self.expire,
            user_ids,
            |user_id| group_member_info_key(group_id, user_id),
            |user_id| self.member_db.take(group_id, user_id),
        )
        .await
    }

    pub async fn get_all_group_members_info(
        &self,
        group_id: &str,
    ) -> CacheResult<Vec<GroupMemberEntity>> {
        let member_ids = self.get_group_member_ids(group_id).await?;
        self.get_group_members_info(group_id, &member_ids).await
    }

    /// 分页获取成员信息
    ///
    /// `user_ids` 不为空时只保留同时在群内的成员，顺序与缓存的成员列表一致。
    /// 返回分页前的总数和当前页的成员；页码从 1 开始。
    pub async fn get_group_members_page(
        &self,
        group_id: &str,
        user_ids: Option<&[String]>,
        show_number: i32,
        page_number: i32,
    ) -> CacheResult<(u32, Vec<GroupMemberEntity>)> {
        let member_ids = self.get_group_member_ids(group_id).await?;
        let candidates: Vec<String> = match user_ids {
            Some(user_ids) => {
                let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
                member_ids
                    .into_iter()
                    .filter(|id| wanted.contains(id.as_str()))
                    .collect()
            }
            None => member_ids,
        };

        if candidates.is_empty() {
            return Ok((0, Vec::new()));
        }

        let page = paginate(&candidates, page_number, show_number);
        let members = self.get_group_members_info(group_id, page).await?;
        Ok((candidates.len() as u32, members))
    }

    pub fn del_group_members_info<I, S>(&self, group_id: &str, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_keys(
            user_ids
                .into_iter()
                .map(|id| group_member_info_key(group_id, id.as_ref())),
        )
    }

    // 群组成员数

    pub async fn get_group_member_num(&self, group_id: &str) -> CacheResult<i64> {
        let key = group_member_num_key(group_id);
        get_cache(self.backend(), &key, self.expire, || {
            self.member_db.take_group_member_num(group_id)
        })
        .await
    }

    pub fn del_groups_member_num<I, S>(&self, group_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_keys(group_ids.into_iter().map(|id| group_member_num_key(id.as_ref())))
    }

    /// 成员变动时需要一起失效的所有键
    ///
    /// 成员ID列表、成员哈希、成员数，以及每个变动成员的成员信息和已加入群组列表。
    pub fn del_group_membership<S: AsRef<str>>(&self, group_id: &str, user_ids: &[S]) -> Self {
        self.del_group_member_ids(group_id)
            .del_group_members_hash(group_id)
            .del_groups_member_num([group_id])
            .del_group_members_info(group_id, user_ids)
            .del_joined_group_id(user_ids)
    }
}
