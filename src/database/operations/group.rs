// 群组存储库
// 基于 PostgreSQL 的群组与群组成员存储

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use crate::database::models::group::{GroupEntity, GroupMemberEntity, GroupUpdate};
use crate::database::operations::interface::{GroupMemberModel, GroupModel};
use crate::error::{CacheError, CacheResult};

const GROUP_COLUMNS: &str = r#"
    group_id, name, notification, introduction, face_url,
    creator_id, status, created_at
"#;

const MEMBER_COLUMNS: &str = r#"
    group_id, user_id, nickname, face_url, role_level,
    joined_at, inviter_id, mute_end_time
"#;

/// 群组存储库，处理所有与群组相关的数据库操作
#[derive(Clone)]
pub struct GroupOperation {
    db: Arc<PgPool>,
}

impl GroupOperation {
    /// 创建新的群组存储库实例
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GroupModel for GroupOperation {
    /// 根据ID查找群组
    async fn take(&self, group_id: &str) -> CacheResult<GroupEntity> {
        let sql = format!("SELECT {} FROM groups WHERE group_id = $1", GROUP_COLUMNS);
        let group = sqlx::query_as::<_, GroupEntity>(&sql)
            .bind(group_id)
            .fetch_optional(&*self.db)
            .await?;

        group.ok_or(CacheError::NotFound)
    }

    /// 创建群组
    async fn create(&self, group: &GroupEntity, members: &[GroupMemberEntity]) -> CacheResult<()> {
        let mut tx = self.db.begin().await?;

        // 创建群组记录
        sqlx::query(
            r#"
            INSERT INTO groups (
                group_id, name, notification, introduction, face_url,
                creator_id, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&group.group_id)
        .bind(&group.name)
        .bind(&group.notification)
        .bind(&group.introduction)
        .bind(&group.face_url)
        .bind(&group.creator_id)
        .bind(group.status)
        .bind(group.created_at)
        .execute(&mut *tx)
        .await?;

        // 初始成员加入群组
        for member in members {
            insert_member(&mut tx, member).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// 更新群组资料
    async fn update(&self, group_id: &str, update: &GroupUpdate) -> CacheResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE groups
            SET name = COALESCE($2, name),
                notification = COALESCE($3, notification),
                introduction = COALESCE($4, introduction),
                face_url = COALESCE($5, face_url)
            WHERE group_id = $1
            "#,
        )
        .bind(group_id)
        .bind(&update.name)
        .bind(&update.notification)
        .bind(&update.introduction)
        .bind(&update.face_url)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CacheError::NotFound);
        }
        Ok(())
    }

    async fn update_status(&self, group_id: &str, status: i32) -> CacheResult<()> {
        let result = sqlx::query("UPDATE groups SET status = $2 WHERE group_id = $1")
            .bind(group_id)
            .bind(status)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CacheError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl GroupMemberModel for GroupOperation {
    /// 获取群组成员ID列表
    async fn find_member_user_ids(&self, group_id: &str) -> CacheResult<Vec<String>> {
        let user_ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT user_id FROM group_members
            WHERE group_id = $1
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(group_id)
        .fetch_all(&*self.db)
        .await?;

        Ok(user_ids)
    }

    /// 获取用户加入的所有群组
    async fn find_user_joined_group_ids(&self, user_id: &str) -> CacheResult<Vec<String>> {
        let group_ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT group_id FROM group_members
            WHERE user_id = $1
            ORDER BY joined_at, group_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.db)
        .await?;

        Ok(group_ids)
    }

    async fn take(&self, group_id: &str, user_id: &str) -> CacheResult<GroupMemberEntity> {
        let sql = format!(
            "SELECT {} FROM group_members WHERE group_id = $1 AND user_id = $2",
            MEMBER_COLUMNS
        );
        let member = sqlx::query_as::<_, GroupMemberEntity>(&sql)
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(&*self.db)
            .await?;

        member.ok_or(CacheError::NotFound)
    }

    /// 获取群组成员数量
    async fn take_group_member_num(&self, group_id: &str) -> CacheResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM group_members WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_one(&*self.db)
        .await?;

        Ok(count)
    }

    async fn create(&self, members: &[GroupMemberEntity]) -> CacheResult<()> {
        let mut tx = self.db.begin().await?;
        for member in members {
            insert_member(&mut tx, member).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// 移除群组成员
    async fn delete(&self, group_id: &str, user_ids: &[String]) -> CacheResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = ANY($2)")
            .bind(group_id)
            .bind(user_ids)
            .execute(&*self.db)
            .await?;

        Ok(())
    }

    /// 更新成员角色
    async fn update_role_level(
        &self,
        group_id: &str,
        user_id: &str,
        role_level: i32,
    ) -> CacheResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE group_members
            SET role_level = $3
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role_level)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CacheError::NotFound);
        }
        Ok(())
    }
}

async fn insert_member(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    member: &GroupMemberEntity,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO group_members (
            group_id, user_id, nickname, face_url, role_level,
            joined_at, inviter_id, mute_end_time
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (group_id, user_id) DO NOTHING
        "#,
    )
    .bind(&member.group_id)
    .bind(&member.user_id)
    .bind(&member.nickname)
    .bind(&member.face_url)
    .bind(member.role_level)
    .bind(member.joined_at)
    .bind(&member.inviter_id)
    .bind(member.mute_end_time)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
