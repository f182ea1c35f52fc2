// 群组实体
// 定义群组相关的数据库实体，同时也是缓存中保存的值

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 群组状态：正常
pub const GROUP_STATUS_OK: i32 = 0;
/// 群组状态：已解散
pub const GROUP_STATUS_DISMISSED: i32 = 2;

/// 成员角色
pub mod role_level {
    /// 群主
    pub const OWNER: i32 = 100;
    /// 管理员
    pub const ADMIN: i32 = 60;
    /// 普通成员
    pub const ORDINARY: i32 = 20;
}

/// 群组实体，对应数据库中的群组表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GroupEntity {
    /// 群组ID
    pub group_id: String,
    /// 群组名称
    pub name: String,
    /// 群公告
    pub notification: Option<String>,
    /// 群组简介
    pub introduction: Option<String>,
    /// 群头像
    pub face_url: Option<String>,
    /// 创建者ID
    pub creator_id: String,
    /// 群组状态
    pub status: i32,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 群组成员实体，对应数据库中的群组成员表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GroupMemberEntity {
    /// 群组ID
    pub group_id: String,
    /// 用户ID
    pub user_id: String,
    /// 群昵称
    pub nickname: String,
    /// 群内头像
    pub face_url: Option<String>,
    /// 成员角色，见 [`role_level`]
    pub role_level: i32,
    /// 加入时间
    pub joined_at: DateTime<Utc>,
    /// 邀请人ID
    pub inviter_id: Option<String>,
    /// 禁言截止时间
    pub mute_end_time: Option<DateTime<Utc>>,
}

/// 群组信息更新，None 表示不修改该字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub notification: Option<String>,
    pub introduction: Option<String>,
    pub face_url: Option<String>,
}

impl GroupUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.notification.is_none()
            && self.introduction.is_none()
            && self.face_url.is_none()
    }

    /// 将更新应用到一份群组记录上
    pub fn apply(&self, group: &mut GroupEntity) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(notification) = &self.notification {
            group.notification = Some(notification.clone());
        }
        if let Some(introduction) = &self.introduction {
            group.introduction = Some(introduction.clone());
        }
        if let Some(face_url) = &self.face_url {
            group.face_url = Some(face_url.clone());
        }
    }
}

impl GroupEntity {
    pub fn new(group_id: &str, name: &str, creator_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            name: name.to_string(),
            notification: None,
            introduction: None,
            face_url: None,
            creator_id: creator_id.to_string(),
            status: GROUP_STATUS_OK,
            created_at: Utc::now(),
        }
    }
}

impl GroupMemberEntity {
    pub fn new(group_id: &str, user_id: &str, role_level: i32) -> Self {
        Self {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            nickname: String::new(),
            face_url: None,
            role_level,
            joined_at: Utc::now(),
            inviter_id: None,
            mute_end_time: None,
        }
    }
}
