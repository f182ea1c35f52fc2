// 键前缀是与其他服务实例共享的线上格式，滚动发布期间不能改动

/// 群组信息缓存键前缀
const GROUP_INFO_PREFIX: &str = "GROUP_INFO:";

/// 群组成员ID列表缓存键前缀
const GROUP_MEMBER_IDS_PREFIX: &str = "GROUP_MEMBER_IDS:";

/// 群组成员哈希缓存键前缀
const GROUP_MEMBERS_HASH_PREFIX: &str = "GROUP_MEMBERS_HASH2:";

/// 群组成员信息缓存键前缀
const GROUP_MEMBER_INFO_PREFIX: &str = "GROUP_MEMBER_INFO:";

/// 用户已加入群组缓存键前缀
const JOINED_GROUPS_PREFIX: &str = "JOIN_GROUPS_KEY:";

/// 群组成员数缓存键前缀
const GROUP_MEMBER_NUM_PREFIX: &str = "GROUP_MEMBER_NUM_CACHE:";

/// 键锁后缀
const LOCK_SUFFIX: &str = ":LOCK";

/// 生成群组信息缓存键
pub fn group_info_key(group_id: &str) -> String {
    format!("{}{}", GROUP_INFO_PREFIX, group_id)
}

/// 生成群组成员ID列表缓存键
pub fn group_member_ids_key(group_id: &str) -> String {
    format!("{}{}", GROUP_MEMBER_IDS_PREFIX, group_id)
}

/// 生成群组成员哈希缓存键
pub fn group_members_hash_key(group_id: &str) -> String {
    format!("{}{}", GROUP_MEMBERS_HASH_PREFIX, group_id)
}

/// 生成群组成员信息缓存键
pub fn group_member_info_key(group_id: &str, user_id: &str) -> String {
    format!("{}{}-{}", GROUP_MEMBER_INFO_PREFIX, group_id, user_id)
}

/// 生成用户已加入群组缓存键
pub fn joined_groups_key(user_id: &str) -> String {
    format!("{}{}", JOINED_GROUPS_PREFIX, user_id)
}

/// 生成群组成员数缓存键
pub fn group_member_num_key(group_id: &str) -> String {
    format!("{}{}", GROUP_MEMBER_NUM_PREFIX, group_id)
}

/// 生成某个缓存键对应的分布式锁键
pub fn lock_key(key: &str) -> String {
    format!("{}{}", key, LOCK_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefixes_are_stable() {
        assert_eq!(group_info_key("g1"), "GROUP_INFO:g1");
        assert_eq!(group_member_ids_key("g1"), "GROUP_MEMBER_IDS:g1");
        assert_eq!(group_members_hash_key("g1"), "GROUP_MEMBERS_HASH2:g1");
        assert_eq!(group_member_info_key("g1", "u1"), "GROUP_MEMBER_INFO:g1-u1");
        assert_eq!(joined_groups_key("u1"), "JOIN_GROUPS_KEY:u1");
        assert_eq!(group_member_num_key("g1"), "GROUP_MEMBER_NUM_CACHE:g1");
    }

    #[test]
    fn lock_key_wraps_guarded_key() {
        assert_eq!(lock_key("GROUP_INFO:g1"), "GROUP_INFO:g1:LOCK");
    }
}
