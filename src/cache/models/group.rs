use serde::{Deserialize, Serialize};

/// 群组成员摘要：对端用它判断本地成员列表是否需要重新拉取
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSimpleUserId {
    /// 成员集合哈希
    pub hash: u64,
    /// 成员数量
    pub member_num: u32,
}
