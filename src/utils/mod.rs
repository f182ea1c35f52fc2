use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::database::operations::interface::GroupMemberModel;
use crate::error::{CacheError, CacheResult};

/// 群组成员哈希函数：输入群组ID，输出成员集合的哈希
pub type HashCodeFn = Arc<dyn Fn(String) -> BoxFuture<'static, CacheResult<u64>> + Send + Sync>;

/// 计算成员集合的哈希，与成员顺序无关
///
/// 成员ID排序后以逗号连接，取 SHA-256 摘要的前8字节（大端）。空集合为 0。
pub fn members_hash<S: AsRef<str>>(user_ids: &[S]) -> u64 {
    if user_ids.is_empty() {
        return 0;
    }

    let mut sorted: Vec<&str> = user_ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let digest = Sha256::digest(sorted.join(",").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// 从成员存储构造哈希函数
pub fn hash_code_from_store(member_db: Arc<dyn GroupMemberModel>) -> HashCodeFn {
    Arc::new(move |group_id: String| {
        let member_db = member_db.clone();
        async move {
            let user_ids = member_db.find_member_user_ids(&group_id).await?;
            Ok::<_, CacheError>(members_hash(&user_ids))
        }
        .boxed()
    })
}

/// 分页，页码从 1 开始；页码或每页数量不合法、或超出范围时返回空
pub fn paginate<T>(items: &[T], page_number: i32, show_number: i32) -> &[T] {
    if page_number <= 0 || show_number <= 0 {
        return &[];
    }

    let show = show_number as usize;
    let start = (page_number as usize - 1).saturating_mul(show);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(show).min(items.len());
    &items[start..end]
}
