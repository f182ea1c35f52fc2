// 数据库模块
// 包含群组实体定义和存储操作

pub mod models; // 数据库实体定义
pub mod operations; // 存储接口及实现

// 重新导出常用类型，方便其他模块使用
pub use models::group::{GroupEntity, GroupMemberEntity, GroupUpdate};
pub use operations::group::GroupOperation;
pub use operations::interface::{GroupMemberModel, GroupModel};
pub use operations::memory::MemoryGroupStore;
