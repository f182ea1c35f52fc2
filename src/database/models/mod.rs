// 群组实体
pub mod group;
