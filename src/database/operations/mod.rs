// 存储接口
pub mod interface;

// PostgreSQL 实现
pub mod group;

// 内存实现
pub mod memory;
