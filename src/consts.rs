//! 缓冲区缓存常量定义
//!
//! 默认值沿用经典的小型内核配置，可通过 [`crate::CacheConfig`] 覆盖。

/// 缓冲块数量
pub const NBUF: usize = 30;

/// 哈希桶数量（取质数以分散 (dev, blockno)）
pub const HASHSIZE: usize = 13;

/// 执行分片数量（通常等于 CPU 核数）
pub const NSHARD: usize = 8;

/// 块大小（字节）
pub const BSIZE: usize = 1024;

/// 启动时所有缓冲块放入的分片
pub const HOME_SHARD: usize = 0;

// 哈希系数
pub(crate) const HASH_DEV_MUL: u32 = 1234;
pub(crate) const HASH_BLOCK_MUL: u32 = 5678;
pub(crate) const HASH_BIAS: u32 = 90;
