//! sharded_bcache: 分片缓冲区缓存
//!
//! 固定容量、线程安全的块缓冲区缓存，提供：
//! - 多个调用方共享同一块的缓存副本，避免重复的设备读取
//! - 每个缓冲块一把阻塞内容锁，串行化对块数据的修改
//! - 固定数量的缓冲块，未命中时回收最早释放的空闲缓冲块
//! - 分桶索引 + 分片空闲链表，没有全局锁
//!
//! # 示例
//!
//! ```rust,ignore
//! use sharded_bcache::{BufCache, CacheConfig, MemDevice, Result};
//!
//! fn main() -> Result<()> {
//!     let cache = BufCache::new(CacheConfig::default(), MemDevice::new(1024))?;
//!
//!     let mut buf = cache.fetch(1, 0)?;
//!     buf.data_mut()[0] = 0x42;
//!     buf.commit()?;
//!     buf.release()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备接口
//! - [`cache`] - 缓冲区缓存
//! - [`sync`] - 睡眠锁与分片固定
//! - [`config`] - 缓存配置
//! - [`consts`] - 默认常量

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 缓存配置
pub mod config;

/// 同步原语
pub mod sync;

/// 缓冲区缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, MemDevice};

// 配置
pub use config::CacheConfig;

// 同步
pub use sync::{current_shard, with_shard, ShardPin, SleepLock};

// 缓存
pub use cache::{AuditReport, Buf, BufCache, BufData, BufFlags, CacheStats, SlotId};
