//! 缓冲区缓存模块
//!
//! 固定容量、可并发访问的块缓存，位于文件系统和块设备之间。
//!
//! # 主要组件
//!
//! - [`BufCache`] - 缓存服务：`fetch`/`commit`/`release`/`pin`/`unpin`
//! - [`Buf`] - 持有内容锁的缓冲块句柄
//! - `index` - 分桶哈希索引，每桶一把自旋锁
//! - `pool` - 分片空闲链表，本分片为空时从其他分片回收
//! - [`CacheStats`] - 统计信息
//! - [`AuditReport`] - 不变量校验结果
//!
//! # 设计原理
//!
//! 与单一全局 LRU 链表相比，分两层加锁：
//!
//! 1. **索引层**：按 (dev, blockno) 哈希到桶，只锁一个桶。
//!    不同桶上的查找互不影响
//! 2. **分配层**：每个分片一个空闲链表。未命中时先从本分片回收，
//!    只有本分片为空才去碰其他分片的锁
//! 3. **内容锁**：每个缓冲块一把睡眠锁，I/O 在其下进行，
//!    不会阻塞其他块的索引和分配操作
//!
//! 每个缓冲块任意时刻恰好属于一个链表：被引用（或被 `unpin` 到 0）时
//! 在某个桶中，否则在某个空闲链表中。链表之间的迁移在两把锁的保护下完成。
//!
//! # 状态机
//!
//! ```text
//! FREE --回收--> INDEXED(无效) --设备读取--> INDEXED(有效) --release 到 0--> FREE
//! ```
//!
//! `pin`/`unpin` 只调整引用计数，不会把缓冲块送回 FREE。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use sharded_bcache::{BufCache, CacheConfig, MemDevice};
//!
//! let cache = BufCache::new(CacheConfig::default(), MemDevice::new(1024))?;
//!
//! // 读块（可能阻塞在内容锁上）
//! let mut buf = cache.fetch(1, 46)?;
//! buf.data_mut()[0] = 42;
//!
//! // 同步写回
//! buf.commit()?;
//!
//! // 释放
//! buf.release()?;
//!
//! let stats = cache.stats();
//! println!("hit rate {:.2}", stats.hit_rate());
//! ```

mod bcache;
mod buffer;
mod index;
mod pool;
mod stats;
mod verify;

pub use bcache::{Buf, BufCache};
pub use buffer::{BufData, BufFlags, SlotId};
pub use stats::CacheStats;
pub use verify::AuditReport;
