//! 同步原语
//!
//! 缓存使用两级锁：
//! - 自旋锁（`spin::Mutex`）：保护哈希桶和空闲链表，持有时间很短，
//!   持有期间不得阻塞（不做 I/O，不获取睡眠锁）
//! - 睡眠锁（[`SleepLock`]）：保护单个缓冲块的内容，可在持有时做设备 I/O
//!
//! 分片固定（[`ShardPin`]）保证选择空闲链表时分片号稳定。

pub mod shard;
mod sleeplock;

pub use shard::{current_shard, with_shard, ShardPin};
pub use sleeplock::{SleepLock, SleepLockGuard};
