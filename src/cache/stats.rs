//! 缓存统计信息

use core::sync::atomic::{AtomicU64, Ordering};

/// 缓存统计信息快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 索引命中次数
    pub hits: u64,
    /// 索引未命中次数
    pub misses: u64,
    /// 回收空闲缓冲块次数
    pub recycles: u64,
    /// 从其他分片回收的次数
    pub steals: u64,
    /// 设备读取次数
    pub reads: u64,
    /// 设备写入次数
    pub writes: u64,
    /// 缓冲块回到空闲链表的次数
    pub frees: u64,
    /// 在未持有内容锁的线程上提交或释放的次数
    pub faults: u64,
}

impl CacheStats {
    /// 总访问次数
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 统计计数器
///
/// 计数只用于观察，使用 `Relaxed` 顺序。
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub recycles: AtomicU64,
    pub steals: AtomicU64,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub frees: AtomicU64,
    pub faults: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recycles: self.recycles.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}
