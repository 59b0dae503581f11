//! 分桶哈希索引
//!
//! 固定数量的哈希桶，每个桶一把自旋锁，桶内按最近访问排序（队首最新）。
//! (dev, blockno) 通过确定性哈希映射到唯一的桶；缓冲块被索引期间
//! 身份不变，因此不会在桶之间移动。

use std::collections::VecDeque;

use spin::{Mutex, MutexGuard};

use super::buffer::{Slot, SlotId};
use crate::consts::{HASH_BIAS, HASH_BLOCK_MUL, HASH_DEV_MUL};

/// 哈希桶
///
/// 队首为最近访问的缓冲块。桶内查找是线性扫描，
/// 桶数量应使平均链长保持很小。
pub(crate) struct Bucket {
    list: VecDeque<SlotId>,
}

impl Bucket {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            list: VecDeque::with_capacity(capacity),
        }
    }

    /// 按最近访问顺序查找 (dev, blockno)
    pub(crate) fn position(&self, slots: &[Slot], dev: u32, blockno: u32) -> Option<usize> {
        self.list
            .iter()
            .position(|id| slots[id.index()].matches(dev, blockno))
    }

    /// 插入到队首
    pub(crate) fn push_front(&mut self, id: SlotId) {
        self.list.push_front(id);
    }

    /// 把 `pos` 处的缓冲块移到队首
    fn promote(&mut self, pos: usize) -> Option<SlotId> {
        let id = self.list.remove(pos)?;
        self.list.push_front(id);
        Some(id)
    }

    /// 移除缓冲块，返回是否存在
    pub(crate) fn remove(&mut self, id: SlotId) -> bool {
        match self.list.iter().position(|&x| x == id) {
            Some(pos) => {
                self.list.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, id: SlotId) -> bool {
        self.list.contains(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.list.iter().copied()
    }
}

/// 查找结果
pub(crate) enum Lookup<'a> {
    /// 已缓存：引用计数已加 1，桶锁已释放
    Hit(SlotId),
    /// 未缓存：继续持有桶锁，交给回收流程
    Miss(MutexGuard<'a, Bucket>),
}

/// 分桶哈希索引
pub(crate) struct HashIndex {
    buckets: Box<[Mutex<Bucket>]>,
}

impl HashIndex {
    /// 创建索引
    ///
    /// 每个桶按平均链长预留容量，总预留量与 `nbuf` 成正比。
    pub(crate) fn new(nbuckets: usize, nbuf: usize) -> Self {
        let per_bucket = nbuf.div_ceil(nbuckets.max(1));
        let buckets = (0..nbuckets)
            .map(|_| Mutex::new(Bucket::with_capacity(per_bucket)))
            .collect();
        Self { buckets }
    }

    /// 桶数量
    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    /// (dev, blockno) 所在的桶
    pub(crate) fn hash(&self, dev: u32, blockno: u32) -> usize {
        let h = HASH_DEV_MUL
            .wrapping_mul(dev)
            .wrapping_add(HASH_BLOCK_MUL.wrapping_mul(blockno))
            .wrapping_add(HASH_BIAS);
        h as usize % self.buckets.len()
    }

    /// 锁住 (dev, blockno) 所在的桶
    pub(crate) fn lock(&self, dev: u32, blockno: u32) -> MutexGuard<'_, Bucket> {
        self.buckets[self.hash(dev, blockno)].lock()
    }

    /// 按下标锁住桶
    pub(crate) fn lock_at(&self, bucket: usize) -> MutexGuard<'_, Bucket> {
        self.buckets[bucket].lock()
    }

    /// 查找缓冲块，未命中时保留桶锁
    ///
    /// 命中时：引用计数加 1，更新最近使用时间，移到桶首。
    pub(crate) fn lookup_or_reserve<'a>(
        &'a self,
        slots: &[Slot],
        dev: u32,
        blockno: u32,
        tick: u64,
    ) -> Lookup<'a> {
        let mut bucket = self.lock(dev, blockno);
        if let Some(pos) = bucket.position(slots, dev, blockno) {
            if let Some(id) = bucket.promote(pos) {
                let slot = &slots[id.index()];
                slot.inc_ref();
                slot.touch(tick);
                return Lookup::Hit(id);
            }
        }
        Lookup::Miss(bucket)
    }
}
