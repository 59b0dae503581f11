//! 分片空闲链表
//!
//! 每个执行分片一个空闲链表，各自一把自旋锁。队首是最近释放的缓冲块，
//! 回收时从队尾（最早释放）取，近似 LRU。
//!
//! 本分片为空时依次扫描其他分片（按分片号升序，跳过自己），
//! 避免所有核心争抢同一把全局锁。

use std::collections::VecDeque;

use spin::Mutex;

use super::buffer::{Slot, SlotId};
use super::index::Bucket;
use crate::error::{Error, ErrorKind, Result};
use crate::sync::ShardPin;

/// 单个分片的空闲链表
pub(crate) struct FreeList {
    list: VecDeque<SlotId>,
}

impl FreeList {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            list: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.list.iter().copied()
    }
}

/// 回收结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Recycled {
    /// 被回收的缓冲块
    pub id: SlotId,
    /// 来源分片
    pub shard: usize,
    /// 是否取自其他分片
    pub stolen: bool,
}

/// 所有分片的空闲链表
pub(crate) struct FreePools {
    lists: Box<[Mutex<FreeList>]>,
}

impl FreePools {
    /// 创建空的空闲链表
    ///
    /// 每个链表按平均长度预留容量，总预留量与 `nbuf` 成正比。
    pub(crate) fn new(nshards: usize, nbuf: usize) -> Self {
        let per_shard = nbuf.div_ceil(nshards.max(1));
        let lists = (0..nshards)
            .map(|_| Mutex::new(FreeList::with_capacity(per_shard)))
            .collect();
        Self { lists }
    }

    /// 分片数量
    pub(crate) fn len(&self) -> usize {
        self.lists.len()
    }

    /// 把 `0..nbuf` 全部放入 `shard` 的空闲链表
    pub(crate) fn populate(&self, shard: usize, nbuf: usize) {
        let mut list = self.lists[shard].lock();
        list.list.reserve(nbuf);
        for i in 0..nbuf {
            list.list.push_front(SlotId::new(i));
        }
    }

    /// 锁住某个分片的空闲链表
    pub(crate) fn lock_at(&self, shard: usize) -> spin::MutexGuard<'_, FreeList> {
        self.lists[shard].lock()
    }

    /// 空闲缓冲块总数
    pub(crate) fn free_count(&self) -> usize {
        self.lists.iter().map(|list| list.lock().len()).sum()
    }

    /// 回收一个空闲缓冲块到 `bucket`
    ///
    /// 调用方持有目标桶锁，且已确认 (dev, blockno) 不在桶中。
    /// 成功后缓冲块位于桶首，身份为 (dev, blockno)，引用计数为 1，数据无效。
    ///
    /// # 错误
    ///
    /// - `Corrupted`：空闲链表中的缓冲块引用计数非 0
    /// - `NoSpace`：所有分片都没有空闲缓冲块
    pub(crate) fn recycle_into(
        &self,
        bucket: &mut Bucket,
        slots: &[Slot],
        dev: u32,
        blockno: u32,
        pin: &ShardPin,
    ) -> Result<Recycled> {
        let own = pin.id() % self.lists.len();
        let order = core::iter::once(own).chain((0..self.lists.len()).filter(|&s| s != own));

        for shard in order {
            let mut list = self.lists[shard].lock();
            let Some(&id) = list.list.back() else {
                continue;
            };
            let slot = &slots[id.index()];
            if slot.refcnt() != 0 {
                log::error!(
                    "[BCACHE] free list {} holds {} with refcnt={}",
                    shard,
                    id,
                    slot.refcnt()
                );
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "buffer on free list is still referenced",
                ));
            }
            list.list.pop_back();
            bucket.push_front(id);
            slot.retag(dev, blockno);
            return Ok(Recycled {
                id,
                shard,
                stolen: shard != own,
            });
        }

        log::error!(
            "[BCACHE] no free buffers for dev={} blockno={}",
            dev,
            blockno
        );
        Err(Error::new(ErrorKind::NoSpace, "no free buffers"))
    }

    /// 把缓冲块放回当前分片空闲链表的队首
    ///
    /// 调用方持有缓冲块所在的桶锁，且已将其从桶中移除。
    pub(crate) fn free(&self, id: SlotId, pin: &ShardPin) -> usize {
        let shard = pin.id() % self.lists.len();
        self.lists[shard].lock().list.push_front(id);
        shard
    }
}
