//! 缓存不变量校验
//!
//! 在静止点检查：
//! - 每个缓冲块恰好位于一个链表（某个哈希桶或某个空闲链表）中
//! - 空闲链表中的缓冲块引用计数为 0
//! - 索引中的缓冲块位于其身份对应的桶中
//! - 同一 (dev, blockno) 在索引中至多出现一次

use std::collections::HashSet;

use super::bcache::BufCache;
use super::buffer::SlotId;
use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};

/// 校验报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// 索引中的缓冲块数量
    pub indexed: usize,
    /// 空闲链表中的缓冲块数量
    pub free: usize,
    /// 留在索引中但引用计数为 0 的缓冲块数量（`unpin` 造成）
    pub unreferenced: usize,
    /// 每个哈希桶的长度
    pub bucket_lens: Vec<usize>,
    /// 每个分片空闲链表的长度
    pub shard_lens: Vec<usize>,
}

fn corrupted(message: &'static str, id: SlotId) -> Error {
    log::error!("[BCACHE] audit: {} ({})", message, id);
    Error::new(ErrorKind::Corrupted, message)
}

impl<D: BlockDevice> BufCache<D> {
    /// 校验缓存不变量
    ///
    /// 会依次锁住所有哈希桶，再锁住所有空闲链表，得到一致的快照。
    /// 应在静止点调用；并发的 `fetch`/`release` 会在自旋锁上等待。
    ///
    /// # 错误
    ///
    /// 任何不变量被破坏都返回 `Corrupted`
    pub fn audit(&self) -> Result<AuditReport> {
        let nbuf = self.capacity();
        let mut seen = vec![false; nbuf];
        let mut keys = HashSet::with_capacity(nbuf);
        let mut buckets = Vec::with_capacity(self.index().len());
        let mut lists = Vec::with_capacity(self.pools().len());

        for b in 0..self.index().len() {
            buckets.push(self.index().lock_at(b));
        }
        for s in 0..self.pools().len() {
            lists.push(self.pools().lock_at(s));
        }

        let slots = self.slots();
        let mut mark = |id: SlotId| -> Result<()> {
            match seen.get_mut(id.index()) {
                Some(flag) if !*flag => {
                    *flag = true;
                    Ok(())
                }
                Some(_) => Err(corrupted("buffer is on more than one list", id)),
                None => Err(corrupted("unknown buffer id on a list", id)),
            }
        };

        let mut unreferenced = 0;
        for (b, bucket) in buckets.iter().enumerate() {
            for id in bucket.iter() {
                mark(id)?;
                let slot = &slots[id.index()];
                let (dev, blockno) = slot.key();
                if self.index().hash(dev, blockno) != b {
                    return Err(corrupted("buffer is in the wrong bucket", id));
                }
                if !keys.insert((dev, blockno)) {
                    return Err(corrupted("block is cached twice", id));
                }
                if slot.refcnt() == 0 {
                    unreferenced += 1;
                }
            }
        }

        for list in lists.iter() {
            for id in list.iter() {
                mark(id)?;
                if slots[id.index()].refcnt() != 0 {
                    return Err(corrupted("free buffer is still referenced", id));
                }
            }
        }

        let bucket_lens: Vec<usize> = buckets.iter().map(|b| b.len()).collect();
        let shard_lens: Vec<usize> = lists.iter().map(|l| l.len()).collect();
        drop(lists);
        drop(buckets);

        if let Some(pos) = seen.iter().position(|&flag| !flag) {
            return Err(corrupted("buffer is on no list", SlotId::new(pos)));
        }

        Ok(AuditReport {
            indexed: bucket_lens.iter().sum(),
            free: shard_lens.iter().sum(),
            unreferenced,
            bucket_lens,
            shard_lens,
        })
    }
}
