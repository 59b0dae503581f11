//! 缓冲块结构
//!
//! 对应 xv6 的 `struct buf`
//!
//! C 实现中 `buf` 通过内嵌的 `prev`/`next` 指针挂在哈希桶或空闲链表上。
//! 这里链表只保存 [`SlotId`]，缓冲块本身固定放在缓存的数组中，
//! 链表成员关系的迁移就是在两个容器之间移动一个下标。
//!
//! # 字段保护规则
//!
//! - `dev`/`blockno`：回收时在目标桶锁和源空闲链表锁下写入，
//!   其余时间在桶锁下读取；`refcnt > 0` 期间不变
//! - `refcnt`：只在所属桶锁下修改
//! - `flags`：回收时清零，其余时间由内容锁持有者修改
//! - `data`：只能通过内容锁访问

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use bitflags::bitflags;

use crate::sync::SleepLock;

/// 缓冲块 ID，即其在缓存数组中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// 数组下标
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for SlotId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// 缓冲块状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u8 {
        /// 数据与设备上的块一致
        const VALID = 0x01;
        /// 数据已修改，尚未写回
        const DIRTY = 0x02;
    }
}

/// 块数据
pub type BufData = Box<[u8]>;

/// 缓冲块
pub(crate) struct Slot {
    dev: AtomicU32,
    blockno: AtomicU32,
    refcnt: AtomicU32,
    flags: AtomicU8,
    /// 最近一次命中时的逻辑时钟
    last_used: AtomicU64,
    /// 内容锁
    pub(crate) data: SleepLock<BufData>,
}

impl Slot {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU32::new(0),
            refcnt: AtomicU32::new(0),
            flags: AtomicU8::new(0),
            last_used: AtomicU64::new(0),
            data: SleepLock::new(vec![0u8; block_size].into_boxed_slice(), "buffer"),
        }
    }

    /// (dev, blockno)
    pub(crate) fn key(&self) -> (u32, u32) {
        (
            self.dev.load(Ordering::Relaxed),
            self.blockno.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn matches(&self, dev: u32, blockno: u32) -> bool {
        self.key() == (dev, blockno)
    }

    /// 赋予新身份：引用计数置 1，数据标记为无效
    pub(crate) fn retag(&self, dev: u32, blockno: u32) {
        self.dev.store(dev, Ordering::Relaxed);
        self.blockno.store(blockno, Ordering::Relaxed);
        self.flags.store(0, Ordering::Release);
        self.refcnt.store(1, Ordering::Relaxed);
    }

    pub(crate) fn refcnt(&self) -> u32 {
        self.refcnt.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_ref(&self) -> u32 {
        self.refcnt.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 减少引用计数，已为 0 时返回 `None` 且不修改
    pub(crate) fn dec_ref(&self) -> Option<u32> {
        let cnt = self.refcnt.load(Ordering::Relaxed);
        if cnt == 0 {
            return None;
        }
        self.refcnt.store(cnt - 1, Ordering::Relaxed);
        Some(cnt - 1)
    }

    pub(crate) fn flags(&self) -> BufFlags {
        BufFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn insert_flags(&self, flags: BufFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove_flags(&self, flags: BufFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn touch(&self, tick: u64) {
        self.last_used.store(tick, Ordering::Relaxed);
    }

    pub(crate) fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }
}

impl core::fmt::Debug for Slot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (dev, blockno) = self.key();
        f.debug_struct("Slot")
            .field("dev", &dev)
            .field("blockno", &blockno)
            .field("refcnt", &self.refcnt())
            .field("flags", &self.flags())
            .field("last_used", &self.last_used())
            .field("locked", &self.data.is_locked())
            .finish()
    }
}
