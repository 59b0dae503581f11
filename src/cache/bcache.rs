//! 缓冲区缓存服务
//!
//! 对应 xv6 的 `bcache` 以及 `bread`/`bwrite`/`brelse`/`bpin`/`bunpin`
//!
//! # 接口
//!
//! - [`BufCache::fetch`] 返回持有内容锁的 [`Buf`]，数据保证有效
//! - 修改数据后调用 [`Buf::commit`] 同步写回设备
//! - 用完调用 [`Buf::release`]（或直接 drop），释放后不得再访问数据
//! - 同一时刻只有一个调用方能持有某个缓冲块，不要长时间占用
//!
//! # 锁的层次
//!
//! 哈希桶锁和空闲链表锁都是自旋锁，持有期间不做 I/O、不获取内容锁；
//! `fetch` 在释放所有自旋锁之后才获取内容锁（可能阻塞）。
//! 同时需要两把自旋锁时，总是先桶锁、后空闲链表锁。

use core::sync::atomic::{AtomicU64, Ordering};

use super::buffer::{BufData, BufFlags, Slot, SlotId};
use super::index::{HashIndex, Lookup};
use super::pool::FreePools;
use super::stats::{CacheStats, StatsCounters};
use crate::block::BlockDevice;
use crate::config::CacheConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::sync::{ShardPin, SleepLockGuard};

/// 缓冲区缓存
///
/// 启动时一次性创建全部缓冲块并放入初始分片的空闲链表，容量此后不变。
/// 缓存通过引用共享（例如 `Arc<BufCache<D>>` 或 `std::thread::scope`），
/// 没有全局实例。
///
/// # 示例
///
/// ```rust,ignore
/// let cache = BufCache::new(CacheConfig::default(), MemDevice::new(1024))?;
///
/// let mut buf = cache.fetch(1, 33)?;
/// buf.data_mut()[0] = 0x42;
/// buf.commit()?;
/// buf.release()?;
/// ```
pub struct BufCache<D: BlockDevice> {
    config: CacheConfig,
    device: D,
    slots: Box<[Slot]>,
    index: HashIndex,
    pools: FreePools,
    /// 最近使用时间的逻辑时钟
    clock: AtomicU64,
    stats: StatsCounters,
}

impl<D: BlockDevice> BufCache<D> {
    /// 创建缓存
    ///
    /// 对应 `binit`
    ///
    /// # 错误
    ///
    /// 配置非法或设备块大小与配置不一致时返回 `InvalidInput`
    pub fn new(config: CacheConfig, device: D) -> Result<Self> {
        config.validate()?;
        if device.block_size() != config.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device block size does not match cache block size",
            ));
        }

        let clock = AtomicU64::new(0);
        let now = clock.load(Ordering::Relaxed);
        let slots = (0..config.nbuf)
            .map(|_| {
                let slot = Slot::new(config.block_size);
                slot.touch(now);
                slot
            })
            .collect();
        let index = HashIndex::new(config.buckets, config.nbuf);
        let pools = FreePools::new(config.shards, config.nbuf);
        pools.populate(config.home_shard, config.nbuf);

        log::debug!(
            "[BCACHE] init nbuf={} buckets={} shards={} block_size={}",
            config.nbuf,
            config.buckets,
            config.shards,
            config.block_size
        );

        Ok(Self {
            config,
            device,
            slots,
            index,
            pools,
            clock,
            stats: StatsCounters::default(),
        })
    }

    /// 使用默认配置（块大小取自设备）创建缓存
    pub fn with_default_config(device: D) -> Result<Self> {
        let config = CacheConfig::default().with_block_size(device.block_size());
        Self::new(config, device)
    }

    /// 获取块并锁住其内容
    ///
    /// 对应 `bread`
    ///
    /// 命中时复用已缓存的缓冲块，否则回收一个空闲缓冲块。
    /// 两种情况都会等待内容锁（可能阻塞）。数据无效时从设备同步读取。
    ///
    /// # 错误
    ///
    /// - `NoSpace`：所有缓冲块都在使用中（致命）
    /// - `Corrupted`：空闲链表状态损坏（致命）
    /// - 设备读取错误原样返回，缓冲块的引用随之归还
    pub fn fetch(&self, dev: u32, blockno: u32) -> Result<Buf<'_, D>> {
        let mut buf = self.get(dev, blockno)?;
        if !buf.is_valid() {
            if let Some(guard) = buf.guard.as_mut() {
                self.device.read_block(dev, blockno, &mut guard[..])?;
            }
            buf.slot().insert_flags(BufFlags::VALID);
            StatsCounters::bump(&self.stats.reads);
        }
        Ok(buf)
    }

    /// 获取块并锁住其内容，但不从设备读取
    ///
    /// 用于调用方将整块覆盖写的场景。新回收的缓冲块 `is_valid()` 为 `false`，
    /// 填充完数据后可调用 [`Buf::set_valid`]。
    pub fn fetch_noread(&self, dev: u32, blockno: u32) -> Result<Buf<'_, D>> {
        self.get(dev, blockno)
    }

    /// 增加引用计数，使缓冲块留在索引中
    ///
    /// 对应 `bpin`。不涉及内容锁。返回新的引用计数。
    ///
    /// # 错误
    ///
    /// 缓冲块当前不在索引中时返回 `InvalidState`
    pub fn pin(&self, id: SlotId) -> Result<u32> {
        let slot = self.slot(id)?;
        let (dev, blockno) = slot.key();
        let bucket = self.index.lock(dev, blockno);
        if !bucket.contains(id) || !slot.matches(dev, blockno) {
            return Err(Error::new(ErrorKind::InvalidState, "buffer is not cached"));
        }
        Ok(slot.inc_ref())
    }

    /// 减少引用计数
    ///
    /// 对应 `bunpin`。与 [`Buf::release`] 不同，引用计数降到 0 时
    /// 缓冲块仍留在索引中，不回到空闲链表；之后再次 `fetch`
    /// 同一块并释放时才会回到空闲链表。返回新的引用计数。
    ///
    /// # 错误
    ///
    /// - `InvalidState`：缓冲块当前不在索引中
    /// - `Corrupted`：引用计数已经为 0
    pub fn unpin(&self, id: SlotId) -> Result<u32> {
        let slot = self.slot(id)?;
        let (dev, blockno) = slot.key();
        let bucket = self.index.lock(dev, blockno);
        if !bucket.contains(id) || !slot.matches(dev, blockno) {
            return Err(Error::new(ErrorKind::InvalidState, "buffer is not cached"));
        }
        match slot.dec_ref() {
            Some(0) => {
                log::warn!(
                    "[BCACHE] unpin dev={} blockno={} dropped to 0, {} stays indexed",
                    dev,
                    blockno,
                    id
                );
                Ok(0)
            }
            Some(cnt) => Ok(cnt),
            None => {
                log::error!("[BCACHE] unpin dev={} blockno={} with refcnt=0", dev, blockno);
                Err(Error::new(ErrorKind::Corrupted, "unpin of unreferenced buffer"))
            }
        }
    }

    /// 缓冲块当前的引用计数
    pub fn ref_count(&self, id: SlotId) -> Result<u32> {
        Ok(self.slot(id)?.refcnt())
    }

    /// 缓冲块最近一次命中时的逻辑时钟
    ///
    /// 仅供观察，回收顺序由空闲链表决定。
    pub fn last_used(&self, id: SlotId) -> Result<u64> {
        Ok(self.slot(id)?.last_used())
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// 缓冲块总数
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 空闲缓冲块数量
    pub fn free_count(&self) -> usize {
        self.pools.free_count()
    }

    /// 缓存配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 底层设备
    pub fn device(&self) -> &D {
        &self.device
    }

    // ===== 内部实现 =====

    pub(super) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(super) fn index(&self) -> &HashIndex {
        &self.index
    }

    pub(super) fn pools(&self) -> &FreePools {
        &self.pools
    }

    fn slot(&self, id: SlotId) -> Result<&Slot> {
        self.slots
            .get(id.index())
            .ok_or(Error::new(ErrorKind::InvalidInput, "buffer id out of range"))
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 对应 `bget`：查找或回收，然后获取内容锁
    fn get(&self, dev: u32, blockno: u32) -> Result<Buf<'_, D>> {
        let id = match self.index.lookup_or_reserve(&self.slots, dev, blockno, self.tick()) {
            Lookup::Hit(id) => {
                StatsCounters::bump(&self.stats.hits);
                log::trace!("[BCACHE] get dev={} blockno={} HIT {}", dev, blockno, id);
                id
            }
            Lookup::Miss(mut bucket) => {
                StatsCounters::bump(&self.stats.misses);
                let pin = ShardPin::enter(self.config.shards);
                let recycled =
                    self.pools
                        .recycle_into(&mut bucket, &self.slots, dev, blockno, &pin)?;
                drop(bucket);

                StatsCounters::bump(&self.stats.recycles);
                if recycled.stolen {
                    StatsCounters::bump(&self.stats.steals);
                    log::debug!(
                        "[BCACHE] get dev={} blockno={} MISS, stole {} from shard {} (own {})",
                        dev,
                        blockno,
                        recycled.id,
                        recycled.shard,
                        pin.id()
                    );
                } else {
                    log::debug!(
                        "[BCACHE] get dev={} blockno={} MISS, recycled {}",
                        dev,
                        blockno,
                        recycled.id
                    );
                }
                recycled.id
            }
        };

        // 此时不持有任何自旋锁
        let guard = self.slots[id.index()].data.lock();
        Ok(Buf {
            cache: self,
            id,
            dev,
            blockno,
            guard: Some(guard),
        })
    }

    /// 对应 `brelse` 的后半部分：内容锁已释放，归还引用
    fn put(&self, id: SlotId) -> Result<()> {
        let slot = &self.slots[id.index()];
        let (dev, blockno) = slot.key();
        let mut bucket = self.index.lock(dev, blockno);
        match slot.dec_ref() {
            Some(0) => {
                if !bucket.remove(id) {
                    log::error!("[BCACHE] released {} is missing from its bucket", id);
                    return Err(Error::new(
                        ErrorKind::Corrupted,
                        "released buffer is not in its bucket",
                    ));
                }
                let pin = ShardPin::enter(self.config.shards);
                let shard = self.pools.free(id, &pin);
                StatsCounters::bump(&self.stats.frees);
                log::trace!(
                    "[BCACHE] free dev={} blockno={} {} -> shard {}",
                    dev,
                    blockno,
                    id,
                    shard
                );
            }
            Some(_) => {}
            None => {
                log::error!("[BCACHE] release dev={} blockno={} with refcnt=0", dev, blockno);
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "release of unreferenced buffer",
                ));
            }
        }
        Ok(())
    }
}

impl<D: BlockDevice> core::fmt::Debug for BufCache<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufCache")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// 持有内容锁的缓冲块句柄
///
/// 对应 xv6 中 `bread` 返回的 `struct buf *`。
/// drop 等价于 [`Buf::release`]，提前返回（`?`）时不会泄漏引用。
///
/// 句柄可以移动到其他线程，但内容锁属于获取它的线程：
/// 在其他线程上调用 `commit`/`release` 会返回 `NotHeld`。
pub struct Buf<'a, D: BlockDevice> {
    cache: &'a BufCache<D>,
    id: SlotId,
    dev: u32,
    blockno: u32,
    guard: Option<SleepLockGuard<'a, BufData>>,
}

impl<'a, D: BlockDevice> Buf<'a, D> {
    /// 缓冲块 ID，用于 [`BufCache::pin`]/[`BufCache::unpin`]
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// 设备号
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.blockno
    }

    /// 状态标志
    pub fn flags(&self) -> BufFlags {
        self.slot().flags()
    }

    /// 数据是否与设备一致
    pub fn is_valid(&self) -> bool {
        self.flags().contains(BufFlags::VALID)
    }

    /// 是否有未写回的修改
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(BufFlags::DIRTY)
    }

    /// 当前引用计数（包括自己）
    pub fn ref_count(&self) -> u32 {
        self.slot().refcnt()
    }

    /// 只读访问块数据
    pub fn data(&self) -> &[u8] {
        match &self.guard {
            Some(guard) => &guard[..],
            None => &[],
        }
    }

    /// 可写访问块数据，并标记为脏
    pub fn data_mut(&mut self) -> &mut [u8] {
        let slot = &self.cache.slots[self.id.index()];
        match &mut self.guard {
            Some(guard) => {
                slot.insert_flags(BufFlags::DIRTY);
                &mut guard[..]
            }
            None => &mut [],
        }
    }

    /// 标记数据有效（配合 [`BufCache::fetch_noread`] 使用）
    pub fn set_valid(&mut self) {
        self.slot().insert_flags(BufFlags::VALID);
    }

    /// 把数据同步写回设备
    ///
    /// 对应 `bwrite`。写入后调用设备的 `flush`，返回时数据已落盘。
    /// 不改变有效性、引用计数和链表位置，也不释放内容锁。
    ///
    /// # 错误
    ///
    /// - `NotHeld`：当前线程不持有内容锁（致命）
    /// - 设备写入或刷新错误原样返回，此时仍保留脏标志
    pub fn commit(&mut self) -> Result<()> {
        let guard = match &self.guard {
            Some(guard) if guard.is_owner() => guard,
            _ => return Err(self.not_held("commit")),
        };
        self.cache
            .device
            .write_block(self.dev, self.blockno, &guard[..])?;
        self.cache.device.flush()?;
        self.slot().remove_flags(BufFlags::DIRTY);
        StatsCounters::bump(&self.cache.stats.writes);
        Ok(())
    }

    /// 释放内容锁并归还引用
    ///
    /// 对应 `brelse`。引用计数降到 0 时缓冲块从索引移到当前分片
    /// 空闲链表的队首。
    ///
    /// # 错误
    ///
    /// - `NotHeld`：当前线程不持有内容锁（致命）。句柄仍被消费，
    ///   内容锁和引用照常归还，缓存保持一致
    /// - `Corrupted`：引用计数或链表状态损坏（致命）
    pub fn release(mut self) -> Result<()> {
        if !self.holds_lock() {
            let err = self.not_held("release");
            return self.release_inner().and(Err(err));
        }
        self.release_inner()
    }

    fn slot(&self) -> &Slot {
        &self.cache.slots[self.id.index()]
    }

    fn holds_lock(&self) -> bool {
        self.guard.as_ref().is_some_and(|guard| guard.is_owner())
    }

    fn usage_fault(&self, op: &str) {
        StatsCounters::bump(&self.cache.stats.faults);
        log::error!(
            "[BCACHE] {} of dev={} blockno={} without holding its lock",
            op,
            self.dev,
            self.blockno
        );
    }

    fn not_held(&self, op: &str) -> Error {
        self.usage_fault(op);
        Error::new(ErrorKind::NotHeld, "buffer lock not held by caller")
    }

    fn release_inner(&mut self) -> Result<()> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        if self.is_dirty() {
            log::warn!(
                "[BCACHE] releasing dirty dev={} blockno={} without commit",
                self.dev,
                self.blockno
            );
        }
        drop(guard);
        self.cache.put(self.id)
    }
}

impl<D: BlockDevice> Drop for Buf<'_, D> {
    fn drop(&mut self) {
        if self.guard.is_some() && !self.holds_lock() {
            self.usage_fault("drop");
        }
        if let Err(err) = self.release_inner() {
            log::error!(
                "[BCACHE] drop of dev={} blockno={} failed: {}",
                self.dev,
                self.blockno,
                err
            );
        }
    }
}

impl<D: BlockDevice> core::fmt::Debug for Buf<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buf")
            .field("id", &self.id)
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .field("flags", &self.flags())
            .field("refcnt", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;
    use crate::sync::with_shard;
    use std::thread;

    const BS: usize = 64;

    fn cache(nbuf: usize, shards: usize) -> BufCache<MemDevice> {
        let config = CacheConfig::default()
            .with_nbuf(nbuf)
            .with_buckets(7)
            .with_shards(shards)
            .with_block_size(BS);
        BufCache::new(config, MemDevice::new(BS)).unwrap()
    }

    #[test]
    fn test_cache_creation() {
        let cache = cache(4, 2);
        assert_eq!(cache.capacity(), 4);
        assert_eq!(cache.free_count(), 4);
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.config().shards, 2);
    }

    #[test]
    fn test_block_size_mismatch() {
        let config = CacheConfig::default().with_block_size(512);
        let err = BufCache::new(config, MemDevice::new(1024)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_default_config() {
        let cache = BufCache::with_default_config(MemDevice::new(256)).unwrap();
        assert_eq!(cache.capacity(), crate::consts::NBUF);
        assert_eq!(cache.config().block_size, 256);
    }

    #[test]
    fn test_released_block_is_read_again() {
        let cache = cache(4, 1);
        cache.device().store(1, 10, b"hello");

        let buf = cache.fetch(1, 10).unwrap();
        assert!(buf.is_valid());
        assert!(!buf.is_dirty());
        assert_eq!(&buf.data()[..5], b"hello");
        assert_eq!(buf.ref_count(), 1);
        buf.release().unwrap();
        assert_eq!(cache.free_count(), 4);

        // 引用归零后离开索引，再次获取要重新读设备
        let buf = cache.fetch(1, 10).unwrap();
        assert_eq!(&buf.data()[..5], b"hello");
        drop(buf);

        assert_eq!(cache.device().read_count(), 2);
        let stats = cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.frees, 2);
    }

    #[test]
    fn test_pinned_block_hits_without_read() {
        let cache = cache(4, 1);
        cache.device().store(1, 10, b"hello");

        let buf = cache.fetch(1, 10).unwrap();
        let id = buf.id();
        cache.pin(id).unwrap();
        buf.release().unwrap();

        let buf = cache.fetch(1, 10).unwrap();
        assert_eq!(buf.id(), id);
        assert!(buf.is_valid());
        assert_eq!(buf.ref_count(), 2);
        assert_eq!(&buf.data()[..5], b"hello");
        buf.release().unwrap();
        assert_eq!(cache.unpin(id).unwrap(), 0);

        assert_eq!(cache.device().read_count(), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.frees, 0);
    }

    #[test]
    fn test_read_after_write() {
        let cache = cache(4, 1);

        let mut buf = cache.fetch(2, 5).unwrap();
        buf.data_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert!(buf.is_dirty());
        buf.commit().unwrap();
        assert!(!buf.is_dirty());
        assert!(buf.is_valid());
        buf.release().unwrap();

        let buf = cache.fetch(2, 5).unwrap();
        assert_eq!(&buf.data()[..4], &[1, 2, 3, 4]);
        buf.release().unwrap();

        assert_eq!(&cache.device().load(2, 5)[..4], &[1, 2, 3, 4]);
        assert_eq!(cache.stats().writes, 1);
    }

    #[test]
    fn test_single_slot_is_reused() {
        let cache = cache(1, 1);
        cache.device().store(1, 2, &[0xBB; BS]);

        let mut buf = cache.fetch(1, 1).unwrap();
        let first = buf.id();
        buf.data_mut().fill(0xAA);
        buf.commit().unwrap();
        buf.release().unwrap();

        let buf = cache.fetch_noread(1, 2).unwrap();
        assert_eq!(buf.id(), first);
        assert_eq!((buf.dev(), buf.blockno()), (1, 2));
        assert!(!buf.is_valid());
        drop(buf);

        // 重新读取后有效
        let buf = cache.fetch(1, 2).unwrap();
        assert_eq!(buf.id(), first);
        assert!(buf.is_valid());
        assert!(buf.data().iter().all(|&b| b == 0xBB));
        buf.release().unwrap();

        assert!(cache.device().load(1, 1).iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_eviction_order_least_recently_freed() {
        let cache = cache(2, 1);

        let a = cache.fetch(1, 100).unwrap();
        let b = cache.fetch(1, 200).unwrap();
        let a_id = a.id();
        let b_id = b.id();
        assert_ne!(a_id, b_id);
        a.release().unwrap();
        b.release().unwrap();

        // A 最早释放，先被回收
        let c = cache.fetch(1, 300).unwrap();
        assert_eq!(c.id(), a_id);
        let d = cache.fetch(1, 400).unwrap();
        assert_eq!(d.id(), b_id);

        let stats = cache.stats();
        assert_eq!(stats.misses, 4);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_exhaustion_is_fatal() {
        let cache = cache(2, 2);
        let a = cache.fetch(1, 1).unwrap();
        let b = cache.fetch(1, 2).unwrap();

        let err = cache.fetch(1, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
        assert!(err.is_fatal());

        // 失败不破坏状态
        let report = cache.audit().unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.free, 0);

        drop(a);
        drop(b);
        assert!(cache.fetch(1, 3).is_ok());
    }

    #[test]
    fn test_commit_from_other_thread_is_usage_fault() {
        let cache = cache(2, 1);
        let buf = cache.fetch(1, 1).unwrap();

        thread::scope(|s| {
            s.spawn(move || {
                let mut buf = buf;
                let err = buf.commit().unwrap_err();
                assert_eq!(err.kind(), ErrorKind::NotHeld);
                assert!(err.is_fatal());
                let err = buf.release().unwrap_err();
                assert_eq!(err.kind(), ErrorKind::NotHeld);
            });
        });

        assert_eq!(cache.device().write_count(), 0);
        assert_eq!(cache.stats().faults, 2);
        let report = cache.audit().unwrap();
        assert_eq!(report.free, 2);
    }

    #[test]
    fn test_drop_on_other_thread_is_reported() {
        let cache = cache(2, 1);
        let buf = cache.fetch(1, 1).unwrap();
        let id = buf.id();

        thread::scope(|s| {
            s.spawn(move || drop(buf));
        });

        assert_eq!(cache.stats().faults, 1);
        // 缓存状态仍然一致
        assert_eq!(cache.ref_count(id).unwrap(), 0);
        assert_eq!(cache.audit().unwrap().free, 2);
        assert!(!cache.slots()[id.index()].data.is_locked());
    }

    #[test]
    fn test_concurrent_fetch_shares_slot() {
        let cache = cache(4, 2);
        let first = cache.fetch(1, 1).unwrap();
        let id = first.id();

        thread::scope(|s| {
            let waiter = s.spawn(|| {
                let buf = cache.fetch(1, 1).unwrap();
                let seen = (buf.id(), buf.dev(), buf.blockno());
                buf.release().unwrap();
                seen
            });

            // 等待对方拿到引用（随后阻塞在内容锁上）
            while cache.ref_count(id).unwrap() < 2 {
                thread::yield_now();
            }
            assert_eq!(cache.stats().misses, 1);
            first.release().unwrap();

            assert_eq!(waiter.join().unwrap(), (id, 1, 1));
        });

        assert_eq!(cache.ref_count(id).unwrap(), 0);
        assert_eq!(cache.device().read_count(), 1);
        cache.audit().unwrap();
    }

    #[test]
    fn test_steal_from_other_shard() {
        let cache = cache(2, 2);

        with_shard(1, || {
            let buf = cache.fetch(3, 3).unwrap();
            buf.release().unwrap();
        });
        let stats = cache.stats();
        assert_eq!(stats.steals, 1);

        // 释放后进入分片 1
        let report = cache.audit().unwrap();
        assert_eq!(report.shard_lens, vec![1, 1]);

        with_shard(1, || {
            let buf = cache.fetch(3, 4).unwrap();
            buf.release().unwrap();
        });
        // 分片 1 自己有空闲缓冲块，不再跨分片
        assert_eq!(cache.stats().steals, 1);
    }

    #[test]
    fn test_pin_keeps_slot_indexed() {
        let cache = cache(2, 1);

        let buf = cache.fetch(1, 7).unwrap();
        let id = buf.id();
        assert_eq!(cache.pin(id).unwrap(), 2);
        buf.release().unwrap();

        assert_eq!(cache.ref_count(id).unwrap(), 1);
        let report = cache.audit().unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.free, 1);

        // unpin 到 0 后仍留在索引中
        assert_eq!(cache.unpin(id).unwrap(), 0);
        let report = cache.audit().unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.unreferenced, 1);

        // 再次 fetch 命中，释放后回到空闲链表
        let buf = cache.fetch(1, 7).unwrap();
        assert_eq!(buf.id(), id);
        buf.release().unwrap();
        assert_eq!(cache.device().read_count(), 1);
        let report = cache.audit().unwrap();
        assert_eq!(report.free, 2);
        assert_eq!(report.unreferenced, 0);
    }

    #[test]
    fn test_unpin_at_zero_is_corruption() {
        let cache = cache(2, 1);
        let buf = cache.fetch(1, 7).unwrap();
        let id = buf.id();
        cache.pin(id).unwrap();
        drop(buf);
        cache.unpin(id).unwrap();

        let err = cache.unpin(id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_pin_free_slot_rejected() {
        let cache = cache(2, 1);
        let buf = cache.fetch(1, 7).unwrap();
        let id = buf.id();
        drop(buf);

        assert_eq!(cache.pin(id).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(cache.unpin(id).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(
            cache.pin(SlotId::new(99)).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_device_fault_returns_reference() {
        let cache = cache(2, 1);
        cache.device().fail_block(1, 9);

        let err = cache.fetch(1, 9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!err.is_fatal());
        assert_eq!(cache.free_count(), 2);

        cache.device().heal();
        let buf = cache.fetch(1, 9).unwrap();
        assert!(buf.is_valid());
    }

    #[test]
    fn test_init_stamps_recency() {
        let cache = cache(3, 1);
        for i in 0..3 {
            assert_eq!(cache.last_used(SlotId::new(i)).unwrap(), 0);
        }
    }

    #[test]
    fn test_last_used_advances_on_hit() {
        let cache = cache(2, 1);
        let buf = cache.fetch(1, 1).unwrap();
        let id = buf.id();
        cache.pin(id).unwrap();
        drop(buf);
        let before = cache.last_used(id).unwrap();

        let buf = cache.fetch(1, 1).unwrap();
        drop(buf);
        assert!(cache.last_used(id).unwrap() > before);
        cache.unpin(id).unwrap();
    }

    #[test]
    fn test_commit_flushes_device() {
        let cache = cache(2, 1);
        let mut buf = cache.fetch(1, 3).unwrap();
        buf.data_mut()[0] = 7;
        buf.commit().unwrap();
        assert_eq!(cache.device().flush_count(), 1);
        assert_eq!(cache.device().write_count(), 1);
        buf.release().unwrap();
    }

    #[test]
    fn test_large_index_builds() {
        let config = CacheConfig::default()
            .with_nbuf(1 << 16)
            .with_buckets(1 << 16)
            .with_shards(64)
            .with_block_size(8);
        let cache = BufCache::new(config, MemDevice::new(8)).unwrap();
        assert_eq!(cache.free_count(), 1 << 16);
    }

    #[test]
    fn test_concurrent_increments() {
        const THREADS: u32 = 8;
        const ROUNDS: u32 = 200;
        const BLOCKS: u32 = 24;

        let config = CacheConfig::default()
            .with_nbuf(16)
            .with_buckets(5)
            .with_shards(4)
            .with_block_size(BS);
        let cache = BufCache::new(config, MemDevice::new(BS)).unwrap();

        thread::scope(|s| {
            for t in 0..THREADS {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..ROUNDS {
                        let blockno = (t * 7 + i) % BLOCKS;
                        let mut buf = cache.fetch(1, blockno).unwrap();
                        let data = buf.data_mut();
                        let cnt = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                        data[..4].copy_from_slice(&(cnt + 1).to_le_bytes());
                        buf.commit().unwrap();
                        buf.release().unwrap();
                    }
                });
            }
        });

        let total: u32 = (0..BLOCKS)
            .map(|b| {
                let block = cache.device().load(1, b);
                u32::from_le_bytes([block[0], block[1], block[2], block[3]])
            })
            .sum();
        assert_eq!(total, THREADS * ROUNDS);
        assert_eq!(cache.stats().writes, u64::from(THREADS * ROUNDS));

        let report = cache.audit().unwrap();
        assert_eq!(report.free, 16);
        assert_eq!(report.indexed, 0);
    }
}
