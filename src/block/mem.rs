//! 内存块设备
//!
//! 以稀疏表保存多个设备的块内容，未写过的块读出全零。
//! 记录物理读写次数，便于观察缓存命中情况；可注入单块故障。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use super::BlockDevice;
use crate::error::{Error, ErrorKind, Result};

/// 内存块设备
pub struct MemDevice {
    block_size: usize,
    blocks: Mutex<HashMap<(u32, u32), Vec<u8>>>,
    /// 读写该块时返回 I/O 错误
    faulty: Mutex<Option<(u32, u32)>>,
    /// 物理读取次数
    reads: AtomicU64,
    /// 物理写入次数
    writes: AtomicU64,
    /// 刷新次数
    flushes: AtomicU64,
}

impl MemDevice {
    /// 创建空设备
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Mutex::new(HashMap::new()),
            faulty: Mutex::new(None),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    /// 直接写入块内容（绕过计数）
    ///
    /// `data` 不足一块时以零填充，超出部分被截断。
    pub fn store(&self, dev: u32, blockno: u32, data: &[u8]) {
        let mut block = vec![0u8; self.block_size];
        let len = data.len().min(self.block_size);
        block[..len].copy_from_slice(&data[..len]);
        self.blocks.lock().insert((dev, blockno), block);
    }

    /// 直接读取块内容（绕过计数）
    pub fn load(&self, dev: u32, blockno: u32) -> Vec<u8> {
        self.blocks
            .lock()
            .get(&(dev, blockno))
            .cloned()
            .unwrap_or_else(|| vec![0u8; self.block_size])
    }

    /// 让指定块的读写失败
    pub fn fail_block(&self, dev: u32, blockno: u32) {
        *self.faulty.lock() = Some((dev, blockno));
    }

    /// 清除故障注入
    pub fn heal(&self) {
        *self.faulty.lock() = None;
    }

    /// 物理读取次数
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 物理写入次数
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// 刷新次数
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    fn check(&self, dev: u32, blockno: u32, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer size != block size"));
        }
        if *self.faulty.lock() == Some((dev, blockno)) {
            return Err(Error::new(ErrorKind::Io, "injected device fault"));
        }
        Ok(())
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        self.check(dev, blockno, buf.len())?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        match self.blocks.lock().get(&(dev, blockno)) {
            Some(block) => buf.copy_from_slice(block),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        self.check(dev, blockno, buf.len())?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.blocks.lock().insert((dev, blockno), buf.to_vec());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl core::fmt::Debug for MemDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemDevice")
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.lock().len())
            .field("reads", &self.read_count())
            .field("writes", &self.write_count())
            .field("flushes", &self.flush_count())
            .finish()
    }
}
