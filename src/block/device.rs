//! 块设备接口

use std::sync::Arc;

use crate::error::Result;

/// 块设备接口
///
/// 缓冲区缓存通过此 trait 完成同步的整块读写。缓存可能在多个线程上
/// 同时对不同的块发起 I/O，因此方法接收 `&self`，实现需自行保证线程安全。
///
/// 读写要么完整成功，要么返回错误；缓存不会重试，也不会转换错误。
///
/// # 示例
///
/// ```rust,ignore
/// use sharded_bcache::{BlockDevice, Result};
///
/// struct MyDisk {
///     // ...
/// }
///
/// impl BlockDevice for MyDisk {
///     fn block_size(&self) -> usize {
///         1024
///     }
///
///     fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
///         // 从介质读取一块
///         Ok(())
///     }
///
///     fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
///         // 写入一块
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 读取一块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 目标缓冲区（长度等于 `block_size()`）
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()>;

    /// 写入一块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 源缓冲区（长度等于 `block_size()`）
    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()>;

    /// 把设备自身的写缓存落盘
    ///
    /// 缓存在每次 `write_block` 之后调用，保证提交同步完成。
    /// 没有写缓存的设备使用默认实现即可。
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Arc<D> {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(dev, blockno, buf)
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        (**self).write_block(dev, blockno, buf)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}
