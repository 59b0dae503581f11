//! 缓存配置

use crate::consts::{BSIZE, HASHSIZE, HOME_SHARD, NBUF, NSHARD};
use crate::error::{Error, ErrorKind, Result};

/// 缓冲区缓存配置
///
/// 容量在构造缓存时确定，此后不可更改。
///
/// # 示例
///
/// ```rust,ignore
/// let config = CacheConfig::default()
///     .with_nbuf(64)
///     .with_shards(4);
/// config.validate()?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓冲块数量
    pub nbuf: usize,
    /// 哈希桶数量
    pub buckets: usize,
    /// 分片（空闲链表）数量
    pub shards: usize,
    /// 块大小（字节）
    pub block_size: usize,
    /// 启动时接收全部缓冲块的分片
    pub home_shard: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            buckets: HASHSIZE,
            shards: NSHARD,
            block_size: BSIZE,
            home_shard: HOME_SHARD,
        }
    }
}

impl CacheConfig {
    /// 设置缓冲块数量
    pub fn with_nbuf(mut self, nbuf: usize) -> Self {
        self.nbuf = nbuf;
        self
    }

    /// 设置哈希桶数量
    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    /// 设置分片数量
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// 设置块大小
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// 设置初始分片
    pub fn with_home_shard(mut self, home_shard: usize) -> Self {
        self.home_shard = home_shard;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.nbuf == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "nbuf must be non-zero"));
        }
        if self.buckets == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "bucket count must be non-zero"));
        }
        if self.shards == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "shard count must be non-zero"));
        }
        if self.block_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "block size must be non-zero"));
        }
        if self.home_shard >= self.shards {
            return Err(Error::new(ErrorKind::InvalidInput, "home shard out of range"));
        }
        // SlotId 以 u32 存放
        if self.nbuf > u32::MAX as usize {
            return Err(Error::new(ErrorKind::InvalidInput, "too many buffers"));
        }
        Ok(())
    }
}
