//! 块设备抽象
//!
//! block/device.rs 定义缓存消费的设备接口（整块同步读写）。
//! block/mem.rs 提供内存实现，用于测试和示例。

mod device;
mod mem;

pub use device::BlockDevice;
pub use mem::MemDevice;
