//! 错误类型定义
//!
//! 提供缓冲区缓存操作的错误类型。
//!
//! 缓存层的错误分为两类：
//! - 可恢复错误：配置非法（`InvalidInput`）、设备 I/O 失败（`Io`，原样向上传递）
//! - 致命错误：调用方误用（`NotHeld`）、不变量被破坏（`Corrupted`）、
//!   缓冲区耗尽（`NoSpace`）。这些错误表示程序缺陷或容量配置错误，
//!   调用方应终止当前操作，不得重试。

use core::fmt;

/// 缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（来自块设备）
    Io,
    /// 无效参数
    InvalidInput,
    /// 调用方未持有缓冲块的内容锁
    NotHeld,
    /// 缓存内部状态损坏
    Corrupted,
    /// 所有缓冲块都在使用中
    NoSpace,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 是否为致命错误
    ///
    /// 致命错误不应被重试或吞掉，调用方应放弃当前操作。
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotHeld | ErrorKind::Corrupted | ErrorKind::NoSpace
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
