//! 错误类型定义
//!
//! 提供磁盘 I/O 层（介质适配、扇区转换、擦除块缓存）的错误类型。

use core::fmt;

/// 磁盘 I/O 错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 介质未初始化或未就绪
    NotReady,
    /// 介质写保护
    WriteProtected,
    /// 驱动器号上没有介质
    NoMedium,
    /// 无效参数（扇区越界、缓冲区长度不符等）
    InvalidInput,
    /// I/O 错误（传输层读写/擦除失败）
    Io,
    /// 硬件超时（忙标志始终不清除）
    HardwareTimeout,
    /// 无效状态（缓存不一致）
    InvalidState,
    /// 不支持的操作
    Unsupported,
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
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
