//! qspi_diskio: 面向 FAT 文件系统的磁盘 I/O 层
//!
//! 为 FatFs 风格的文件系统提供按扇区寻址的块设备，支持三种介质：
//! - **QSPI NOR flash**：用擦除块缓存模拟 512 字节扇区写入
//! - **SPI 接口 MMC/SD 卡**：透传给外部驱动
//! - **SDIO 卡**：透传给外部驱动
//!
//! # 示例
//!
//! ```rust,ignore
//! use qspi_diskio::{DiskIo, DiskTable, FlashConfig, FlashDisk, Medium, Unattached};
//!
//! let mut table: DiskTable<FlashDisk<MyQspi>, Unattached, Unattached> = DiskTable::new();
//! table.attach(0, Medium::Flash(FlashDisk::new(MyQspi::new(), FlashConfig::default())));
//!
//! table.disk_initialize(0);
//! let data = [0u8; 1024];
//! table.disk_write(0, &data, 127, 2);
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 几何常量
//! - [`transport`] - QSPI 传输接口和忙等待
//! - [`cache`] - 擦除块缓存
//! - [`translate`] - 扇区到擦除块的转换
//! - [`block`] - 块设备适配层和驱动器分派
//! - [`time`] - FAT 时间戳

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// QSPI 传输层
pub mod transport;

/// 擦除块缓存
pub mod cache;

/// 扇区转换
pub mod translate;

/// 块设备适配
pub mod block;

/// FAT 时间戳
pub mod time;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 传输层
pub use transport::{wait_ready, PollConfig, QspiTransport};

// 缓存
pub use cache::{CacheStats, EraseBlockCache, Residency};

// 扇区转换
pub use translate::{erase_block_index, write_sectors, WriteSummary};

// 块设备
pub use block::{
    ControlCode, DiskIo, DiskResult, DiskStatus, DiskTable, FlashConfig, FlashDisk, FlashOnly,
    Medium, MmcDriver, MmcSpiDisk, SdcDisk, SdcDriver, Unattached,
};

// 时间
pub use time::{get_fattime, FatTimestamp, TimeSource};
