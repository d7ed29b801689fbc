//! 擦除块缓存模块
//!
//! NOR flash 只能整块（64 KiB）擦除、按页（256 字节）编程，而文件系统按
//! 512 字节扇区读写。本模块在内存里保存一个擦除块的完整镜像，扇区写入先
//! 暂存到镜像，离开该块或批次结束时再 "擦除 → 逐页编程" 写回。
//!
//! # 主要组件
//!
//! - [`HalfBuffers`] - 两个 32 KiB 半区组成的擦除块镜像
//! - [`EraseBlockCache`] - 驻留块跟踪、装载、暂存、写回
//! - [`CacheFlags`] - 缓存状态标志
//! - [`CacheStats`] - 缓存统计信息
//! - [`Residency`] - 驻留状态（空 / 驻留 / 中毒）
//!
//! # 不变量
//!
//! - 任意时刻最多一个擦除块驻留
//! - 半区内容只在非空状态下有意义
//! - 装载到写回之间，缓存是该块唯一权威的副本
//! - 写回失败不丢弃半区，缓存进入中毒状态等待恢复
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use qspi_diskio::cache::EraseBlockCache;
//! use qspi_diskio::transport::PollConfig;
//!
//! let poll = PollConfig::default();
//! let mut cache = EraseBlockCache::new(true);
//! cache.load(&mut qspi, &poll, 3)?;
//! cache.stage_sector(3 * 128 + 7, &sector)?;
//! cache.flush(&mut qspi, &poll)?;
//! cache.invalidate();
//! ```
//!
//! # 内存
//!
//! 镜像是两个定长数组，不做堆分配；一个缓存实例约占 64 KiB。

mod buffer;
mod erase_block;

pub use buffer::{CacheFlags, HalfBuffers};
pub use erase_block::{CacheStats, EraseBlockCache, Residency};
