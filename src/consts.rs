//! 介质几何常量定义
//!
//! 这个模块包含磁盘 I/O 层用到的所有尺寸常量：
//! - 逻辑扇区大小
//! - NOR flash 擦除块 / 页 / 缓存半区大小
//! - 各介质默认容量与擦除粒度
//! - FAT 时间戳占位值

//=============================================================================
// 逻辑扇区
//=============================================================================

/// 逻辑扇区大小（字节），文件系统的 I/O 粒度
pub const SECTOR_SIZE: usize = 512;

/// 扇区地址转字节偏移的移位量（512 = 1 << 9）
pub const SECTOR_SHIFT: u32 = 9;

//=============================================================================
// NOR flash 几何
//=============================================================================

/// 擦除块大小（64 KiB）
pub const ERASE_BLOCK_SIZE: usize = 65536;

/// 字节偏移转擦除块号的移位量（65536 = 1 << 16）
pub const ERASE_BLOCK_SHIFT: u32 = 16;

/// 缓存半区大小（32 KiB），两个半区拼成一个擦除块
pub const HALF_BUFFER_SIZE: usize = ERASE_BLOCK_SIZE / 2;

/// 编程页大小（256 字节）
pub const PAGE_SIZE: usize = 256;

/// 每个擦除块的页数
pub const PAGES_PER_ERASE_BLOCK: usize = ERASE_BLOCK_SIZE / PAGE_SIZE;

/// 每个擦除块包含的逻辑扇区数
pub const SECTORS_PER_ERASE_BLOCK: u32 = (ERASE_BLOCK_SIZE / SECTOR_SIZE) as u32;

/// flash 介质默认扇区总数（16 MiB）
pub const FLASH_DEFAULT_SECTOR_COUNT: u32 = 32768;

//=============================================================================
// SD/MMC
//=============================================================================

/// SD/MMC 块大小
pub const MMCSD_BLOCK_SIZE: usize = 512;

/// SD/MMC 默认擦除粒度（扇区数）
pub const MMCSD_ERASE_BLOCK_SECTORS: u32 = 256;

//=============================================================================
// 忙等待
//=============================================================================

/// 默认最大轮询次数
pub const DEFAULT_MAX_POLLS: u32 = 1_000_000;

/// 默认初始退避（spin_loop 次数）
pub const DEFAULT_INITIAL_BACKOFF: u32 = 1;

/// 默认最大退避（spin_loop 次数）
pub const DEFAULT_MAX_BACKOFF: u32 = 1024;

//=============================================================================
// FAT 时间戳
//=============================================================================

/// 没有 RTC 时使用的占位时间戳：1980-01-01 00:00:00
///
/// 日期位于高 16 位：day=1 (bit 16)，month=1 (bit 21)，year=0 (1980)
pub const FAT_PLACEHOLDER_TIMESTAMP: u32 = (1 << 21) | (1 << 16);
