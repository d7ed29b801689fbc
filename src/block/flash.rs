//! 四线 SPI NOR flash 介质
//!
//! 读请求一次性直接读 flash；写请求交给扇区转换层，经擦除块缓存
//! 完成 "读 → 改 → 擦 → 写"。缓存、传输层和驱动器状态放在同一把
//! 自旋锁后面，同一时刻只有一个操作能访问它们。
//!
//! # 状态机
//!
//! ```text
//! Uninitialized ──initialize──▶ Ready ⇄ {Loading, Staging, Flushing}
//! ```
//!
//! Loading / Staging / Flushing 只在一次 `write` 调用内部出现，
//! 调用之间可见的只有 Ready。

use super::ioctl::{put_dword, put_word};
use super::{sector_count, ControlCode, DiskIo, DiskStatus};
use crate::{
    cache::{CacheStats, EraseBlockCache, Residency},
    consts::{FLASH_DEFAULT_SECTOR_COUNT, SECTORS_PER_ERASE_BLOCK, SECTOR_SHIFT, SECTOR_SIZE},
    error::{Error, ErrorKind, Result},
    translate::{check_range, erase_block_index, write_sectors, WriteSummary},
    transport::{wait_ready, PollConfig, QspiTransport},
};
use spin::Mutex;

/// flash 介质配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    /// 介质扇区总数
    pub sector_count: u32,
    /// 忙等待配置
    pub poll: PollConfig,
    /// 干净的驻留块刷新时跳过擦除/编程
    pub skip_clean_flush: bool,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            sector_count: FLASH_DEFAULT_SECTOR_COUNT,
            poll: PollConfig::default(),
            skip_clean_flush: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveState {
    Uninitialized,
    Ready,
}

struct FlashInner<T> {
    transport: T,
    cache: EraseBlockCache,
    state: DriveState,
    /// 最近一次批量写入的结果
    last_write: WriteSummary,
}

impl<T: QspiTransport> FlashInner<T> {
    fn status(&self) -> DiskStatus {
        let mut status = DiskStatus::empty();
        if self.state != DriveState::Ready || !self.transport.is_ready() {
            status |= DiskStatus::NOINIT;
        }
        if self.transport.is_write_protected() {
            status |= DiskStatus::PROTECT;
        }
        status
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.status().contains(DiskStatus::NOINIT) {
            return Err(Error::new(ErrorKind::NotReady, "flash drive not initialized"));
        }
        Ok(())
    }

    /// 先把上次失败的写回补上，保证 flash 内容与缓存一致
    fn recover(&mut self, poll: &PollConfig) -> Result<()> {
        self.cache.recover(&mut self.transport, poll)
    }
}

/// 四线 SPI NOR flash 块设备
pub struct FlashDisk<T> {
    inner: Mutex<FlashInner<T>>,
    config: FlashConfig,
}

impl<T: QspiTransport> FlashDisk<T> {
    /// 创建 flash 介质（未初始化）
    pub fn new(transport: T, config: FlashConfig) -> Self {
        Self {
            inner: Mutex::new(FlashInner {
                transport,
                cache: EraseBlockCache::new(config.skip_clean_flush),
                state: DriveState::Uninitialized,
                last_write: WriteSummary::default(),
            }),
            config,
        }
    }

    /// 介质配置
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// 缓存统计信息
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.lock().cache.stats()
    }

    /// 缓存驻留状态
    pub fn residency(&self) -> Residency {
        self.inner.lock().cache.residency()
    }

    /// 最近一次批量写入的结果
    pub fn last_write(&self) -> WriteSummary {
        self.inner.lock().last_write
    }

    /// 在持锁状态下访问传输层
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock().transport)
    }

    /// 取回传输层
    pub fn into_transport(self) -> T {
        self.inner.into_inner().transport
    }
}

impl<T: QspiTransport> DiskIo for FlashDisk<T> {
    fn initialize(&self) -> DiskStatus {
        let mut inner = self.inner.lock();

        if inner.cache.is_poisoned() {
            log::warn!("[DISKIO] flash initialize discards poisoned cache {:?}", inner.cache.residency());
        }
        inner.cache.invalidate();
        inner.state = DriveState::Uninitialized;

        match inner.transport.enter_quad_mode() {
            Ok(()) => {
                inner.state = DriveState::Ready;
                log::debug!("[DISKIO] flash initialized, {} sectors", self.config.sector_count);
            }
            Err(err) => log::error!("[DISKIO] flash quad mode failed: {}", err),
        }

        inner.status()
    }

    fn status(&self) -> DiskStatus {
        self.inner.lock().status()
    }

    fn read(&self, lba: u32, buf: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;

        let count = sector_count(buf.len())?;
        check_range(lba, count, self.config.sector_count, buf.len())?;
        if count == 0 {
            return Ok(());
        }
        let offset = byte_offset(lba, count)?;

        // 补写失败时中毒块只有缓存里的副本可信，其余扇区照常读 flash
        let poisoned = match inner.recover(&self.config.poll) {
            Ok(()) => None,
            Err(err) => match inner.cache.residency() {
                Residency::Poisoned(block) => {
                    log::warn!("[DISKIO] flash read serves block {} from cache: {}", block, err);
                    Some(block)
                }
                _ => return Err(err),
            },
        };

        log::trace!("[DISKIO] flash read lba={} count={}", lba, count);
        let first = erase_block_index(lba);
        let last = erase_block_index(lba + count - 1);
        if poisoned != Some(first) || first != last {
            wait_ready(&mut inner.transport, &self.config.poll)?;
            inner.transport.raw_read(offset, buf)?;
        }

        if let Some(block) = poisoned {
            for (i, dst) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate() {
                let sector = lba + i as u32;
                if erase_block_index(sector) == block {
                    inner.cache.read_sector(sector, dst)?;
                }
            }
        }
        Ok(())
    }

    fn write(&self, lba: u32, buf: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.ensure_ready()?;
        if inner.transport.is_write_protected() {
            return Err(Error::new(ErrorKind::WriteProtected, "flash drive is write protected"));
        }

        let count = sector_count(buf.len())?;
        check_range(lba, count, self.config.sector_count, buf.len())?;
        byte_offset(lba, count)?;

        inner.recover(&self.config.poll)?;

        log::trace!("[DISKIO] flash write lba={} count={}", lba, count);
        inner.last_write = write_sectors(
            &mut inner.cache,
            &mut inner.transport,
            &self.config.poll,
            lba,
            buf,
        )?;
        Ok(())
    }

    fn ioctl(&self, code: ControlCode, arg: &mut [u8]) -> Result<()> {
        match code {
            // 每次写入结束都已写回，这里只处理上次失败遗留的中毒块
            ControlCode::Sync => {
                let mut inner = self.inner.lock();
                inner.recover(&self.config.poll)
            }
            ControlCode::GetSectorSize => put_word(arg, SECTOR_SIZE as u16),
            ControlCode::GetSectorCount => put_dword(arg, self.config.sector_count),
            ControlCode::GetBlockSize => put_dword(arg, SECTORS_PER_ERASE_BLOCK),
            ControlCode::EraseSector => Err(Error::new(
                ErrorKind::Unsupported,
                "flash medium does not support erase-range requests",
            )),
        }
    }
}

/// 扇区范围对应的 flash 字节偏移，整个范围必须落在 32 位地址空间内
fn byte_offset(lba: u32, count: u32) -> Result<u32> {
    let end = (lba as u64 + count as u64) << SECTOR_SHIFT;
    if end > u32::MAX as u64 + 1 {
        return Err(Error::new(ErrorKind::InvalidInput, "sector beyond 32-bit address space"));
    }
    Ok(lba << SECTOR_SHIFT)
}

impl<T> core::fmt::Debug for FlashDisk<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlashDisk")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ERASE_BLOCK_SIZE;
    use crate::transport::mock::MockFlash;
    use alloc::vec;
    use alloc::vec::Vec;
    use byteorder::{ByteOrder, NativeEndian};

    const BLOCKS: u32 = 4;

    fn config() -> FlashConfig {
        FlashConfig {
            sector_count: BLOCKS * SECTORS_PER_ERASE_BLOCK,
            poll: PollConfig::with_max_polls(64),
            skip_clean_flush: true,
        }
    }

    fn ready_disk() -> FlashDisk<MockFlash> {
        let disk = FlashDisk::new(MockFlash::new(BLOCKS).with_busy_ticks(2, 8), config());
        assert_eq!(disk.initialize(), DiskStatus::empty());
        disk
    }

    fn pattern(sectors: usize, seed: u8) -> Vec<u8> {
        (0..sectors * SECTOR_SIZE)
            .map(|i| (i as u8).wrapping_mul(13) ^ seed)
            .collect()
    }

    #[test]
    fn test_uninitialized_status() {
        let disk = FlashDisk::new(MockFlash::new(1), config());
        assert_eq!(disk.status(), DiskStatus::NOINIT);
    }

    #[test]
    fn test_initialize_enters_quad_mode() {
        let disk = ready_disk();
        assert_eq!(disk.status(), DiskStatus::empty());
        assert_eq!(disk.with_transport(|t| t.stats().quad_mode_entries), 1);
        assert_eq!(disk.residency(), Residency::Empty);
    }

    #[test]
    fn test_initialize_failure_reports_noinit() {
        let mut flash = MockFlash::new(1);
        flash.set_fail_quad_mode(true);
        let disk = FlashDisk::new(flash, config());
        assert_eq!(disk.initialize(), DiskStatus::NOINIT);
    }

    #[test]
    fn test_controller_not_ready_reports_noinit() {
        let disk = ready_disk();
        disk.with_transport(|t| t.set_ready(false));
        assert_eq!(disk.status(), DiskStatus::NOINIT);
    }

    #[test]
    fn test_not_ready_does_not_touch_transport() {
        let disk = FlashDisk::new(MockFlash::new(1), config());
        let mut buf = vec![0u8; SECTOR_SIZE];

        let err = disk.read(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        let err = disk.write(0, &buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);

        assert_eq!(disk.with_transport(|t| t.stats().total_ops()), 0);
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let disk = ready_disk();
        let data = pattern(128, 0x5A);

        disk.write(128, &data).unwrap();
        let mut out = vec![0u8; data.len()];
        disk.read(128, &mut out).unwrap();
        assert_eq!(out, data);

        assert_eq!(disk.residency(), Residency::Empty);
        assert_eq!(disk.with_transport(|t| t.stats().program_over_unerased), 0);
    }

    #[test]
    fn test_read_is_single_raw_transfer() {
        let disk = ready_disk();
        disk.with_transport(|t| {
            t.preload(3 * SECTOR_SIZE, &[0xAB; 2 * SECTOR_SIZE]);
            t.reset_stats();
        });

        let mut out = vec![0u8; 2 * SECTOR_SIZE];
        disk.read(3, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xAB));
        assert_eq!(disk.with_transport(|t| t.stats().reads), 1);
        assert_eq!(disk.cache_stats().loads, 0);
    }

    #[test]
    fn test_straddling_write() {
        let disk = ready_disk();
        let data = pattern(3, 0x11);

        disk.write(127, &data).unwrap();
        assert_eq!(disk.last_write().transitions, 1);

        let mut out = vec![0u8; data.len()];
        disk.read(127, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_write_protected_leaves_cache_untouched() {
        let disk = ready_disk();
        disk.with_transport(|t| {
            t.set_write_protected(true);
            t.reset_stats();
        });
        assert_eq!(disk.status(), DiskStatus::PROTECT);

        let before = disk.cache_stats();
        let err = disk.write(0, &[0u8; SECTOR_SIZE]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteProtected);
        assert_eq!(disk.cache_stats(), before);
        assert_eq!(disk.residency(), Residency::Empty);
        assert_eq!(disk.with_transport(|t| t.stats().total_ops()), 0);
    }

    #[test]
    fn test_out_of_range_is_bad_parameter() {
        let disk = ready_disk();
        let capacity = config().sector_count;
        let mut buf = vec![0u8; 2 * SECTOR_SIZE];

        assert_eq!(disk.read(capacity - 1, &mut buf).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(disk.write(capacity - 1, &buf).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(disk.write(0, &buf[..100]).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_failed_write_poisons_then_sync_recovers() {
        let disk = ready_disk();
        let data = pattern(1, 0x42);
        disk.with_transport(|t| t.fail_program_at(Some(5)));

        let err = disk.write(200, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(disk.residency(), Residency::Poisoned(1));

        disk.with_transport(|t| t.fail_program_at(None));
        disk.ioctl(ControlCode::Sync, &mut []).unwrap();
        assert_eq!(disk.residency(), Residency::Empty);

        let mut out = vec![0u8; SECTOR_SIZE];
        disk.read(200, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_next_write_recovers_poisoned_block() {
        let disk = ready_disk();
        let first = pattern(1, 1);
        let second = pattern(1, 2);
        disk.with_transport(|t| t.fail_program_at(Some(0)));
        assert!(disk.write(0, &first).is_err());

        disk.with_transport(|t| t.fail_program_at(None));
        disk.write(3 * 128, &second).unwrap();

        let mut out = vec![0u8; SECTOR_SIZE];
        disk.read(0, &mut out).unwrap();
        assert_eq!(out, first);
        disk.read(3 * 128, &mut out).unwrap();
        assert_eq!(out, second);
    }

    #[test]
    fn test_reads_survive_unrecoverable_block() {
        let disk = ready_disk();
        let data = pattern(1, 0x3C);
        disk.with_transport(|t| t.set_fail_erases(true));

        let err = disk.write(0, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(disk.residency(), Residency::Poisoned(0));

        // 未触及的块直接读 flash
        let mut out = vec![0u8; SECTOR_SIZE];
        disk.read(3 * 128, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xFF));

        // 中毒块内的扇区由缓存提供，不发起 flash 读
        disk.with_transport(|t| t.reset_stats());
        disk.read(0, &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(disk.with_transport(|t| t.stats().reads), 0);

        // 跨越中毒块和相邻块
        disk.with_transport(|t| t.preload(128 * SECTOR_SIZE, &[0x99; SECTOR_SIZE]));
        let mut span = vec![0u8; 2 * SECTOR_SIZE];
        disk.read(127, &mut span).unwrap();
        assert!(span[..SECTOR_SIZE].iter().all(|&b| b == 0xFF));
        assert!(span[SECTOR_SIZE..].iter().all(|&b| b == 0x99));
        assert_eq!(disk.residency(), Residency::Poisoned(0));

        disk.with_transport(|t| t.set_fail_erases(false));
        disk.ioctl(ControlCode::Sync, &mut []).unwrap();
        assert_eq!(disk.residency(), Residency::Empty);
        disk.read(0, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_stuck_busy_reports_timeout() {
        let disk = ready_disk();
        disk.with_transport(|t| t.set_stuck_busy(true));

        let err = disk.write(0, &[1u8; SECTOR_SIZE]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HardwareTimeout);
    }

    #[test]
    fn test_ioctl_geometry() {
        let disk = ready_disk();
        let mut arg = [0u8; 8];

        disk.ioctl(ControlCode::GetSectorSize, &mut arg).unwrap();
        assert_eq!(NativeEndian::read_u16(&arg), 512);

        disk.ioctl(ControlCode::GetSectorCount, &mut arg).unwrap();
        assert_eq!(NativeEndian::read_u32(&arg), BLOCKS * SECTORS_PER_ERASE_BLOCK);

        disk.ioctl(ControlCode::GetBlockSize, &mut arg).unwrap();
        assert_eq!(NativeEndian::read_u32(&arg), 128);

        disk.ioctl(ControlCode::Sync, &mut arg).unwrap();
    }

    #[test]
    fn test_ioctl_erase_is_unsupported() {
        let disk = ready_disk();
        let mut arg = [0u8; 8];
        let err = disk.ioctl(ControlCode::EraseSector, &mut arg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_default_config() {
        let cfg = FlashConfig::default();
        assert_eq!(cfg.sector_count, 32768);
        assert_eq!(cfg.sector_count as usize * SECTOR_SIZE, 256 * ERASE_BLOCK_SIZE);
        assert!(cfg.skip_clean_flush);
    }
}
