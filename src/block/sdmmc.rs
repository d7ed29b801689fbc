//! SD/MMC 介质
//!
//! SD/MMC 卡原生支持扇区读写和擦除，不经过擦除块缓存，
//! 这里只把请求透传给外部驱动并转换状态/错误。
//!
//! - [`MmcSpiDisk`] - SPI 接口的 MMC/SD 卡，使用顺序读写原语
//! - [`SdcDisk`] - SDIO 控制器，使用块读写原语

use super::ioctl::{get_erase_range, put_dword, put_word};
use super::{sector_count, ControlCode, DiskIo, DiskStatus};
use crate::{
    consts::{MMCSD_BLOCK_SIZE, MMCSD_ERASE_BLOCK_SECTORS},
    error::{Error, ErrorKind, Result},
};
use spin::Mutex;

/// SPI 接口 MMC/SD 卡驱动
///
/// 卡由外部完成初始化，这里只使用状态查询和顺序读写。
pub trait MmcDriver {
    /// 驱动是否处于就绪状态
    fn is_ready(&self) -> bool;

    /// 写保护开关
    fn is_write_protected(&self) -> bool;

    /// 开始从 `lba` 顺序读
    fn start_sequential_read(&mut self, lba: u32) -> Result<()>;

    /// 顺序读一个块
    fn sequential_read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// 结束顺序读
    fn stop_sequential_read(&mut self) -> Result<()>;

    /// 开始从 `lba` 顺序写
    fn start_sequential_write(&mut self, lba: u32) -> Result<()>;

    /// 顺序写一个块
    fn sequential_write(&mut self, buf: &[u8]) -> Result<()>;

    /// 结束顺序写
    fn stop_sequential_write(&mut self) -> Result<()>;

    /// 擦除 [start, end] 扇区
    fn erase(&mut self, start: u32, end: u32) -> Result<()>;

    /// 卡容量（扇区数）
    fn capacity(&self) -> u32;
}

/// SDIO 控制器驱动
pub trait SdcDriver {
    /// 驱动是否处于就绪状态
    fn is_ready(&self) -> bool;

    /// 写保护开关
    fn is_write_protected(&self) -> bool;

    /// 从 `lba` 读取 `buf.len() / 512` 个块
    fn read(&mut self, lba: u32, buf: &mut [u8]) -> Result<()>;

    /// 从 `lba` 写入 `buf.len() / 512` 个块
    fn write(&mut self, lba: u32, buf: &[u8]) -> Result<()>;

    /// 擦除 [start, end] 扇区
    fn erase(&mut self, start: u32, end: u32) -> Result<()>;

    /// 卡容量（扇区数）
    fn capacity(&self) -> u32;
}

fn card_status(ready: bool, write_protected: bool) -> DiskStatus {
    let mut status = DiskStatus::empty();
    if !ready {
        status |= DiskStatus::NOINIT;
    }
    if write_protected {
        status |= DiskStatus::PROTECT;
    }
    status
}

const NOT_READY: Error = Error::new(ErrorKind::NotReady, "card driver not ready");
const WRITE_PROTECTED: Error = Error::new(ErrorKind::WriteProtected, "card is write protected");

/// SPI 接口 MMC/SD 卡块设备
pub struct MmcSpiDisk<D> {
    driver: Mutex<D>,
    erase_block_sectors: u32,
}

impl<D: MmcDriver> MmcSpiDisk<D> {
    /// 创建块设备，擦除粒度使用默认的 256 扇区
    pub fn new(driver: D) -> Self {
        Self::with_erase_block(driver, MMCSD_ERASE_BLOCK_SECTORS)
    }

    /// 指定擦除粒度（扇区数）
    pub fn with_erase_block(driver: D, erase_block_sectors: u32) -> Self {
        Self {
            driver: Mutex::new(driver),
            erase_block_sectors,
        }
    }

    /// 在持锁状态下访问驱动
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.driver.lock())
    }
}

impl<D: MmcDriver> DiskIo for MmcSpiDisk<D> {
    fn initialize(&self) -> DiskStatus {
        // 卡在外部初始化，这里只读状态
        self.status()
    }

    fn status(&self) -> DiskStatus {
        let driver = self.driver.lock();
        card_status(driver.is_ready(), driver.is_write_protected())
    }

    fn read(&self, lba: u32, buf: &mut [u8]) -> Result<()> {
        let mut driver = self.driver.lock();
        if !driver.is_ready() {
            return Err(NOT_READY);
        }
        if sector_count(buf.len())? == 0 {
            return Ok(());
        }

        driver.start_sequential_read(lba)?;
        let transferred = buf
            .chunks_exact_mut(MMCSD_BLOCK_SIZE)
            .try_for_each(|block| driver.sequential_read(block));
        // 出错也要结束顺序传输，返回最先出现的错误
        let stopped = driver.stop_sequential_read();
        transferred.and(stopped)
    }

    fn write(&self, lba: u32, buf: &[u8]) -> Result<()> {
        let mut driver = self.driver.lock();
        if !driver.is_ready() {
            return Err(NOT_READY);
        }
        if driver.is_write_protected() {
            return Err(WRITE_PROTECTED);
        }
        if sector_count(buf.len())? == 0 {
            return Ok(());
        }

        driver.start_sequential_write(lba)?;
        let transferred = buf
            .chunks_exact(MMCSD_BLOCK_SIZE)
            .try_for_each(|block| driver.sequential_write(block));
        let stopped = driver.stop_sequential_write();
        transferred.and(stopped)
    }

    fn ioctl(&self, code: ControlCode, arg: &mut [u8]) -> Result<()> {
        match code {
            ControlCode::Sync => Ok(()),
            ControlCode::GetSectorSize => put_word(arg, MMCSD_BLOCK_SIZE as u16),
            ControlCode::GetSectorCount => put_dword(arg, self.driver.lock().capacity()),
            ControlCode::GetBlockSize => put_dword(arg, self.erase_block_sectors),
            ControlCode::EraseSector => {
                let (start, end) = get_erase_range(arg)?;
                log::debug!("[DISKIO] mmc erase {}..={}", start, end);
                self.driver.lock().erase(start, end)
            }
        }
    }
}

/// SDIO 块设备
pub struct SdcDisk<D> {
    driver: Mutex<D>,
}

impl<D: SdcDriver> SdcDisk<D> {
    /// 创建块设备
    pub fn new(driver: D) -> Self {
        Self {
            driver: Mutex::new(driver),
        }
    }

    /// 在持锁状态下访问驱动
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.driver.lock())
    }
}

impl<D: SdcDriver> DiskIo for SdcDisk<D> {
    fn initialize(&self) -> DiskStatus {
        self.status()
    }

    fn status(&self) -> DiskStatus {
        let driver = self.driver.lock();
        card_status(driver.is_ready(), driver.is_write_protected())
    }

    fn read(&self, lba: u32, buf: &mut [u8]) -> Result<()> {
        let mut driver = self.driver.lock();
        if !driver.is_ready() {
            return Err(NOT_READY);
        }
        if sector_count(buf.len())? == 0 {
            return Ok(());
        }
        driver.read(lba, buf)
    }

    fn write(&self, lba: u32, buf: &[u8]) -> Result<()> {
        let mut driver = self.driver.lock();
        if !driver.is_ready() {
            return Err(NOT_READY);
        }
        if driver.is_write_protected() {
            return Err(WRITE_PROTECTED);
        }
        if sector_count(buf.len())? == 0 {
            return Ok(());
        }
        driver.write(lba, buf)
    }

    fn ioctl(&self, code: ControlCode, arg: &mut [u8]) -> Result<()> {
        match code {
            ControlCode::Sync => Ok(()),
            ControlCode::GetSectorSize => put_word(arg, MMCSD_BLOCK_SIZE as u16),
            ControlCode::GetSectorCount => put_dword(arg, self.driver.lock().capacity()),
            ControlCode::GetBlockSize => put_dword(arg, MMCSD_ERASE_BLOCK_SECTORS),
            ControlCode::EraseSector => {
                let (start, end) = get_erase_range(arg)?;
                log::debug!("[DISKIO] sdc erase {}..={}", start, end);
                self.driver.lock().erase(start, end)
            }
        }
    }
}
