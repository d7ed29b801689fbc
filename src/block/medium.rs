//! 介质分派
//!
//! [`Medium`] 把三种介质收拢到一个枚举里，[`DiskTable`] 按驱动器号
//! 分派 FatFs 风格的 `disk_*` 调用并把错误转换为 [`DiskResult`]。

use super::{ControlCode, DiskIo, DiskResult, DiskStatus, FlashDisk};
use crate::{
    consts::SECTOR_SIZE,
    error::{Error, ErrorKind, Result},
};
use alloc::vec::Vec;

/// 介质类型
pub enum Medium<F, M, S> {
    /// 板载 QSPI NOR flash
    Flash(F),
    /// SPI 接口 MMC/SD 卡
    Mmc(M),
    /// SDIO 卡
    Sdc(S),
}

impl<F: DiskIo, M: DiskIo, S: DiskIo> Medium<F, M, S> {
    fn as_disk(&self) -> &dyn DiskIo {
        match self {
            Medium::Flash(disk) => disk,
            Medium::Mmc(disk) => disk,
            Medium::Sdc(disk) => disk,
        }
    }

    /// 介质名，用于日志
    pub fn kind_name(&self) -> &'static str {
        match self {
            Medium::Flash(_) => "flash",
            Medium::Mmc(_) => "mmc",
            Medium::Sdc(_) => "sdc",
        }
    }
}

impl<F: DiskIo, M: DiskIo, S: DiskIo> DiskIo for Medium<F, M, S> {
    fn initialize(&self) -> DiskStatus {
        self.as_disk().initialize()
    }

    fn status(&self) -> DiskStatus {
        self.as_disk().status()
    }

    fn read(&self, lba: u32, buf: &mut [u8]) -> Result<()> {
        self.as_disk().read(lba, buf)
    }

    fn write(&self, lba: u32, buf: &[u8]) -> Result<()> {
        self.as_disk().write(lba, buf)
    }

    fn ioctl(&self, code: ControlCode, arg: &mut [u8]) -> Result<()> {
        self.as_disk().ioctl(code, arg)
    }
}

/// 占位介质
///
/// 用于只挂载部分介质类型的配置，例如只有 flash 的板子可以用
/// `Medium<FlashDisk<_>, Unattached, Unattached>`。
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattached;

const NO_MEDIUM: Error = Error::new(ErrorKind::NoMedium, "no medium attached");

impl DiskIo for Unattached {
    fn initialize(&self) -> DiskStatus {
        DiskStatus::NOINIT | DiskStatus::NODISK
    }

    fn status(&self) -> DiskStatus {
        DiskStatus::NOINIT | DiskStatus::NODISK
    }

    fn read(&self, _lba: u32, _buf: &mut [u8]) -> Result<()> {
        Err(NO_MEDIUM)
    }

    fn write(&self, _lba: u32, _buf: &[u8]) -> Result<()> {
        Err(NO_MEDIUM)
    }

    fn ioctl(&self, _code: ControlCode, _arg: &mut [u8]) -> Result<()> {
        Err(NO_MEDIUM)
    }
}

/// 只有 flash 的介质
pub type FlashOnly<T> = Medium<FlashDisk<T>, Unattached, Unattached>;

/// 驱动器表
///
/// 驱动器号是表下标，空槽位和越界下标都视为“没有介质”。
pub struct DiskTable<F, M, S> {
    drives: Vec<Option<Medium<F, M, S>>>,
}

impl<F: DiskIo, M: DiskIo, S: DiskIo> DiskTable<F, M, S> {
    /// 创建空表
    pub const fn new() -> Self {
        Self { drives: Vec::new() }
    }

    /// 把介质挂到驱动器号 `drv`，返回原来的介质
    pub fn attach(&mut self, drv: u8, medium: Medium<F, M, S>) -> Option<Medium<F, M, S>> {
        let index = drv as usize;
        if self.drives.len() <= index {
            self.drives.resize_with(index + 1, || None);
        }
        log::debug!("[DISKIO] drive {} attached as {}", drv, medium.kind_name());
        self.drives[index].replace(medium)
    }

    /// 卸下驱动器号 `drv` 上的介质
    pub fn detach(&mut self, drv: u8) -> Option<Medium<F, M, S>> {
        self.drives.get_mut(drv as usize).and_then(Option::take)
    }

    /// 获取驱动器号上的介质
    pub fn get(&self, drv: u8) -> Option<&Medium<F, M, S>> {
        self.drives.get(drv as usize).and_then(Option::as_ref)
    }

    /// 初始化驱动器
    pub fn disk_initialize(&self, drv: u8) -> DiskStatus {
        match self.get(drv) {
            Some(medium) => {
                let status = medium.initialize();
                log::debug!("[DISKIO] drive {} initialize -> {:?}", drv, status);
                status
            }
            None => DiskStatus::NOINIT | DiskStatus::NODISK,
        }
    }

    /// 查询驱动器状态
    pub fn disk_status(&self, drv: u8) -> DiskStatus {
        match self.get(drv) {
            Some(medium) => medium.status(),
            None => DiskStatus::NOINIT | DiskStatus::NODISK,
        }
    }

    /// 从 `sector` 开始读 `count` 个扇区到 `buf`
    pub fn disk_read(&self, drv: u8, buf: &mut [u8], sector: u32, count: u32) -> DiskResult {
        let Some(medium) = self.get(drv) else {
            return DiskResult::ParameterError;
        };
        let Some(dst) = request_len(count).and_then(|len| buf.get_mut(..len)) else {
            return DiskResult::ParameterError;
        };
        report(drv, "read", medium.read(sector, dst))
    }

    /// 把 `buf` 中的 `count` 个扇区写到 `sector` 开始处
    pub fn disk_write(&self, drv: u8, buf: &[u8], sector: u32, count: u32) -> DiskResult {
        let Some(medium) = self.get(drv) else {
            return DiskResult::ParameterError;
        };
        let Some(src) = request_len(count).and_then(|len| buf.get(..len)) else {
            return DiskResult::ParameterError;
        };
        report(drv, "write", medium.write(sector, src))
    }

    /// 控制命令，`ctrl` 是原始命令码
    pub fn disk_ioctl(&self, drv: u8, ctrl: u8, buff: &mut [u8]) -> DiskResult {
        let Some(medium) = self.get(drv) else {
            return DiskResult::ParameterError;
        };
        let Some(code) = ControlCode::from_raw(ctrl) else {
            log::warn!("[DISKIO] drive {} unknown ioctl {}", drv, ctrl);
            return DiskResult::ParameterError;
        };
        report(drv, "ioctl", medium.ioctl(code, buff))
    }
}

impl<F: DiskIo, M: DiskIo, S: DiskIo> Default for DiskTable<F, M, S> {
    fn default() -> Self {
        Self::new()
    }
}

fn request_len(count: u32) -> Option<usize> {
    (count as usize).checked_mul(SECTOR_SIZE)
}

fn report(drv: u8, op: &str, result: Result<()>) -> DiskResult {
    if let Err(err) = &result {
        log::error!("[DISKIO] drive {} {} failed: {}", drv, op, err);
    }
    result.into()
}
