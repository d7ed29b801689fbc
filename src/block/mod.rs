//! 块设备适配层
//!
//! 向文件系统提供统一的四个入口：状态、读、写、控制。
//! block/flash.rs 把写请求交给扇区转换和擦除块缓存，读请求直接读 flash；
//! block/sdmmc.rs 把请求直接透传给 SD/MMC 驱动（它们原生支持扇区读写擦除）；
//! block/medium.rs 按驱动器号分派到具体介质，并提供 FatFs 风格的返回码。

mod flash;
mod ioctl;
mod medium;
mod sdmmc;

pub use flash::{FlashConfig, FlashDisk};
pub use ioctl::ControlCode;
pub use medium::{DiskTable, FlashOnly, Medium, Unattached};
pub use sdmmc::{MmcDriver, MmcSpiDisk, SdcDisk, SdcDriver};

use crate::consts::SECTOR_SIZE;
use crate::error::{Error, ErrorKind, Result};
use bitflags::bitflags;

bitflags! {
    /// 介质状态位
    ///
    /// 对应 FatFs 的 `STA_*` 常量
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DiskStatus: u8 {
        /// 未初始化
        const NOINIT  = 0x01;
        /// 没有介质
        const NODISK  = 0x02;
        /// 写保护
        const PROTECT = 0x04;
    }
}

/// 块设备接口
///
/// 所有方法都只需要 `&self`，各介质在内部用锁保证同一时刻
/// 只有一个读/写/控制操作在执行。
///
/// 缓冲区长度必须是 512 的整数倍，扇区数由长度推出。
pub trait DiskIo {
    /// 初始化介质并返回状态
    fn initialize(&self) -> DiskStatus;

    /// 查询介质状态（不改变状态）
    fn status(&self) -> DiskStatus;

    /// 从 `lba` 开始读取 `buf.len() / 512` 个扇区
    fn read(&self, lba: u32, buf: &mut [u8]) -> Result<()>;

    /// 从 `lba` 开始写入 `buf.len() / 512` 个扇区
    fn write(&self, lba: u32, buf: &[u8]) -> Result<()>;

    /// 控制命令，参数/结果通过 `arg` 传递
    fn ioctl(&self, code: ControlCode, arg: &mut [u8]) -> Result<()>;
}

/// FatFs 风格的操作结果码
///
/// 对应 FatFs 的 `DRESULT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiskResult {
    /// 成功
    Ok = 0,
    /// 读写错误
    Error = 1,
    /// 写保护
    WriteProtected = 2,
    /// 未就绪
    NotReady = 3,
    /// 参数错误
    ParameterError = 4,
}

impl From<ErrorKind> for DiskResult {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotReady | ErrorKind::NoMedium => DiskResult::NotReady,
            ErrorKind::WriteProtected => DiskResult::WriteProtected,
            ErrorKind::InvalidInput | ErrorKind::Unsupported => DiskResult::ParameterError,
            _ => DiskResult::Error,
        }
    }
}

impl From<Result<()>> for DiskResult {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => DiskResult::Ok,
            Err(err) => err.kind().into(),
        }
    }
}

/// 由缓冲区长度推出扇区数
pub(crate) fn sector_count(len: usize) -> Result<u32> {
    if len % SECTOR_SIZE != 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "buffer length is not a multiple of 512"));
    }
    u32::try_from(len / SECTOR_SIZE)
        .map_err(|_| Error::new(ErrorKind::InvalidInput, "too many sectors in one request"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_result_mapping() {
        assert_eq!(DiskResult::from(Ok(())), DiskResult::Ok);
        assert_eq!(DiskResult::from(ErrorKind::NotReady), DiskResult::NotReady);
        assert_eq!(DiskResult::from(ErrorKind::NoMedium), DiskResult::NotReady);
        assert_eq!(DiskResult::from(ErrorKind::WriteProtected), DiskResult::WriteProtected);
        assert_eq!(DiskResult::from(ErrorKind::InvalidInput), DiskResult::ParameterError);
        assert_eq!(DiskResult::from(ErrorKind::Unsupported), DiskResult::ParameterError);
        assert_eq!(DiskResult::from(ErrorKind::Io), DiskResult::Error);
        assert_eq!(DiskResult::from(ErrorKind::HardwareTimeout), DiskResult::Error);
        assert_eq!(DiskResult::from(ErrorKind::InvalidState), DiskResult::Error);
        assert_eq!(DiskResult::ParameterError as u8, 4);
    }

    #[test]
    fn test_sector_count() {
        assert_eq!(sector_count(0).unwrap(), 0);
        assert_eq!(sector_count(3 * SECTOR_SIZE).unwrap(), 3);
        assert_eq!(sector_count(100).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_status_bits() {
        assert_eq!(DiskStatus::NOINIT.bits(), 0x01);
        assert_eq!(DiskStatus::NODISK.bits(), 0x02);
        assert_eq!(DiskStatus::PROTECT.bits(), 0x04);
    }
}
