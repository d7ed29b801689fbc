//! 控制命令及参数编码
//!
//! 参数缓冲区按本机字节序编码：扇区大小是 16 位（WORD），
//! 扇区数 / 擦除粒度 / 擦除范围是 32 位（DWORD）。

use crate::error::{Error, ErrorKind, Result};
use byteorder::{ByteOrder, NativeEndian};

/// 控制命令
///
/// 对应 FatFs 的 `CTRL_SYNC` / `GET_SECTOR_COUNT` / `GET_SECTOR_SIZE` /
/// `GET_BLOCK_SIZE` / `CTRL_ERASE_SECTOR`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCode {
    /// 完成挂起的写入
    Sync = 0,
    /// 介质扇区总数（u32）
    GetSectorCount = 1,
    /// 扇区大小（u16）
    GetSectorSize = 2,
    /// 擦除粒度，以扇区为单位（u32）
    GetBlockSize = 3,
    /// 擦除扇区范围，参数为 [起始, 结束]（两个 u32）
    EraseSector = 4,
}

impl ControlCode {
    /// 从原始命令码转换，未知命令返回 `None`
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Sync),
            1 => Some(Self::GetSectorCount),
            2 => Some(Self::GetSectorSize),
            3 => Some(Self::GetBlockSize),
            4 => Some(Self::EraseSector),
            _ => None,
        }
    }
}

const ARG_TOO_SHORT: Error = Error::new(ErrorKind::InvalidInput, "ioctl argument buffer too short");

/// 写入 16 位结果
pub(crate) fn put_word(arg: &mut [u8], value: u16) -> Result<()> {
    let dst = arg.get_mut(..2).ok_or(ARG_TOO_SHORT)?;
    NativeEndian::write_u16(dst, value);
    Ok(())
}

/// 写入 32 位结果
pub(crate) fn put_dword(arg: &mut [u8], value: u32) -> Result<()> {
    let dst = arg.get_mut(..4).ok_or(ARG_TOO_SHORT)?;
    NativeEndian::write_u32(dst, value);
    Ok(())
}

/// 读取擦除范围 (起始扇区, 结束扇区)
pub(crate) fn get_erase_range(arg: &[u8]) -> Result<(u32, u32)> {
    let src = arg.get(..8).ok_or(ARG_TOO_SHORT)?;
    let start = NativeEndian::read_u32(&src[..4]);
    let end = NativeEndian::read_u32(&src[4..]);
    if start > end {
        return Err(Error::new(ErrorKind::InvalidInput, "erase range start after end"));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(ControlCode::from_raw(0), Some(ControlCode::Sync));
        assert_eq!(ControlCode::from_raw(3), Some(ControlCode::GetBlockSize));
        assert_eq!(ControlCode::from_raw(4), Some(ControlCode::EraseSector));
        assert_eq!(ControlCode::from_raw(5), None);
        assert_eq!(ControlCode::GetSectorSize as u8, 2);
    }

    #[test]
    fn test_put_values() {
        let mut arg = [0u8; 4];
        put_word(&mut arg, 512).unwrap();
        assert_eq!(NativeEndian::read_u16(&arg), 512);

        put_dword(&mut arg, 32768).unwrap();
        assert_eq!(NativeEndian::read_u32(&arg), 32768);

        let err = put_dword(&mut arg[..2], 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_erase_range() {
        let mut arg = [0u8; 8];
        NativeEndian::write_u32(&mut arg[..4], 10);
        NativeEndian::write_u32(&mut arg[4..], 20);
        assert_eq!(get_erase_range(&arg).unwrap(), (10, 20));

        NativeEndian::write_u32(&mut arg[..4], 30);
        assert!(get_erase_range(&arg).is_err());
        assert!(get_erase_range(&arg[..6]).is_err());
    }
}
