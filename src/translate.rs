//! 扇区转换
//!
//! 把 (起始扇区, 扇区数) 的写请求拆成逐扇区的擦除块操作，
//! 决定每个扇区是直接暂存，还是先装载 / 先写回旧块再装载。

use crate::{
    cache::EraseBlockCache,
    consts::{ERASE_BLOCK_SHIFT, SECTOR_SHIFT, SECTOR_SIZE},
    error::{Error, ErrorKind, Result},
    transport::{PollConfig, QspiTransport},
};

/// 扇区所属的擦除块号
///
/// 等价于 `(lba * 512) >> 16`，即 `lba / 128`。
#[inline]
pub const fn erase_block_index(lba: u32) -> u32 {
    ((lba as u64) << SECTOR_SHIFT >> ERASE_BLOCK_SHIFT) as u32
}

/// 一次批量写入的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// 写入的扇区数
    pub sectors: u32,
    /// 批次中途切换擦除块的次数
    pub transitions: u32,
    /// 真正写了 flash 的写回次数
    pub flushes: u32,
}

/// 校验扇区范围和缓冲区长度
///
/// # 错误
///
/// - `lba + count` 超过 `capacity`：`InvalidInput`
/// - `buf_len != count * 512`：`InvalidInput`
pub fn check_range(lba: u32, count: u32, capacity: u32, buf_len: usize) -> Result<()> {
    let end = lba
        .checked_add(count)
        .ok_or(Error::new(ErrorKind::InvalidInput, "sector range overflows"))?;
    if end > capacity {
        return Err(Error::new(ErrorKind::InvalidInput, "sector range beyond medium capacity"));
    }
    if buf_len != count as usize * SECTOR_SIZE {
        return Err(Error::new(ErrorKind::InvalidInput, "buffer length does not match sector count"));
    }
    Ok(())
}

/// 把连续扇区写入 flash
///
/// 对每个扇区：
/// 1. 目标块 == 驻留块：直接暂存
/// 2. 没有驻留块：装载目标块，再暂存
/// 3. 驻留其他块：写回旧块，装载目标块，再暂存
///
/// 全部扇区处理完后无条件写回一次并清空缓存，使每次调用结束时
/// flash 都是一致的。任何错误都会中止本批次：写回失败时缓存保持中毒，
/// 装载失败时缓存为空（旧块已经写回）。
///
/// 容量边界由调用方用 [`check_range`] 校验；这里只拒绝不足一个扇区的
/// 尾部和超出 32 位扇区号的范围，二者都在访问 flash 之前返回 `InvalidInput`。
pub fn write_sectors<T: QspiTransport>(
    cache: &mut EraseBlockCache,
    transport: &mut T,
    poll: &PollConfig,
    lba: u32,
    buf: &[u8],
) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();
    if buf.is_empty() {
        return Ok(summary);
    }
    if buf.len() % SECTOR_SIZE != 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "buffer length is not a multiple of 512"));
    }
    u32::try_from(buf.len() / SECTOR_SIZE - 1)
        .ok()
        .and_then(|span| lba.checked_add(span))
        .ok_or(Error::new(ErrorKind::InvalidInput, "sector range overflows"))?;

    for (i, src) in buf.chunks_exact(SECTOR_SIZE).enumerate() {
        let sector = lba + i as u32;
        let target = erase_block_index(sector);

        match cache.resident_block() {
            Some(block) if block == target => {}
            None => {
                cache.load(transport, poll, target)?;
            }
            Some(block) => {
                log::debug!("[XLATE] lba={} leaves block {} for block {}", sector, block, target);
                if cache.flush(transport, poll)? {
                    summary.flushes += 1;
                }
                cache.load(transport, poll, target)?;
                summary.transitions += 1;
            }
        }

        cache.stage_sector(sector, src)?;
        summary.sectors += 1;
    }

    if cache.flush(transport, poll)? {
        summary.flushes += 1;
    }
    cache.invalidate();

    log::debug!(
        "[XLATE] wrote {} sectors at lba={} ({} transitions, {} flushes)",
        summary.sectors,
        lba,
        summary.transitions,
        summary.flushes
    );
    Ok(summary)
}
