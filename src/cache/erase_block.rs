//! 擦除块缓存实现
//!
//! 缓存一个完整擦除块的镜像，吸收扇区粒度的写入，
//! 在刷新时执行 "擦除 → 逐页编程" 的 NOR flash 写回流程。
//!
//! # 状态
//!
//! ```text
//! Empty ──load──▶ Resident(b) ──flush ok──▶ Resident(b) (clean)
//!   ▲                 │                          │
//!   └──invalidate─────┴──flush err──▶ Poisoned(b) ──recover ok──▶ Empty
//! ```

use super::buffer::{CacheFlags, HalfBuffers};
use crate::{
    consts::{
        ERASE_BLOCK_SHIFT, ERASE_BLOCK_SIZE, HALF_BUFFER_SIZE, PAGES_PER_ERASE_BLOCK, PAGE_SIZE,
        SECTORS_PER_ERASE_BLOCK, SECTOR_SIZE,
    },
    error::{Error, ErrorKind, Result},
    translate::erase_block_index,
    transport::{wait_ready, PollConfig, QspiTransport},
};

/// 缓存驻留状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// 没有驻留块，半区内容无意义
    Empty,
    /// 驻留的擦除块号
    Resident(u32),
    /// 刷新中途失败的擦除块号
    ///
    /// flash 上该块可能已被部分擦除/编程，半区是唯一完好的副本。
    Poisoned(u32),
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 从 flash 装载擦除块的次数
    pub loads: u64,
    /// 暂存的扇区数
    pub staged_sectors: u64,
    /// 成功写回的次数
    pub flushes: u64,
    /// 因为干净而跳过的写回次数
    pub skipped_flushes: u64,
    /// 失败的写回次数
    pub failed_flushes: u64,
    /// 块擦除次数
    pub erases: u64,
    /// 页编程次数
    pub pages_programmed: u64,
}

/// 擦除块缓存
///
/// 每个 flash 介质一个实例，由介质适配器独占持有，
/// 所有操作都通过 `&mut self` 访问。
pub struct EraseBlockCache {
    /// 擦除块镜像
    buffers: HalfBuffers,

    /// 驻留状态
    residency: Residency,

    /// 状态标志
    flags: CacheFlags,

    /// 干净块刷新时是否跳过擦除/编程
    skip_clean_flush: bool,

    /// 统计信息
    stats: CacheStats,
}

impl EraseBlockCache {
    /// 创建空缓存
    ///
    /// # 参数
    ///
    /// * `skip_clean_flush` - 为 true 时，未修改过的驻留块刷新不产生任何 flash 操作
    pub fn new(skip_clean_flush: bool) -> Self {
        Self {
            buffers: HalfBuffers::new(),
            residency: Residency::Empty,
            flags: CacheFlags::empty(),
            skip_clean_flush,
            stats: CacheStats::default(),
        }
    }

    /// 当前驻留状态
    pub fn residency(&self) -> Residency {
        self.residency
    }

    /// 驻留的擦除块号（中毒状态不算驻留）
    pub fn resident_block(&self) -> Option<u32> {
        match self.residency {
            Residency::Resident(block) => Some(block),
            _ => None,
        }
    }

    /// 是否处于刷新失败后的中毒状态
    pub fn is_poisoned(&self) -> bool {
        matches!(self.residency, Residency::Poisoned(_))
    }

    /// 状态标志
    pub fn flags(&self) -> CacheFlags {
        self.flags
    }

    /// 是否有未写回的修改
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(CacheFlags::DIRTY)
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// 从 flash 装载擦除块
    ///
    /// 只能在缓存为空，或者驻留块刚刚刷新（干净）时调用。
    /// 读之前先等待 flash 空闲；读失败时缓存回到空状态。
    ///
    /// # 错误
    ///
    /// - 驻留块是脏的或缓存中毒：`InvalidState`
    /// - 块号超出 32 位地址空间：`InvalidInput`
    /// - 传输层读失败或等待超时：传播
    pub fn load<T: QspiTransport>(&mut self, transport: &mut T, poll: &PollConfig, block: u32) -> Result<()> {
        match self.residency {
            Residency::Poisoned(_) => {
                return Err(Error::new(
                    ErrorKind::InvalidState,
                    "cannot load over a poisoned erase block",
                ));
            }
            Residency::Resident(old) if self.is_dirty() => {
                log::error!("[CACHE] load block {} would drop dirty block {}", block, old);
                return Err(Error::new(
                    ErrorKind::InvalidState,
                    "resident erase block is dirty, flush before load",
                ));
            }
            _ => {}
        }

        let base = block_base(block)?;
        log::debug!("[CACHE] load block {} from {:#x}", block, base);

        self.residency = Residency::Empty;
        self.flags = CacheFlags::empty();

        wait_ready(transport, poll)?;
        let (half_a, half_b) = self.buffers.halves_mut();
        transport.raw_read(base, half_a)?;
        transport.raw_read(base + HALF_BUFFER_SIZE as u32, half_b)?;

        self.residency = Residency::Resident(block);
        self.flags = CacheFlags::LOADED;
        self.stats.loads += 1;
        Ok(())
    }

    /// 把一个扇区暂存到缓存
    ///
    /// 写入块内偏移 `(lba * 512) mod 65536`，必要时跨半区拆分。
    /// 不检查扇区是否属于驻留块，由扇区转换层保证。
    ///
    /// # 错误
    ///
    /// - `src` 不是 512 字节：`InvalidInput`
    /// - 没有驻留块：`InvalidState`
    pub fn stage_sector(&mut self, lba: u32, src: &[u8]) -> Result<()> {
        if src.len() != SECTOR_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "sector source must be 512 bytes"));
        }
        let block = self.resident_block().ok_or(Error::new(
            ErrorKind::InvalidState,
            "no erase block resident for staging",
        ))?;
        debug_assert_eq!(block, erase_block_index(lba));
        debug_assert!(self.flags.contains(CacheFlags::LOADED));

        let offset = sector_offset(lba);
        if self.buffers.write_at(offset, src) {
            self.flags.insert(CacheFlags::DIRTY);
        }
        self.stats.staged_sectors += 1;
        log::trace!("[CACHE] stage lba={} block={} offset={:#x}", lba, block, offset);
        Ok(())
    }

    /// 从缓存读出一个扇区
    ///
    /// 驻留块和中毒块都可以读。
    ///
    /// # 错误
    ///
    /// - `dst` 不是 512 字节或扇区不在缓存块内：`InvalidInput`
    /// - 缓存为空：`InvalidState`
    pub fn read_sector(&self, lba: u32, dst: &mut [u8]) -> Result<()> {
        if dst.len() != SECTOR_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "sector destination must be 512 bytes"));
        }
        let block = match self.residency {
            Residency::Resident(b) | Residency::Poisoned(b) => b,
            Residency::Empty => {
                return Err(Error::new(ErrorKind::InvalidState, "no erase block cached"));
            }
        };
        if erase_block_index(lba) != block {
            return Err(Error::new(ErrorKind::InvalidInput, "sector outside cached erase block"));
        }

        self.buffers.read_at(sector_offset(lba), dst);
        Ok(())
    }

    /// 把缓存写回 flash
    ///
    /// 流程：等待空闲 → 擦除 → 等待空闲 → 256 页逐页编程（每页后等待空闲）。
    /// 第 0..128 页来自 A 半区，128..256 页来自 B 半区。
    ///
    /// # 返回
    ///
    /// 是否真正写了 flash（干净块且开启 `skip_clean_flush` 时返回 false）
    ///
    /// # 错误
    ///
    /// - 缓存为空：`InvalidState`
    /// - 传输层失败或超时：缓存进入中毒状态并传播错误
    pub fn flush<T: QspiTransport>(&mut self, transport: &mut T, poll: &PollConfig) -> Result<bool> {
        let (block, poisoned) = match self.residency {
            Residency::Resident(b) => (b, false),
            Residency::Poisoned(b) => (b, true),
            Residency::Empty => {
                return Err(Error::new(ErrorKind::InvalidState, "flush with no erase block resident"));
            }
        };

        if !poisoned && !self.is_dirty() && self.skip_clean_flush {
            log::debug!("[CACHE] flush block {} skipped (clean)", block);
            self.stats.skipped_flushes += 1;
            return Ok(false);
        }

        log::debug!("[CACHE] flush block {} (dirty={}, poisoned={})", block, self.is_dirty(), poisoned);

        match write_back(&self.buffers, &mut self.stats, transport, poll, block) {
            Ok(()) => {
                self.residency = Residency::Resident(block);
                self.flags.remove(CacheFlags::DIRTY);
                self.stats.flushes += 1;
                Ok(true)
            }
            Err(err) => {
                log::error!("[CACHE] flush block {} failed: {}", block, err);
                self.residency = Residency::Poisoned(block);
                self.stats.failed_flushes += 1;
                Err(err)
            }
        }
    }

    /// 重新写回中毒块，成功后清空缓存
    ///
    /// 缓存未中毒时什么也不做。
    pub fn recover<T: QspiTransport>(&mut self, transport: &mut T, poll: &PollConfig) -> Result<()> {
        if let Residency::Poisoned(block) = self.residency {
            log::warn!("[CACHE] recovering poisoned block {}", block);
            self.flush(transport, poll)?;
            self.invalidate();
        }
        Ok(())
    }

    /// 清空缓存（不写回）
    pub fn invalidate(&mut self) {
        if self.is_dirty() {
            log::warn!("[CACHE] invalidate drops dirty state {:?}", self.residency);
        }
        self.residency = Residency::Empty;
        self.flags = CacheFlags::empty();
    }
}

impl Default for EraseBlockCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl core::fmt::Debug for EraseBlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EraseBlockCache")
            .field("residency", &self.residency)
            .field("flags", &self.flags)
            .field("skip_clean_flush", &self.skip_clean_flush)
            .field("stats", &self.stats)
            .finish()
    }
}

/// 擦除块的起始字节偏移
fn block_base(block: u32) -> Result<u32> {
    block
        .checked_mul(ERASE_BLOCK_SIZE as u32)
        .filter(|base| base.checked_add(ERASE_BLOCK_SIZE as u32 - 1).is_some())
        .ok_or(Error::new(ErrorKind::InvalidInput, "erase block beyond 32-bit address space"))
}

/// 扇区在所属擦除块内的字节偏移
fn sector_offset(lba: u32) -> usize {
    (lba % SECTORS_PER_ERASE_BLOCK) as usize * SECTOR_SIZE
}

/// 擦除后逐页编程
fn write_back<T: QspiTransport>(
    buffers: &HalfBuffers,
    stats: &mut CacheStats,
    transport: &mut T,
    poll: &PollConfig,
    block: u32,
) -> Result<()> {
    let base = block_base(block)?;
    debug_assert_eq!(base >> ERASE_BLOCK_SHIFT, block);

    wait_ready(transport, poll)?;
    transport.erase_block(base)?;
    stats.erases += 1;
    wait_ready(transport, poll)?;

    for page in 0..PAGES_PER_ERASE_BLOCK {
        let offset = base + (page * PAGE_SIZE) as u32;
        transport.raw_program(offset, buffers.page(page))?;
        stats.pages_programmed += 1;
        wait_ready(transport, poll)?;
    }

    Ok(())
}
