//! 内存模拟的 NOR flash
//!
//! 用于单元测试和下游集成测试（`mock` feature）。模拟 NOR flash 的物理约束：
//! - 擦除把整个 64 KiB 块置为 0xFF
//! - 编程只能把 1 变成 0（与运算），不能跨页
//! - 编程/擦除后状态寄存器保持忙若干次轮询，忙期间下发命令视为错误
//!
//! 另外支持故障注入（读/编程/擦除失败、忙标志卡死）和操作计数。

use super::QspiTransport;
use crate::consts::{ERASE_BLOCK_SIZE, PAGE_SIZE};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;

/// 模拟 flash 的操作计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    /// 读命令次数
    pub reads: u64,
    /// 读取的总字节数
    pub bytes_read: u64,
    /// 页编程次数
    pub programs: u64,
    /// 块擦除次数
    pub erases: u64,
    /// 状态寄存器轮询次数
    pub status_polls: u64,
    /// 进入四线模式次数
    pub quad_mode_entries: u64,
    /// 对未擦除数据编程的页数（需要 0 → 1 的位）
    pub program_over_unerased: u64,
}

impl MockStats {
    /// 所有传输层命令的总数
    pub fn total_ops(&self) -> u64 {
        self.reads + self.programs + self.erases + self.status_polls + self.quad_mode_entries
    }
}

/// 内存模拟的 NOR flash
#[derive(Debug)]
pub struct MockFlash {
    mem: Vec<u8>,
    program_busy_ticks: u32,
    erase_busy_ticks: u32,
    busy_remaining: u32,
    stuck_busy: bool,
    ready: bool,
    write_protected: bool,
    fail_reads: bool,
    fail_erases: bool,
    fail_quad_mode: bool,
    /// 第 n 次（从 0 开始计数）页编程失败
    fail_program_at: Option<u64>,
    stats: MockStats,
}

impl MockFlash {
    /// 创建包含 `erase_blocks` 个擦除块的 flash，初始内容为 0xFF
    pub fn new(erase_blocks: u32) -> Self {
        Self {
            mem: vec![0xFF; erase_blocks as usize * ERASE_BLOCK_SIZE],
            program_busy_ticks: 0,
            erase_busy_ticks: 0,
            busy_remaining: 0,
            stuck_busy: false,
            ready: true,
            write_protected: false,
            fail_reads: false,
            fail_erases: false,
            fail_quad_mode: false,
            fail_program_at: None,
            stats: MockStats::default(),
        }
    }

    /// 设置编程/擦除后保持忙的轮询次数
    pub fn with_busy_ticks(mut self, program: u32, erase: u32) -> Self {
        self.program_busy_ticks = program;
        self.erase_busy_ticks = erase;
        self
    }

    /// 忙标志卡死
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// 控制器就绪状态
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// 写保护
    pub fn set_write_protected(&mut self, wp: bool) {
        self.write_protected = wp;
    }

    /// 读命令失败
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// 擦除命令失败
    pub fn set_fail_erases(&mut self, fail: bool) {
        self.fail_erases = fail;
    }

    /// 进入四线模式失败
    pub fn set_fail_quad_mode(&mut self, fail: bool) {
        self.fail_quad_mode = fail;
    }

    /// 让第 `nth` 次页编程失败（按累计编程次数计数）
    pub fn fail_program_at(&mut self, nth: Option<u64>) {
        self.fail_program_at = nth;
    }

    /// 操作计数
    pub fn stats(&self) -> &MockStats {
        &self.stats
    }

    /// 清零操作计数
    pub fn reset_stats(&mut self) {
        self.stats = MockStats::default();
    }

    /// flash 全部内容
    pub fn contents(&self) -> &[u8] {
        &self.mem
    }

    /// 指定擦除块的内容
    pub fn erase_block_contents(&self, block: u32) -> &[u8] {
        let start = block as usize * ERASE_BLOCK_SIZE;
        &self.mem[start..start + ERASE_BLOCK_SIZE]
    }

    /// 直接写入内容（绕过 NOR 约束，用于准备测试数据）
    pub fn preload(&mut self, offset: usize, data: &[u8]) {
        self.mem[offset..offset + data.len()].copy_from_slice(data);
    }

    fn check_idle(&self) -> Result<()> {
        if self.busy_remaining > 0 || self.stuck_busy {
            return Err(Error::new(ErrorKind::Io, "command issued while flash busy"));
        }
        Ok(())
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<usize> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(start),
            _ => Err(Error::new(ErrorKind::InvalidInput, "mock flash access out of range")),
        }
    }
}

impl QspiTransport for MockFlash {
    fn raw_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        self.check_idle()?;
        self.stats.reads += 1;
        if self.fail_reads {
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }
        let start = self.check_range(offset, buf.len())?;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        self.stats.bytes_read += buf.len() as u64;
        Ok(())
    }

    fn raw_program(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.check_idle()?;
        let nth = self.stats.programs;
        self.stats.programs += 1;
        if self.fail_program_at == Some(nth) {
            return Err(Error::new(ErrorKind::Io, "injected program failure"));
        }
        if data.len() > PAGE_SIZE || (offset as usize % PAGE_SIZE) + data.len() > PAGE_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "program crosses page boundary"));
        }
        let start = self.check_range(offset, data.len())?;

        let target = &mut self.mem[start..start + data.len()];
        if target.iter().zip(data).any(|(old, new)| old & new != *new) {
            self.stats.program_over_unerased += 1;
        }
        for (old, new) in target.iter_mut().zip(data) {
            *old &= *new;
        }
        self.busy_remaining = self.program_busy_ticks;
        Ok(())
    }

    fn erase_block(&mut self, offset: u32) -> Result<()> {
        self.check_idle()?;
        self.stats.erases += 1;
        if self.fail_erases {
            return Err(Error::new(ErrorKind::Io, "injected erase failure"));
        }
        let base = (offset as usize / ERASE_BLOCK_SIZE) * ERASE_BLOCK_SIZE;
        self.check_range(base as u32, ERASE_BLOCK_SIZE)?;
        self.mem[base..base + ERASE_BLOCK_SIZE].fill(0xFF);
        self.busy_remaining = self.erase_busy_ticks;
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool> {
        self.stats.status_polls += 1;
        if self.stuck_busy {
            return Ok(true);
        }
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn enter_quad_mode(&mut self) -> Result<()> {
        self.stats.quad_mode_entries += 1;
        if self.fail_quad_mode {
            return Err(Error::new(ErrorKind::Io, "injected quad mode failure"));
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_ands_bits() {
        let mut flash = MockFlash::new(1);
        flash.raw_program(0, &[0x0F]).unwrap();
        flash.raw_program(0, &[0xF3]).unwrap();

        let mut out = [0u8; 1];
        flash.raw_read(0, &mut out).unwrap();
        assert_eq!(out[0], 0x03);
        assert_eq!(flash.stats().program_over_unerased, 1);
    }

    #[test]
    fn test_program_rejects_page_crossing() {
        let mut flash = MockFlash::new(1);
        let data = [0u8; 16];
        let err = flash.raw_program(PAGE_SIZE as u32 - 8, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_erase_restores_ff() {
        let mut flash = MockFlash::new(2);
        flash.preload(ERASE_BLOCK_SIZE + 10, &[0u8; 4]);
        flash.erase_block(ERASE_BLOCK_SIZE as u32 + 300).unwrap();
        assert!(flash.erase_block_contents(1).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_command_while_busy_fails() {
        let mut flash = MockFlash::new(1).with_busy_ticks(2, 2);
        flash.erase_block(0).unwrap();

        let err = flash.raw_program(0, &[0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        while flash.is_busy().unwrap() {}
        flash.raw_program(0, &[0u8; 4]).unwrap();
    }

    #[test]
    fn test_injected_program_failure() {
        let mut flash = MockFlash::new(1);
        flash.fail_program_at(Some(1));
        flash.raw_program(0, &[0u8; 4]).unwrap();
        assert!(flash.raw_program(PAGE_SIZE as u32, &[0u8; 4]).is_err());
        flash.raw_program(2 * PAGE_SIZE as u32, &[0u8; 4]).unwrap();
    }
}
