//! 擦除块半区缓冲
//!
//! 一个擦除块（64 KiB）拆成两个 32 KiB 半区存放，块内偏移
//! `[0, 32768)` 落在 A 半区，`[32768, 65536)` 落在 B 半区。

use crate::consts::{ERASE_BLOCK_SIZE, HALF_BUFFER_SIZE, PAGE_SIZE};
use bitflags::bitflags;

bitflags! {
    /// 缓存状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u8 {
        /// 半区内容来自 flash（有效）
        const LOADED = 0x01;
        /// 暂存后与 flash 不一致（脏）
        const DIRTY  = 0x02;
    }
}

/// 两个半区组成的擦除块镜像
///
/// 固定大小，不做堆分配。
pub struct HalfBuffers {
    /// 块内偏移 [0, 32768)
    half_a: [u8; HALF_BUFFER_SIZE],
    /// 块内偏移 [32768, 65536)
    half_b: [u8; HALF_BUFFER_SIZE],
}

impl HalfBuffers {
    /// 创建全零缓冲
    pub const fn new() -> Self {
        Self {
            half_a: [0u8; HALF_BUFFER_SIZE],
            half_b: [0u8; HALF_BUFFER_SIZE],
        }
    }

    /// A 半区
    pub fn half_a(&self) -> &[u8] {
        &self.half_a
    }

    /// B 半区
    pub fn half_b(&self) -> &[u8] {
        &self.half_b
    }

    /// 两个半区的可变引用（用于从 flash 装载）
    pub fn halves_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        (&mut self.half_a, &mut self.half_b)
    }

    /// 第 `index` 页（256 字节），0..128 来自 A 半区，128..256 来自 B 半区
    pub fn page(&self, index: usize) -> &[u8] {
        let start = index * PAGE_SIZE;
        if start < HALF_BUFFER_SIZE {
            &self.half_a[start..start + PAGE_SIZE]
        } else {
            let start = start - HALF_BUFFER_SIZE;
            &self.half_b[start..start + PAGE_SIZE]
        }
    }

    /// 把 `src` 写到块内偏移 `offset`，跨越半区边界时自动拆分
    ///
    /// # 返回
    ///
    /// 内容是否发生了变化
    pub fn write_at(&mut self, offset: usize, src: &[u8]) -> bool {
        assert!(offset + src.len() <= ERASE_BLOCK_SIZE);

        let split = HALF_BUFFER_SIZE.saturating_sub(offset).min(src.len());
        let (to_a, to_b) = src.split_at(split);
        let mut changed = false;

        if !to_a.is_empty() {
            let dst = &mut self.half_a[offset..offset + to_a.len()];
            changed |= dst != to_a;
            dst.copy_from_slice(to_a);
        }
        if !to_b.is_empty() {
            let start = offset + split - HALF_BUFFER_SIZE;
            let dst = &mut self.half_b[start..start + to_b.len()];
            changed |= dst != to_b;
            dst.copy_from_slice(to_b);
        }

        changed
    }

    /// 从块内偏移 `offset` 读出 `dst.len()` 字节
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) {
        assert!(offset + dst.len() <= ERASE_BLOCK_SIZE);

        let split = HALF_BUFFER_SIZE.saturating_sub(offset).min(dst.len());
        let (from_a, from_b) = dst.split_at_mut(split);

        from_a.copy_from_slice(&self.half_a[offset..offset + from_a.len()]);
        if !from_b.is_empty() {
            let start = offset + split - HALF_BUFFER_SIZE;
            from_b.copy_from_slice(&self.half_b[start..start + from_b.len()]);
        }
    }
}

impl Default for HalfBuffers {
    fn default() -> Self {
        Self::new()
    }
}
