//! 忙等待轮询

use super::QspiTransport;
use crate::consts::{DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_POLLS};
use crate::error::{Error, ErrorKind, Result};

/// 忙等待配置
///
/// 每次轮询之间自旋 `backoff` 次，`backoff` 从 `initial_backoff` 开始
/// 翻倍增长，上限为 `max_backoff`。超过 `max_polls` 次仍忙则报告
/// [`ErrorKind::HardwareTimeout`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// 最大轮询次数
    pub max_polls: u32,
    /// 初始退避（spin_loop 次数）
    pub initial_backoff: u32,
    /// 最大退避（spin_loop 次数）
    pub max_backoff: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_polls: DEFAULT_MAX_POLLS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl PollConfig {
    /// 指定最大轮询次数，不做退避（测试用）
    pub const fn with_max_polls(max_polls: u32) -> Self {
        Self {
            max_polls,
            initial_backoff: 0,
            max_backoff: 0,
        }
    }
}

/// 轮询状态寄存器直到忙标志清除
///
/// # 返回
///
/// 成功返回实际轮询次数
///
/// # 错误
///
/// - 状态读取失败：传播传输层错误
/// - 超过 `max_polls` 次仍忙：`HardwareTimeout`
pub fn wait_ready<T: QspiTransport>(transport: &mut T, poll: &PollConfig) -> Result<u32> {
    let mut backoff = poll.initial_backoff;

    for attempt in 1..=poll.max_polls {
        if !transport.is_busy()? {
            log::trace!("[QSPI] ready after {} polls", attempt);
            return Ok(attempt);
        }

        for _ in 0..backoff {
            core::hint::spin_loop();
        }
        backoff = backoff.saturating_mul(2).min(poll.max_backoff).max(poll.initial_backoff);
    }

    log::error!("[QSPI] still busy after {} polls", poll.max_polls);
    Err(Error::new(
        ErrorKind::HardwareTimeout,
        "flash busy flag never cleared",
    ))
}
