//! 四线 SPI flash 传输层接口
//!
//! 这里只定义擦除块缓存需要的最小传输能力，具体控制器驱动由外部实现。
//!
//! - [`QspiTransport`] - 按字节偏移寻址的读 / 页编程 / 块擦除 / 状态查询
//! - [`PollConfig`] - 忙等待的有界退避配置
//! - [`wait_ready`] - 轮询状态寄存器直到 "操作进行中" 标志清除

mod poll;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use poll::{wait_ready, PollConfig};

use crate::error::Result;

/// 四线 SPI flash 传输接口
///
/// 所有地址都是 flash 内的字节偏移。每个调用都返回 `Result`，
/// 上层必须检查并传播，不能在擦除或编程失败后继续写入。
///
/// # 示例
///
/// ```rust,ignore
/// use qspi_diskio::{QspiTransport, Result};
///
/// struct MyQspi { /* 控制器寄存器 */ }
///
/// impl QspiTransport for MyQspi {
///     fn raw_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
///         // 间接读模式
///         Ok(())
///     }
///     // ...
/// }
/// ```
pub trait QspiTransport {
    /// 从 `offset` 开始读取 `buf.len()` 字节
    fn raw_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()>;

    /// 编程一页
    ///
    /// `data` 不能超过一页（256 字节），也不能跨页边界。
    fn raw_program(&mut self, offset: u32, data: &[u8]) -> Result<()>;

    /// 擦除 `offset` 所在的擦除块（64 KiB）
    fn erase_block(&mut self, offset: u32) -> Result<()>;

    /// 读取状态寄存器中的 "操作进行中" 标志
    fn is_busy(&mut self) -> Result<bool>;

    /// 切换到四线模式，初始化时调用
    fn enter_quad_mode(&mut self) -> Result<()>;

    /// 控制器是否处于就绪状态
    fn is_ready(&self) -> bool;

    /// 是否写保护
    fn is_write_protected(&self) -> bool {
        false
    }
}
