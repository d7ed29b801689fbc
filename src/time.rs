//! FAT 时间戳来源
//!
//! 文件系统写元数据时需要当前时间，这里只定义接口和打包格式，
//! 真正的 RTC 驱动由外部实现。

use crate::consts::FAT_PLACEHOLDER_TIMESTAMP;
use core::fmt;

/// FAT 打包时间戳
///
/// | 位 | 字段 |
/// |----|------|
/// | 31..25 | 年 - 1980 |
/// | 24..21 | 月 (1-12) |
/// | 20..16 | 日 (1-31) |
/// | 15..11 | 时 (0-23) |
/// | 10..5  | 分 (0-59) |
/// | 4..0   | 秒 / 2 (0-29) |
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FatTimestamp(u32);

impl FatTimestamp {
    /// 无 RTC 时的占位值（1980-01-01 00:00:00）
    pub const PLACEHOLDER: Self = Self(FAT_PLACEHOLDER_TIMESTAMP);

    /// 从打包值创建
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// 从日历字段创建
    ///
    /// 超出 FAT 表示范围（1980..=2107 年等）时返回 `None`。
    pub fn from_calendar(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        if !(1980..=2107).contains(&year)
            || !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }

        let raw = ((year as u32 - 1980) << 25)
            | ((month as u32) << 21)
            | ((day as u32) << 16)
            | ((hour as u32) << 11)
            | ((minute as u32) << 5)
            | (second as u32 / 2);
        Some(Self(raw))
    }

    /// 打包值
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// 年
    pub const fn year(self) -> u16 {
        1980 + (self.0 >> 25) as u16
    }

    /// 月
    pub const fn month(self) -> u8 {
        ((self.0 >> 21) & 0x0F) as u8
    }

    /// 日
    pub const fn day(self) -> u8 {
        ((self.0 >> 16) & 0x1F) as u8
    }

    /// 时
    pub const fn hour(self) -> u8 {
        ((self.0 >> 11) & 0x1F) as u8
    }

    /// 分
    pub const fn minute(self) -> u8 {
        ((self.0 >> 5) & 0x3F) as u8
    }

    /// 秒（2 秒精度）
    pub const fn second(self) -> u8 {
        ((self.0 & 0x1F) * 2) as u8
    }
}

impl Default for FatTimestamp {
    fn default() -> Self {
        Self::PLACEHOLDER
    }
}

impl fmt::Debug for FatTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// 时间来源
///
/// # 示例
///
/// ```ignore
/// struct Rtc;
/// impl TimeSource for Rtc {
///     fn now(&self) -> Option<FatTimestamp> {
///         FatTimestamp::from_calendar(2024, 5, 1, 12, 0, 0)
///     }
/// }
/// ```
pub trait TimeSource {
    /// 获取当前时间
    ///
    /// 时间不可用（例如没有 RTC 或 RTC 未校准）时返回 `None`
    fn now(&self) -> Option<FatTimestamp>;
}

/// 文件系统元数据使用的当前时间
///
/// 没有时间来源或时间不可用时返回 [`FatTimestamp::PLACEHOLDER`]。
pub fn get_fattime<T: TimeSource>(source: Option<&T>) -> FatTimestamp {
    source
        .and_then(|s| s.now())
        .unwrap_or(FatTimestamp::PLACEHOLDER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    struct FixedRtc(Option<FatTimestamp>);

    impl TimeSource for FixedRtc {
        fn now(&self) -> Option<FatTimestamp> {
            self.0
        }
    }

    #[test]
    fn test_placeholder_is_1980_01_01() {
        let ts = FatTimestamp::PLACEHOLDER;
        assert_eq!(ts.raw(), 0x0021_0000);
        assert_eq!((ts.year(), ts.month(), ts.day()), (1980, 1, 1));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (0, 0, 0));
    }

    #[test]
    fn test_from_calendar_packs_fields() {
        let ts = FatTimestamp::from_calendar(2024, 2, 29, 23, 59, 58).unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 2);
        assert_eq!(ts.day(), 29);
        assert_eq!(ts.hour(), 23);
        assert_eq!(ts.minute(), 59);
        assert_eq!(ts.second(), 58);
        assert_eq!(format!("{:?}", ts), "2024-02-29 23:59:58");
    }

    #[test]
    fn test_from_calendar_rejects_out_of_range() {
        assert!(FatTimestamp::from_calendar(1979, 1, 1, 0, 0, 0).is_none());
        assert!(FatTimestamp::from_calendar(2000, 13, 1, 0, 0, 0).is_none());
        assert!(FatTimestamp::from_calendar(2000, 1, 1, 24, 0, 0).is_none());
    }

    #[test]
    fn test_get_fattime_fallback() {
        assert_eq!(get_fattime::<FixedRtc>(None), FatTimestamp::PLACEHOLDER);
        assert_eq!(get_fattime(Some(&FixedRtc(None))), FatTimestamp::PLACEHOLDER);

        let ts = FatTimestamp::from_calendar(2030, 6, 15, 8, 30, 0).unwrap();
        assert_eq!(get_fattime(Some(&FixedRtc(Some(ts)))), ts);
    }
}
