//! 时间戳类型, 用于表示媒体流中的时间点.
//!
//! 对标 FFmpeg 中基于 `time_base` 的时间戳系统.

use crate::rational::Rational;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 判断时间戳值是否为未定义
pub const fn is_nopts(value: i64) -> bool {
    value == NOPTS_VALUE
}

/// 时间戳
///
/// 包含一个整数值和对应的时间基 (time_base).
/// 实际时间 (秒) = pts * time_base.num / time_base.den.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// 时间戳值, `NOPTS_VALUE` 表示未定义
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
}

impl Timestamp {
    /// 创建新的时间戳
    pub const fn new(pts: i64, time_base: Rational) -> Self {
        Self { pts, time_base }
    }

    /// 判断时间戳是否有效 (非 NOPTS_VALUE)
    pub const fn is_valid(&self) -> bool {
        self.pts != NOPTS_VALUE && self.time_base.is_valid()
    }

    /// 以秒为单位格式化, 未定义时返回 `None`
    ///
    /// 供 JSON 输出使用, 避免把 NaN 写入结果.
    pub fn seconds(&self) -> Option<f64> {
        self.is_valid().then(|| self.to_seconds())
    }

    /// 转换为秒 (f64)
    ///
    /// 无效时间戳返回 `f64::NAN`.
    pub fn to_seconds(&self) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        self.pts as f64 * self.time_base.to_f64()
    }
}
