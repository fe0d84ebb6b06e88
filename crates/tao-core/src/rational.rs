//! 有理数类型, 用于时间基 (time_base) 等场景.
//!
//! 对标 FFmpeg 的 `AVRational`.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 广泛用于表示时间基 (time_base).
/// 例如: 时间基 1/90000 表示 90kHz 时钟, 1/1000 表示毫秒时钟.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    ///
    /// # 参数
    /// - `num`: 分子
    /// - `den`: 分母 (不应为 0)
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 常用时间基: 毫秒 (1/1_000)
    pub const MILLI: Self = Self { num: 1, den: 1_000 };

    /// 从两个无符号 32 位整数构造有理数
    ///
    /// 码流中的时间基字段通常是 u32, 可能超出 i32 范围.
    /// 先按最大公约数约分; 仍超出范围时, 分子分母同时右移直到可以表示,
    /// 得到一个近似值. 非零输入不会被近似为 0.
    ///
    /// 任一参数为 0 时返回 `None`.
    pub fn from_u32_approx(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let g = gcd(num, den);
        let (mut n, mut d) = (num / g, den / g);
        while n > i32::MAX as u32 || d > i32::MAX as u32 {
            n = (n >> 1).max(1);
            d = (d >> 1).max(1);
        }
        Some(Self {
            num: n as i32,
            den: d as i32,
        })
    }

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 转换为 f64 浮点数
    ///
    /// 如果分母为 0, 返回 `f64::NAN`.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
