//! 容器格式识别.
//!
//! 注册表把输入开头的一段字节 (以及可选的文件名) 交给各格式的识别器,
//! 取置信度最高者. 这里定义置信度刻度, 识别器 trait, 以及多个格式
//! 共用的头部处理函数.

use crate::format_id::FormatId;

/// 识别置信度, 数值越高越可信
pub type ProbeScore = u32;

/// 仅扩展名匹配
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 跳过 ID3v2 标签后魔数匹配
pub const SCORE_AFTER_ID3: ProbeScore = 98;

/// 魔数位于输入开头
pub const SCORE_MAX: ProbeScore = 100;

/// 识别结果
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub format_id: FormatId,
    pub score: ProbeScore,
}

/// 格式识别器
pub trait FormatProbe {
    /// 判断 `data` (输入开头, 最多 8KB) 是否为本格式.
    ///
    /// 不是本格式时返回 `None`. `filename` 仅用于扩展名兜底.
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore>;

    fn format_id(&self) -> FormatId;
}

/// 跳过开头的 ID3v2 标签, 返回标签之后的数据
///
/// 没有标签时原样返回; 标签声明的长度超出 `data` 时返回 `None`.
pub fn skip_id3v2(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 10 || !data.starts_with(b"ID3") {
        return Some(data);
    }
    // 28 位 synchsafe 整数, 每字节仅低 7 位有效
    let size = data[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | (b & 0x7F) as usize);
    data.get(10 + size..)
}

/// 按魔数给出置信度: 开头命中为 [`SCORE_MAX`], ID3v2 之后命中为 [`SCORE_AFTER_ID3`]
pub fn score_magic(data: &[u8], magic: &[u8]) -> Option<ProbeScore> {
    if data.starts_with(magic) {
        return Some(SCORE_MAX);
    }
    match skip_id3v2(data) {
        Some(rest) if rest.len() < data.len() && rest.starts_with(magic) => Some(SCORE_AFTER_ID3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_id3v2() {
        assert_eq!(skip_id3v2(b"OggS"), Some(&b"OggS"[..]));
        // 长度 0x81 = 1 << 7 | 1 = 129 字节
        let mut tagged = b"ID3\x04\x00\x00\x00\x00\x01\x01".to_vec();
        tagged.extend(std::iter::repeat_n(0u8, 129));
        tagged.extend_from_slice(b"OggS");
        assert_eq!(skip_id3v2(&tagged), Some(&b"OggS"[..]));
        // 标签被截断
        assert_eq!(skip_id3v2(b"ID3\x04\x00\x00\x00\x00\x00\x7F"), None);
    }

    #[test]
    fn test_score_magic() {
        assert_eq!(score_magic(b"OggS\x00", b"OggS"), Some(SCORE_MAX));
        assert_eq!(
            score_magic(b"ID3\x04\x00\x00\x00\x00\x00\x00OggS", b"OggS"),
            Some(SCORE_AFTER_ID3)
        );
        assert_eq!(score_magic(b"RIFF", b"OggS"), None);
        assert_eq!(score_magic(b"ID3\x04\x00\x00\x00\x00\x00\x00RIFF", b"OggS"), None);
    }
}
