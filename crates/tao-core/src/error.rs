//! 统一错误类型定义.
//!
//! 所有 Tao crate 共用的错误类型, 支持跨模块传播.
//!
//! 与容器框架交互时, 每个错误都可以映射为一个负的整数错误码
//! (见 [`TaoError::code`]), 便于按 "是否可恢复" 或 "是否未实现" 分类处理.

use thiserror::Error;

/// 四字节标签错误码, 与 FFmpeg 的 `FFERRTAG` 取值一致
const fn err_tag(a: u8, b: u8, c: u8, d: u8) -> i32 {
    -((a as i32) | ((b as i32) << 8) | ((c as i32) << 16) | ((d as i32) << 24))
}

/// 错误码: 无效数据 (`AVERROR_INVALIDDATA`)
pub const ERROR_INVALID_DATA: i32 = err_tag(b'I', b'N', b'D', b'A');
/// 错误码: 到达流末尾 (`AVERROR_EOF`)
pub const ERROR_EOF: i32 = err_tag(b'E', b'O', b'F', b' ');
/// 错误码: 不支持的码流特性 (`AVERROR_PATCHWELCOME`)
pub const ERROR_UNSUPPORTED: i32 = err_tag(b'P', b'A', b'W', b'E');
/// 错误码: 未找到解封装器/编解码器 (`AVERROR_DEMUXER_NOT_FOUND`)
pub const ERROR_NOT_FOUND: i32 = err_tag(0xF8, b'D', b'E', b'M');
/// 错误码: 内存不足 (`-ENOMEM`)
pub const ERROR_OUT_OF_MEMORY: i32 = -12;
/// 错误码: 功能未实现 (`-ENOSYS`)
pub const ERROR_NOT_IMPLEMENTED: i32 = -38;
/// 错误码: I/O 错误 (`-EIO`)
pub const ERROR_IO: i32 = -5;

/// Tao 框架统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 不支持的码流或操作 (码流合法, 但当前实现不接受)
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 功能未实现
    #[error("功能未实现: {0}")]
    NotImplemented(String),
}

impl TaoError {
    /// 获取对应的负整数错误码
    ///
    /// 返回值总是小于 0. 成功路径上的非负返回值 (如头包分类的 1/0)
    /// 由调用方各自定义, 不会与错误码冲突.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Unsupported(_) => ERROR_UNSUPPORTED,
            Self::Io(_) => ERROR_IO,
            Self::Eof => ERROR_EOF,
            Self::OutOfMemory(_) => ERROR_OUT_OF_MEMORY,
            Self::FormatNotFound(_) | Self::StreamNotFound(_) => ERROR_NOT_FOUND,
            Self::InvalidData(_) => ERROR_INVALID_DATA,
            Self::NotImplemented(_) => ERROR_NOT_IMPLEMENTED,
        }
    }

    /// 是否为 "功能未实现" 错误
    ///
    /// 用于区分 "输入有问题" 与 "该功能尚不存在".
    pub const fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

/// Tao 框架统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_always_negative() {
        let errors = [
            TaoError::Unsupported("x".into()),
            TaoError::Io(std::io::Error::other("x")),
            TaoError::Eof,
            TaoError::OutOfMemory("x".into()),
            TaoError::FormatNotFound("x".into()),
            TaoError::StreamNotFound(3),
            TaoError::InvalidData("x".into()),
            TaoError::NotImplemented("x".into()),
        ];
        for err in &errors {
            assert!(err.code() < 0, "错误码应为负数: {err}");
        }
    }

    #[test]
    fn test_error_code_known_values() {
        assert_eq!(TaoError::InvalidData(String::new()).code(), -1094995529);
        assert_eq!(TaoError::Eof.code(), -541478725);
        assert_eq!(TaoError::OutOfMemory(String::new()).code(), -12);
        assert_eq!(TaoError::NotImplemented(String::new()).code(), -38);
    }

    #[test]
    fn test_error_not_implemented_distinct() {
        assert!(TaoError::NotImplemented("whip".into()).is_not_implemented());
        assert!(!TaoError::InvalidData("bad".into()).is_not_implemented());
        assert_ne!(
            TaoError::NotImplemented(String::new()).code(),
            TaoError::InvalidData(String::new()).code()
        );
    }
}
