//! 编解码器标识符.
//!
//! 对标 FFmpeg 的 `AVCodecID`, 为每种编解码算法分配唯一标识.

use std::fmt;
use tao_core::MediaType;

/// 编解码器标识符
///
/// 唯一标识一种编解码算法, 与容器格式无关.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// Theora
    Theora,

    // ========================
    // 音频编解码器
    // ========================
    /// Opus
    Opus,
    /// Vorbis
    Vorbis,
    /// FLAC (Free Lossless Audio Codec)
    Flac,

    // ========================
    // 字幕编解码器
    // ========================
    /// Kate (Ogg 时间轴文本字幕)
    Kate,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Data,
            Self::Theora => MediaType::Video,
            Self::Opus | Self::Vorbis | Self::Flac => MediaType::Audio,
            Self::Kate => MediaType::Subtitle,
        }
    }

    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Theora => "theora",
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Flac => "flac",
            Self::Kate => "kate",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
