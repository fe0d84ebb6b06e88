//! 流信息定义.
//!
//! 对标 FFmpeg 的 `AVStream`, 描述容器中的一条音视频/字幕流.

use tao_codec::CodecId;
use tao_core::{MediaType, Rational};

/// 流信息
///
/// 描述容器格式中的一条流 (音频流/字幕流等).
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位, -1 表示未知)
    pub duration: i64,
    /// 起始时间 (以 time_base 为单位)
    pub start_time: i64,
    /// 编解码器私有数据 (extradata, Ogg 中为首个头包)
    pub extra_data: Vec<u8>,
    /// 流特定参数
    pub params: StreamParams,
    /// 元数据 (语言, 类别等)
    pub metadata: Vec<(String, String)>,
}

impl Stream {
    /// 创建尚未识别编解码器的流
    pub fn new(index: usize) -> Self {
        Self {
            index,
            media_type: MediaType::Data,
            codec_id: CodecId::None,
            time_base: Rational::MILLI,
            duration: -1,
            start_time: 0,
            extra_data: Vec::new(),
            params: StreamParams::Other,
            metadata: Vec::new(),
        }
    }

    /// 查询元数据
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 设置元数据, 已存在的键会被覆盖
    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key.to_string(), value)),
        }
    }
}

/// 流特定参数
#[derive(Debug, Clone)]
pub enum StreamParams {
    /// 音频流参数
    Audio(AudioStreamParams),
    /// 字幕流参数
    Subtitle(SubtitleStreamParams),
    /// 其他
    Other,
}

/// 音频流参数
#[derive(Debug, Clone)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
}

/// 字幕流参数
#[derive(Debug, Clone, Default)]
pub struct SubtitleStreamParams {
    /// 画布宽度 (像素, 0 表示未指定)
    pub width: u32,
    /// 画布高度 (像素, 0 表示未指定)
    pub height: u32,
    /// 语言标签 (如 "en", "zh_CN")
    pub language: String,
    /// 类别 (如 "SUB", "CC", "K-SLM")
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_metadata_overwrite() {
        let mut stream = Stream::new(3);
        assert_eq!(stream.metadata_value("language"), None);
        stream.set_metadata("language", "en");
        stream.set_metadata("language", "fr");
        assert_eq!(stream.metadata_value("language"), Some("fr"));
        assert_eq!(stream.metadata.len(), 1);
        assert_eq!(stream.codec_id, CodecId::None);
    }
}
