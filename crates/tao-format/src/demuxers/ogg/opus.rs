//! Ogg Opus 逻辑流处理器.
//!
//! 头包为 "OpusHead" 与 "OpusTags"; granule 始终以 48 kHz 计数.

use log::debug;
use tao_codec::CodecId;
use tao_core::{MediaType, Rational, TaoError, TaoResult};

use crate::stream::{AudioStreamParams, Stream, StreamParams};

use super::codec::{HeaderStatus, OggCodecHandler, OggPayload, raw_granule_timestamps};

/// Opus 首包魔数前缀
pub const OPUS_MAGIC: &[u8] = b"OpusHead";

const OPUS_TAGS: &[u8] = b"OpusTags";

/// "OpusHead" (8) + version (1) + channels (1) + pre_skip (2) + sample_rate (4)
const HEAD_MIN_SIZE: usize = 19;

/// Opus granule 时钟频率
const OPUS_GRANULE_RATE: i32 = 48000;

/// Opus 逻辑流处理器
#[derive(Debug, Default)]
pub struct OpusHandler {
    pre_skip: u16,
}

impl OpusHandler {
    /// 创建处理器
    pub fn new() -> Self {
        Self::default()
    }

    /// OpusHead 中声明的预跳过采样数
    pub fn pre_skip(&self) -> u16 {
        self.pre_skip
    }

    fn parse_head(&mut self, stream: &mut Stream, data: &[u8]) -> TaoResult<()> {
        if data.len() < HEAD_MIN_SIZE {
            return Err(TaoError::InvalidData(format!(
                "OpusHead 过短: {} 字节",
                data.len()
            )));
        }
        let channels = u32::from(data[9]);
        self.pre_skip = u16::from_le_bytes([data[10], data[11]]);
        // 输入采样率仅供参考, 0 表示未知
        let input_rate = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);

        stream.media_type = MediaType::Audio;
        stream.codec_id = CodecId::Opus;
        stream.time_base = Rational::new(1, OPUS_GRANULE_RATE);
        stream.params = StreamParams::Audio(AudioStreamParams {
            sample_rate: if input_rate == 0 { OPUS_GRANULE_RATE as u32 } else { input_rate },
            channels,
        });
        debug!(
            "Opus: 流 #{} {} 声道, 输入采样率 {}, pre_skip {}",
            stream.index, channels, input_rate, self.pre_skip
        );
        Ok(())
    }
}

impl OggCodecHandler for OpusHandler {
    fn header(&mut self, stream: &mut Stream, packet: &[u8]) -> TaoResult<HeaderStatus> {
        if packet.starts_with(OPUS_MAGIC) {
            self.parse_head(stream, packet)?;
            return Ok(HeaderStatus::Header);
        }
        if packet.starts_with(OPUS_TAGS) {
            return Ok(HeaderStatus::Header);
        }
        Ok(HeaderStatus::Data)
    }

    fn packet(&mut self, packet: &[u8]) -> TaoResult<Option<OggPayload>> {
        Ok(Some(OggPayload::raw(packet)))
    }

    fn granule_to_timestamps(&self, granule: u64) -> (i64, i64) {
        raw_granule_timestamps(granule)
    }

    fn expected_headers(&self) -> Option<usize> {
        Some(2)
    }
}
