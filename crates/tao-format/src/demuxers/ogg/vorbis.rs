//! Ogg Vorbis 逻辑流处理器.
//!
//! Vorbis 有三个头包 (identification=1, comment=3, setup=5), 均以
//! 奇数类型字节 + "vorbis" 开头; 音频包首位为 0.

use log::debug;
use tao_codec::CodecId;
use tao_core::{MediaType, Rational, TaoError, TaoResult};

use crate::stream::{AudioStreamParams, Stream, StreamParams};

use super::codec::{HeaderStatus, OggCodecHandler, OggPayload, raw_granule_timestamps};

/// Vorbis 首包魔数前缀
pub const VORBIS_MAGIC: &[u8] = b"\x01vorbis";

/// identification 头最小长度:
/// packet type (1) + "vorbis" (6) + version (4) + channels (1) + sample_rate (4)
const IDENT_MIN_SIZE: usize = 16;

/// Vorbis 头包总数
const VORBIS_HEADER_COUNT: usize = 3;

/// Vorbis 逻辑流处理器
#[derive(Debug, Default)]
pub struct VorbisHandler {
    sample_rate: u32,
}

impl VorbisHandler {
    /// 创建处理器
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_identification(&mut self, stream: &mut Stream, data: &[u8]) -> TaoResult<()> {
        if data.len() < IDENT_MIN_SIZE {
            return Err(TaoError::InvalidData(format!(
                "Vorbis identification 头过短: {} 字节",
                data.len()
            )));
        }
        let channels = u32::from(data[11]);
        let sample_rate = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        if channels == 0 || sample_rate == 0 {
            return Err(TaoError::InvalidData(format!(
                "Vorbis 参数无效: channels={channels}, sample_rate={sample_rate}"
            )));
        }

        stream.media_type = MediaType::Audio;
        stream.codec_id = CodecId::Vorbis;
        stream.time_base = Rational::from_u32_approx(1, sample_rate).unwrap_or(Rational::MILLI);
        stream.params = StreamParams::Audio(AudioStreamParams {
            sample_rate,
            channels,
        });
        self.sample_rate = sample_rate;
        debug!(
            "Vorbis: 流 #{} {} Hz, {} 声道",
            stream.index, sample_rate, channels
        );
        Ok(())
    }
}

impl OggCodecHandler for VorbisHandler {
    fn header(&mut self, stream: &mut Stream, packet: &[u8]) -> TaoResult<HeaderStatus> {
        let is_header = packet.len() >= 7 && packet[0] & 1 == 1 && &packet[1..7] == b"vorbis";
        if !is_header {
            return Ok(HeaderStatus::Data);
        }
        if packet[0] == 1 {
            self.parse_identification(stream, packet)?;
        }
        Ok(HeaderStatus::Header)
    }

    fn packet(&mut self, packet: &[u8]) -> TaoResult<Option<OggPayload>> {
        Ok(Some(OggPayload::raw(packet)))
    }

    fn granule_to_timestamps(&self, granule: u64) -> (i64, i64) {
        raw_granule_timestamps(granule)
    }

    fn expected_headers(&self) -> Option<usize> {
        Some(VORBIS_HEADER_COUNT)
    }
}

/// 构造 Vorbis identification 头包
#[cfg(test)]
pub(crate) fn build_identification(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut p = VORBIS_MAGIC.to_vec();
    p.extend_from_slice(&0u32.to_le_bytes()); // version
    p.push(channels);
    p.extend_from_slice(&sample_rate.to_le_bytes());
    p.extend_from_slice(&0i32.to_le_bytes()); // bitrate_max
    p.extend_from_slice(&128000i32.to_le_bytes()); // bitrate_nom
    p.extend_from_slice(&0i32.to_le_bytes()); // bitrate_min
    p.push(0x88); // blocksize
    p.push(1); // framing
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vorbis_headers_then_audio() {
        let mut handler = VorbisHandler::new();
        let mut stream = Stream::new(1);

        let ident = build_identification(2, 44100);
        assert_eq!(handler.header(&mut stream, &ident).unwrap(), HeaderStatus::Header);
        assert_eq!(stream.codec_id, CodecId::Vorbis);
        assert_eq!(stream.time_base, Rational::new(1, 44100));
        match &stream.params {
            StreamParams::Audio(a) => {
                assert_eq!(a.sample_rate, 44100);
                assert_eq!(a.channels, 2);
            }
            other => panic!("期望音频流参数, 实际: {other:?}"),
        }

        assert_eq!(
            handler.header(&mut stream, b"\x03vorbis\0\0\0\0").unwrap(),
            HeaderStatus::Header
        );
        assert_eq!(
            handler.header(&mut stream, b"\x05vorbis\0\0").unwrap(),
            HeaderStatus::Header
        );
        assert_eq!(
            handler.header(&mut stream, &[0x00, 0x11]).unwrap(),
            HeaderStatus::Data
        );
        assert_eq!(handler.expected_headers(), Some(3));
        assert_eq!(handler.granule_to_timestamps(1024), (1024, 1024));
    }

    #[test]
    fn test_vorbis_bad_identification() {
        let mut handler = VorbisHandler::new();
        let mut stream = Stream::new(0);
        assert!(handler.header(&mut stream, b"\x01vorbis\0\0").is_err());
        assert!(
            handler
                .header(&mut stream, &build_identification(0, 44100))
                .is_err()
        );
    }
}
