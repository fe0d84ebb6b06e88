//! Ogg 逻辑流编解码器处理器.
//!
//! 每条逻辑流在 BOS 页面上被识别后, 由一个 [`OggCodecHandler`] 负责:
//! 区分头包与数据包, 解析头包填写流信息, 把数据包转换为输出负载,
//! 以及把页面 granule 换算为时间戳.
//!
//! 处理器通过静态描述表 [`OGG_CODECS`] 按首包魔数前缀 (最长匹配) 选取.

use bytes::Bytes;
use tao_codec::{CodecId, PacketFlags};
use tao_core::timestamp::NOPTS_VALUE;
use tao_core::{Rational, TaoResult};

use crate::stream::Stream;

use super::kate::{KATE_MAGIC, KateHandler};
use super::opus::{OPUS_MAGIC, OpusHandler};
use super::vorbis::{VORBIS_MAGIC, VorbisHandler};

/// 头包分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// 头包, 由解封装器保留, 不输出
    Header,
    /// 首个数据包, 解封装器从此开始输出
    Data,
}

impl HeaderStatus {
    /// 整数返回码: 头包为 1, 数据包为 0
    pub const fn code(self) -> i32 {
        match self {
            Self::Header => 1,
            Self::Data => 0,
        }
    }
}

/// 处理器解析数据包后的输出负载
#[derive(Debug, Clone)]
pub struct OggPayload {
    /// 输出数据
    pub data: Bytes,
    /// 负载自带的显示时间戳, 页面 granule 不可用时使用
    pub pts: i64,
    /// 时长 (以流 time_base 为单位, 0 表示未知)
    pub duration: i64,
    /// 数据包标志
    pub flags: PacketFlags,
}

impl OggPayload {
    /// 原样透传的负载
    pub fn raw(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            pts: NOPTS_VALUE,
            duration: 0,
            flags: PacketFlags::KEY,
        }
    }
}

/// 编解码器处理器 trait
///
/// 每条逻辑流持有一个实例, 仅通过 `&mut self` 访问.
pub trait OggCodecHandler: Send {
    /// 头包阶段: 对一个 packet 进行分类
    ///
    /// 返回 `Header` 时解封装器保留该包; 返回 `Data` 时该包作为首个数据包
    /// 交给 [`packet`](Self::packet). 出错时逻辑流不可继续.
    fn header(&mut self, stream: &mut Stream, packet: &[u8]) -> TaoResult<HeaderStatus>;

    /// 数据阶段: 解析一个数据包, `None` 表示该包不产生输出
    fn packet(&mut self, packet: &[u8]) -> TaoResult<Option<OggPayload>>;

    /// 把 granule 换算为 (pts, dts), 不可换算时返回 `NOPTS_VALUE`
    fn granule_to_timestamps(&self, granule: u64) -> (i64, i64);

    /// 码流声明的头包总数 (含首包), 未知时为 `None`
    fn expected_headers(&self) -> Option<usize> {
        None
    }

    /// seek 后清理运行态
    fn reset(&mut self) {}
}

/// 编解码器描述符
pub struct OggCodec {
    /// 名称
    pub name: &'static str,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 首包魔数前缀
    pub magic: &'static [u8],
    /// 最少头包数
    pub nb_header: usize,
    /// granule 是否标记 packet 的起始时间 (否则标记结束时间)
    pub granule_is_start: bool,
    /// 处理器构造函数
    pub create: fn() -> Box<dyn OggCodecHandler>,
}

impl std::fmt::Debug for OggCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OggCodec")
            .field("name", &self.name)
            .field("codec_id", &self.codec_id)
            .field("nb_header", &self.nb_header)
            .field("granule_is_start", &self.granule_is_start)
            .finish()
    }
}

/// 已知编解码器描述表
pub static OGG_CODECS: &[OggCodec] = &[
    OggCodec {
        name: "kate",
        codec_id: CodecId::Kate,
        magic: KATE_MAGIC,
        nb_header: 1,
        granule_is_start: true,
        create: create_kate,
    },
    OggCodec {
        name: "vorbis",
        codec_id: CodecId::Vorbis,
        magic: VORBIS_MAGIC,
        nb_header: 3,
        granule_is_start: false,
        create: create_vorbis,
    },
    OggCodec {
        name: "opus",
        codec_id: CodecId::Opus,
        magic: OPUS_MAGIC,
        nb_header: 1,
        granule_is_start: false,
        create: create_opus,
    },
    // 以下编解码器仅透传, 不区分头包
    OggCodec {
        name: "theora",
        codec_id: CodecId::Theora,
        magic: b"\x80theora",
        nb_header: 0,
        granule_is_start: false,
        create: create_theora,
    },
    OggCodec {
        name: "flac",
        codec_id: CodecId::Flac,
        magic: b"\x7fFLAC",
        nb_header: 0,
        granule_is_start: false,
        create: create_flac,
    },
];

fn create_kate() -> Box<dyn OggCodecHandler> {
    Box::new(KateHandler::new())
}

fn create_vorbis() -> Box<dyn OggCodecHandler> {
    Box::new(VorbisHandler::new())
}

fn create_opus() -> Box<dyn OggCodecHandler> {
    Box::new(OpusHandler::new())
}

fn create_theora() -> Box<dyn OggCodecHandler> {
    Box::new(PassthroughHandler::new(CodecId::Theora))
}

fn create_flac() -> Box<dyn OggCodecHandler> {
    Box::new(PassthroughHandler::new(CodecId::Flac))
}

/// 按首包内容查找编解码器 (最长魔数前缀匹配)
pub fn find_codec(packet: &[u8]) -> Option<&'static OggCodec> {
    OGG_CODECS
        .iter()
        .filter(|codec| packet.starts_with(codec.magic))
        .max_by_key(|codec| codec.magic.len())
}

/// 为首包创建处理器, 未识别的逻辑流使用透传处理器
pub(crate) fn create_handler(codec: Option<&'static OggCodec>) -> Box<dyn OggCodecHandler> {
    match codec {
        Some(codec) => (codec.create)(),
        None => Box::new(PassthroughHandler::new(CodecId::None)),
    }
}

/// 透传处理器
///
/// 所有 packet 均视为数据包, granule 原样作为时间戳.
pub struct PassthroughHandler {
    codec_id: CodecId,
}

impl PassthroughHandler {
    /// 创建指定编解码器的透传处理器
    pub fn new(codec_id: CodecId) -> Self {
        Self { codec_id }
    }
}

impl OggCodecHandler for PassthroughHandler {
    fn header(&mut self, stream: &mut Stream, _packet: &[u8]) -> TaoResult<HeaderStatus> {
        stream.codec_id = self.codec_id;
        stream.media_type = self.codec_id.media_type();
        stream.time_base = Rational::MILLI;
        Ok(HeaderStatus::Data)
    }

    fn packet(&mut self, packet: &[u8]) -> TaoResult<Option<OggPayload>> {
        Ok(Some(OggPayload::raw(packet)))
    }

    fn granule_to_timestamps(&self, granule: u64) -> (i64, i64) {
        raw_granule_timestamps(granule)
    }
}

/// granule 原样作为时间戳, 超出 i64 范围 (含 -1) 视为未知
pub(crate) fn raw_granule_timestamps(granule: u64) -> (i64, i64) {
    match i64::try_from(granule) {
        Ok(ts) => (ts, ts),
        Err(_) => (NOPTS_VALUE, NOPTS_VALUE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_status_code() {
        assert_eq!(HeaderStatus::Header.code(), 1);
        assert_eq!(HeaderStatus::Data.code(), 0);
    }

    #[test]
    fn test_find_codec_by_magic() {
        let kate = find_codec(b"\x80kate\0\0\0\0\0").unwrap();
        assert_eq!(kate.codec_id, CodecId::Kate);
        assert_eq!(kate.nb_header, 1);
        assert!(kate.granule_is_start);

        assert_eq!(find_codec(b"\x01vorbis\0\0").unwrap().codec_id, CodecId::Vorbis);
        assert_eq!(find_codec(b"OpusHead\x01").unwrap().codec_id, CodecId::Opus);
        assert_eq!(find_codec(b"\x80theora\x03").unwrap().codec_id, CodecId::Theora);
        assert_eq!(find_codec(b"\x7fFLAC\x01\x00").unwrap().codec_id, CodecId::Flac);
    }

    #[test]
    fn test_find_codec_rejects_partial_magic() {
        // 魔数不完整, 不应匹配
        assert!(find_codec(b"\x80kate\0\0").is_none());
        assert!(find_codec(b"\x80kat").is_none());
        assert!(find_codec(b"").is_none());
        // 首字节相同但后续不同
        assert!(find_codec(b"\x80xate\0\0\0").is_none());
    }

    #[test]
    fn test_find_codec_magic_unique() {
        for (i, a) in OGG_CODECS.iter().enumerate() {
            for b in &OGG_CODECS[i + 1..] {
                assert_ne!(a.magic, b.magic, "{} 与 {} 魔数重复", a.name, b.name);
            }
        }
    }

    #[test]
    fn test_passthrough_handler() {
        let mut handler = create_handler(None);
        let mut stream = Stream::new(0);
        assert_eq!(
            handler.header(&mut stream, b"anything").unwrap(),
            HeaderStatus::Data
        );
        assert_eq!(stream.codec_id, CodecId::None);

        let payload = handler.packet(b"abc").unwrap().unwrap();
        assert_eq!(&payload.data[..], b"abc");
        assert!(payload.flags.contains(PacketFlags::KEY));

        assert_eq!(handler.granule_to_timestamps(42), (42, 42));
        assert_eq!(
            handler.granule_to_timestamps(u64::MAX),
            (NOPTS_VALUE, NOPTS_VALUE)
        );
        assert_eq!(handler.expected_headers(), None);
    }
}
