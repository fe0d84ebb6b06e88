//! Ogg Kate 字幕流处理器.
//!
//! Kate 是承载于 Ogg 中的时间轴文本字幕格式. 每个 packet 以 1 字节类型标签开头:
//!
//! | 标签          | 含义                               |
//! |---------------|------------------------------------|
//! | `0x80`        | 同步头 (BOS 首包, 完整解析)        |
//! | `0x81..=0x88` | 次级头 (注释, 样式等, 仅识别)      |
//! | `0x00`        | 文本事件                           |
//! | `0x01`        | 保活包                             |
//! | `0x02`        | 重复事件                           |
//! | `0x7F`        | 流结束                             |
//!
//! # 同步头布局 (标签之后, 小端)
//! ```text
//! magic:           7 bytes  "kate\0\0\0"
//! reserved:        1 byte
//! major, minor:    1 + 1 bytes
//! num_headers:     1 byte   (额外头包数)
//! text_encoding:   1 byte   (仅 0 = UTF-8)
//! directionality:  1 byte
//! reserved:        1 byte
//! granule_shift:   1 byte
//! canvas_width:    2 bytes  (低 12 位尾数, 高 4 位左移指数)
//! canvas_height:   2 bytes
//! reserved:        1 byte
//! time_base_num:   4 bytes
//! time_base_den:   4 bytes
//! language:        16 bytes (末字节必须为 0)
//! category:        16 bytes (末字节必须为 0)
//! ```
//!
//! granule 的高位 (`granule >> shift`) 为事件起始时间, 低 `shift` 位为偏移.

use std::io::{self, Cursor, Read};
use std::ops::RangeInclusive;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use log::{debug, warn};
use tao_codec::{CodecId, PacketFlags};
use tao_core::timestamp::NOPTS_VALUE;
use tao_core::{MediaType, Rational, TaoError, TaoResult};
use thiserror::Error;

use crate::stream::{Stream, StreamParams, SubtitleStreamParams};

use super::codec::{HeaderStatus, OggCodecHandler, OggPayload};

/// Kate 首包魔数前缀 (含类型标签)
pub const KATE_MAGIC: &[u8] = b"\x80kate\0\0\0";

/// 同步头签名 (去掉类型标签后)
const SIGNATURE: &[u8; 7] = b"kate\0\0\0";

/// 同步头负载最小长度 (不含类型标签)
pub const SYNC_HEADER_MIN_SIZE: usize = 63;

/// 文本/重复事件固定字段长度 (不含类型标签)
pub const EVENT_FIXED_SIZE: usize = 28;

/// 支持的最高次版本号
const MAX_MINOR_VERSION: u8 = 7;

/// granule 位移上限 (不含)
const MAX_GRANULE_SHIFT: u8 = 64;

const TAG_TEXT: u8 = 0x00;
const TAG_KEEPALIVE: u8 = 0x01;
const TAG_REPEAT: u8 = 0x02;
const TAG_END: u8 = 0x7F;
const TAG_SYNC_HEADER: u8 = 0x80;
const TAG_SECONDARY_HEADERS: RangeInclusive<u8> = 0x81..=0x88;

/// Kate 码流错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KateError {
    /// 同步头长度不足
    #[error("Kate 同步头过短: {0} 字节, 至少需要 63 字节")]
    HeaderTooShort(usize),

    /// 签名不是 "kate\0\0\0"
    #[error("Kate 同步头签名无效")]
    InvalidSignature,

    /// 主版本号不支持
    #[error("不支持的 Kate 主版本号: {0}")]
    UnsupportedMajorVersion(u8),

    /// 次版本号不支持
    #[error("不支持的 Kate 次版本号: {0}")]
    UnsupportedMinorVersion(u8),

    /// 文本编码不支持
    #[error("不支持的 Kate 文本编码: {0}")]
    UnsupportedEncoding(u8),

    /// granule 位移超出范围
    #[error("Kate granule 位移无效: {0}")]
    InvalidGranuleShift(u8),

    /// 时间基分子或分母为 0
    #[error("Kate 时间基无效: {num}/{den}")]
    InvalidTimeBase { num: u32, den: u32 },

    /// 语言字段未以 0 结尾
    #[error("Kate 语言字段未以 NUL 结尾")]
    InvalidLanguage,

    /// 类别字段未以 0 结尾
    #[error("Kate 类别字段未以 NUL 结尾")]
    InvalidCategory,

    /// 未知的 packet 类型标签
    #[error("未知的 Kate packet 类型: 0x{0:02X}")]
    UnknownPacketType(u8),

    /// 空 packet
    #[error("Kate packet 为空")]
    EmptyPacket,

    /// 同一逻辑流中出现第二个同步头
    #[error("Kate 逻辑流中出现重复的同步头")]
    DuplicateSyncHeader,

    /// 事件包长度不足
    #[error("Kate 事件包过短: {0} 字节, 至少需要 28 字节")]
    EventTooShort(usize),

    /// 事件时间字段为负
    #[error("Kate 事件时间无效: start={start}, duration={duration}, backlink={backlink}")]
    InvalidEventTiming {
        start: i64,
        duration: i64,
        backlink: i64,
    },

    /// 文本长度超出包尾
    #[error("Kate 文本长度越界: 声明 {declared} 字节, 剩余 {available} 字节")]
    TextOverflow { declared: u32, available: usize },

    /// 文本不是合法 UTF-8
    #[error("Kate 文本不是合法的 UTF-8")]
    InvalidText,

    /// 数据阶段出现头包
    #[error("Kate 数据包之后出现头包: 0x{0:02X}")]
    HeaderAfterData(u8),

    /// 负载缓冲区分配失败
    #[error("Kate 负载缓冲区分配失败: {0} 字节")]
    OutOfMemory(usize),
}

impl From<KateError> for TaoError {
    fn from(err: KateError) -> Self {
        let msg = err.to_string();
        match err {
            KateError::UnsupportedMajorVersion(_)
            | KateError::UnsupportedMinorVersion(_)
            | KateError::UnsupportedEncoding(_) => TaoError::Unsupported(msg),
            KateError::OutOfMemory(_) => TaoError::OutOfMemory(msg),
            _ => TaoError::InvalidData(msg),
        }
    }
}

/// Kate packet 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 同步头
    SyncHeader,
    /// 次级头 (携带原始标签)
    SecondaryHeader(u8),
    /// 文本事件
    Text,
    /// 保活包
    KeepAlive,
    /// 重复事件
    Repeat,
    /// 流结束
    End,
}

impl PacketKind {
    /// 根据类型标签分类
    pub fn from_tag(tag: u8) -> Result<Self, KateError> {
        match tag {
            TAG_SYNC_HEADER => Ok(Self::SyncHeader),
            t if TAG_SECONDARY_HEADERS.contains(&t) => Ok(Self::SecondaryHeader(t)),
            TAG_TEXT => Ok(Self::Text),
            TAG_KEEPALIVE => Ok(Self::KeepAlive),
            TAG_REPEAT => Ok(Self::Repeat),
            TAG_END => Ok(Self::End),
            other => Err(KateError::UnknownPacketType(other)),
        }
    }

    /// 是否为头包
    pub fn is_header(self) -> bool {
        matches!(self, Self::SyncHeader | Self::SecondaryHeader(_))
    }
}

/// 解析并校验后的 Kate 同步头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KateHeader {
    /// 主版本号
    pub major: u8,
    /// 次版本号
    pub minor: u8,
    /// 声明的额外头包数
    pub num_headers: u8,
    /// 文本编码 (恒为 0)
    pub text_encoding: u8,
    /// 文本方向
    pub directionality: u8,
    /// granule 位移
    pub granule_shift: u8,
    /// 画布宽度 (像素)
    pub canvas_width: u32,
    /// 画布高度 (像素)
    pub canvas_height: u32,
    /// 时间基分子
    pub time_base_num: u32,
    /// 时间基分母
    pub time_base_den: u32,
    /// 语言标签
    pub language: String,
    /// 类别
    pub category: String,
}

/// 同步头原始字段 (未校验)
struct RawSyncHeader {
    signature: [u8; 7],
    major: u8,
    minor: u8,
    num_headers: u8,
    text_encoding: u8,
    directionality: u8,
    granule_shift: u8,
    canvas_width: u16,
    canvas_height: u16,
    time_base_num: u32,
    time_base_den: u32,
    language: [u8; 16],
    category: [u8; 16],
}

impl RawSyncHeader {
    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut signature = [0u8; 7];
        r.read_exact(&mut signature)?;
        r.read_u8()?; // reserved
        let major = r.read_u8()?;
        let minor = r.read_u8()?;
        let num_headers = r.read_u8()?;
        let text_encoding = r.read_u8()?;
        let directionality = r.read_u8()?;
        r.read_u8()?; // reserved
        let granule_shift = r.read_u8()?;
        let canvas_width = r.read_u16::<LittleEndian>()?;
        let canvas_height = r.read_u16::<LittleEndian>()?;
        r.read_u8()?; // reserved
        let time_base_num = r.read_u32::<LittleEndian>()?;
        let time_base_den = r.read_u32::<LittleEndian>()?;
        let mut language = [0u8; 16];
        r.read_exact(&mut language)?;
        let mut category = [0u8; 16];
        r.read_exact(&mut category)?;
        Ok(Self {
            signature,
            major,
            minor,
            num_headers,
            text_encoding,
            directionality,
            granule_shift,
            canvas_width,
            canvas_height,
            time_base_num,
            time_base_den,
            language,
            category,
        })
    }
}

impl KateHeader {
    /// 解析同步头负载 (不含 `0x80` 类型标签)
    pub fn parse(payload: &[u8]) -> Result<Self, KateError> {
        if payload.len() < SYNC_HEADER_MIN_SIZE {
            return Err(KateError::HeaderTooShort(payload.len()));
        }
        let raw = RawSyncHeader::read(&mut Cursor::new(payload))
            .map_err(|_| KateError::HeaderTooShort(payload.len()))?;

        if &raw.signature != SIGNATURE {
            return Err(KateError::InvalidSignature);
        }
        if raw.major > 0 {
            return Err(KateError::UnsupportedMajorVersion(raw.major));
        }
        if raw.minor > MAX_MINOR_VERSION {
            return Err(KateError::UnsupportedMinorVersion(raw.minor));
        }
        if raw.text_encoding != 0 {
            return Err(KateError::UnsupportedEncoding(raw.text_encoding));
        }
        if raw.granule_shift >= MAX_GRANULE_SHIFT {
            return Err(KateError::InvalidGranuleShift(raw.granule_shift));
        }
        if raw.time_base_num == 0 || raw.time_base_den == 0 {
            return Err(KateError::InvalidTimeBase {
                num: raw.time_base_num,
                den: raw.time_base_den,
            });
        }
        let language = fixed_string(&raw.language).ok_or(KateError::InvalidLanguage)?;
        let category = fixed_string(&raw.category).ok_or(KateError::InvalidCategory)?;

        Ok(Self {
            major: raw.major,
            minor: raw.minor,
            num_headers: raw.num_headers,
            text_encoding: raw.text_encoding,
            directionality: raw.directionality,
            granule_shift: raw.granule_shift,
            canvas_width: unpack_canvas_dimension(raw.canvas_width),
            canvas_height: unpack_canvas_dimension(raw.canvas_height),
            time_base_num: raw.time_base_num,
            time_base_den: raw.time_base_den,
            language,
            category,
        })
    }

    /// 流时间基: (分母, 分子)
    pub fn time_base(&self) -> Rational {
        Rational::from_u32_approx(self.time_base_den, self.time_base_num)
            .unwrap_or(Rational::UNDEFINED)
    }

    /// 把 granule 拆分为 (起始, 偏移)
    pub fn split_granule(&self, granule: u64) -> (u64, u64) {
        split_granule(granule, self.granule_shift)
    }

    /// granule 单位的时间值换算为时间戳: `units * den / num`
    pub fn units_to_timestamp(&self, units: u64) -> i64 {
        let ts = i128::from(units) * i128::from(self.time_base_den)
            / i128::from(self.time_base_num);
        i64::try_from(ts).unwrap_or(i64::MAX)
    }

    /// granule 换算为 (pts, dts), granule 为 -1 时返回 `NOPTS_VALUE`
    pub fn granule_to_timestamps(&self, granule: u64) -> (i64, i64) {
        if granule == u64::MAX {
            return (NOPTS_VALUE, NOPTS_VALUE);
        }
        let (base, _offset) = self.split_granule(granule);
        let ts = self.units_to_timestamp(base);
        (ts, ts)
    }
}

/// 把 granule 拆分为 (高位起始, 低 `shift` 位偏移)
///
/// 对任意 `shift < 64` 满足 `base << shift | offset == granule`.
pub fn split_granule(granule: u64, shift: u8) -> (u64, u64) {
    let shift = u32::from(shift);
    let base = granule.checked_shr(shift).unwrap_or(0);
    let mask = 1u64.checked_shl(shift).map_or(u64::MAX, |v| v - 1);
    (base, granule & mask)
}

/// 解包画布尺寸: 低 12 位尾数左移高 4 位指数
pub fn unpack_canvas_dimension(packed: u16) -> u32 {
    let mantissa = u32::from(packed & 0x0FFF);
    let exponent = u32::from(packed >> 12);
    mantissa << exponent
}

/// 解析以 NUL 结尾的定长字符串, 末字节非 0 时返回 `None`
fn fixed_string(field: &[u8; 16]) -> Option<String> {
    if field[15] != 0 {
        return None;
    }
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let (text, _) = encoding_rs::UTF_8.decode_without_bom_handling(&field[..end]);
    Some(text.into_owned())
}

/// 文本/重复事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KateEvent {
    /// 起始时间 (granule 单位)
    pub start: i64,
    /// 持续时间 (granule 单位)
    pub duration: i64,
    /// 回溯距离 (granule 单位)
    pub backlink: i64,
    /// UTF-8 文本
    pub text: Vec<u8>,
}

impl KateEvent {
    /// 解析事件包负载 (不含类型标签)
    ///
    /// 文本之后的可选区域/样式数据被忽略.
    pub fn parse(body: &[u8]) -> Result<Self, KateError> {
        if body.len() < EVENT_FIXED_SIZE {
            return Err(KateError::EventTooShort(body.len()));
        }
        let mut r = Cursor::new(body);
        let truncated = |_: io::Error| KateError::EventTooShort(body.len());
        let start = r.read_i64::<LittleEndian>().map_err(truncated)?;
        let duration = r.read_i64::<LittleEndian>().map_err(truncated)?;
        let backlink = r.read_i64::<LittleEndian>().map_err(truncated)?;
        let text_len = r.read_u32::<LittleEndian>().map_err(truncated)?;

        if start < 0 || duration < 0 || backlink < 0 {
            return Err(KateError::InvalidEventTiming {
                start,
                duration,
                backlink,
            });
        }

        let rest = &body[EVENT_FIXED_SIZE..];
        let len = text_len as usize;
        if len > rest.len() {
            return Err(KateError::TextOverflow {
                declared: text_len,
                available: rest.len(),
            });
        }
        let raw_text = &rest[..len];
        if encoding_rs::UTF_8
            .decode_without_bom_handling_and_without_replacement(raw_text)
            .is_none()
        {
            return Err(KateError::InvalidText);
        }

        let mut text = Vec::new();
        text.try_reserve_exact(len)
            .map_err(|_| KateError::OutOfMemory(len))?;
        text.extend_from_slice(raw_text);

        Ok(Self {
            start,
            duration,
            backlink,
            text,
        })
    }
}

/// Kate 逻辑流处理器
#[derive(Debug, Default)]
pub struct KateHandler {
    /// 已接受的同步头
    header: Option<KateHeader>,
    /// 是否已收到结束包
    ended: bool,
}

impl KateHandler {
    /// 创建处理器
    pub fn new() -> Self {
        Self::default()
    }

    /// 已接受的同步头
    pub fn header_info(&self) -> Option<&KateHeader> {
        self.header.as_ref()
    }

    fn accept_sync_header(&mut self, stream: &mut Stream, payload: &[u8]) -> TaoResult<()> {
        if self.header.is_some() {
            return Err(KateError::DuplicateSyncHeader.into());
        }
        let header = KateHeader::parse(payload)?;

        stream.media_type = MediaType::Subtitle;
        stream.codec_id = CodecId::Kate;
        stream.time_base = header.time_base();
        stream.params = StreamParams::Subtitle(SubtitleStreamParams {
            width: header.canvas_width,
            height: header.canvas_height,
            language: header.language.clone(),
            category: header.category.clone(),
        });
        if !header.language.is_empty() {
            stream.set_metadata("language", header.language.as_str());
        }
        if !header.category.is_empty() {
            stream.set_metadata("category", header.category.as_str());
        }

        debug!(
            "Kate: 流 #{} 同步头 v{}.{}, 额外头包 {}, 时间基 {}, shift {}, 画布 {}x{}",
            stream.index,
            header.major,
            header.minor,
            header.num_headers,
            stream.time_base,
            header.granule_shift,
            header.canvas_width,
            header.canvas_height,
        );
        self.header = Some(header);
        Ok(())
    }

    fn event_payload(&self, kind: PacketKind, body: &[u8]) -> TaoResult<OggPayload> {
        let event = KateEvent::parse(body)?;
        let (pts, duration) = match &self.header {
            Some(h) => (
                h.units_to_timestamp(event.start.unsigned_abs()),
                h.units_to_timestamp(event.duration.unsigned_abs()),
            ),
            None => (NOPTS_VALUE, 0),
        };
        let mut flags = PacketFlags::KEY;
        if kind == PacketKind::Repeat {
            flags |= PacketFlags::REPEAT;
        }
        Ok(OggPayload {
            data: Bytes::from(event.text),
            pts,
            duration,
            flags,
        })
    }
}

impl OggCodecHandler for KateHandler {
    fn header(&mut self, stream: &mut Stream, packet: &[u8]) -> TaoResult<HeaderStatus> {
        let (&tag, payload) = packet.split_first().ok_or(KateError::EmptyPacket)?;
        match PacketKind::from_tag(tag)? {
            PacketKind::SyncHeader => {
                self.accept_sync_header(stream, payload)?;
                Ok(HeaderStatus::Header)
            }
            PacketKind::SecondaryHeader(t) => {
                debug!("Kate: 流 #{} 次级头 0x{:02X}, {} 字节", stream.index, t, payload.len());
                Ok(HeaderStatus::Header)
            }
            _ => Ok(HeaderStatus::Data),
        }
    }

    fn packet(&mut self, packet: &[u8]) -> TaoResult<Option<OggPayload>> {
        let (&tag, body) = packet.split_first().ok_or(KateError::EmptyPacket)?;
        if self.ended {
            if tag == TAG_END {
                warn!("Kate: 收到重复的结束包");
            }
            return Ok(None);
        }
        match PacketKind::from_tag(tag)? {
            kind @ (PacketKind::Text | PacketKind::Repeat) => {
                self.event_payload(kind, body).map(Some)
            }
            PacketKind::KeepAlive => Ok(None),
            PacketKind::End => {
                self.ended = true;
                Ok(None)
            }
            PacketKind::SyncHeader | PacketKind::SecondaryHeader(_) => {
                Err(KateError::HeaderAfterData(tag).into())
            }
        }
    }

    fn granule_to_timestamps(&self, granule: u64) -> (i64, i64) {
        match &self.header {
            Some(h) => h.granule_to_timestamps(granule),
            None => (NOPTS_VALUE, NOPTS_VALUE),
        }
    }

    fn expected_headers(&self) -> Option<usize> {
        self.header
            .as_ref()
            .map(|h| 1 + usize::from(h.num_headers))
    }

    fn reset(&mut self) {
        self.ended = false;
    }
}

/// 构造 Kate 同步头 packet (含 `0x80` 标签)
#[cfg(test)]
pub(crate) struct SyncHeaderBuilder {
    pub signature: [u8; 7],
    pub major: u8,
    pub minor: u8,
    pub num_headers: u8,
    pub text_encoding: u8,
    pub granule_shift: u8,
    pub canvas_width: u16,
    pub canvas_height: u16,
    pub time_base_num: u32,
    pub time_base_den: u32,
    pub language: [u8; 16],
    pub category: [u8; 16],
}

#[cfg(test)]
impl Default for SyncHeaderBuilder {
    fn default() -> Self {
        let mut language = [0u8; 16];
        language[..2].copy_from_slice(b"en");
        let mut category = [0u8; 16];
        category[..3].copy_from_slice(b"SUB");
        Self {
            signature: *SIGNATURE,
            major: 0,
            minor: 5,
            num_headers: 2,
            text_encoding: 0,
            granule_shift: 32,
            canvas_width: 0,
            canvas_height: 0,
            time_base_num: 1,
            time_base_den: 1,
            language,
            category,
        }
    }
}

#[cfg(test)]
impl SyncHeaderBuilder {
    pub fn build(&self) -> Vec<u8> {
        let mut p = vec![TAG_SYNC_HEADER];
        p.extend_from_slice(&self.signature);
        p.push(0);
        p.push(self.major);
        p.push(self.minor);
        p.push(self.num_headers);
        p.push(self.text_encoding);
        p.push(0); // directionality
        p.push(0);
        p.push(self.granule_shift);
        p.extend_from_slice(&self.canvas_width.to_le_bytes());
        p.extend_from_slice(&self.canvas_height.to_le_bytes());
        p.push(0);
        p.extend_from_slice(&self.time_base_num.to_le_bytes());
        p.extend_from_slice(&self.time_base_den.to_le_bytes());
        p.extend_from_slice(&self.language);
        p.extend_from_slice(&self.category);
        // 补齐到最小长度
        p.resize(1 + SYNC_HEADER_MIN_SIZE, 0);
        p
    }
}

/// 构造文本/重复事件 packet
#[cfg(test)]
pub(crate) fn build_event(tag: u8, start: i64, duration: i64, text: &[u8]) -> Vec<u8> {
    let mut p = vec![tag];
    p.extend_from_slice(&start.to_le_bytes());
    p.extend_from_slice(&duration.to_le_bytes());
    p.extend_from_slice(&0i64.to_le_bytes());
    p.extend_from_slice(&(text.len() as u32).to_le_bytes());
    p.extend_from_slice(text);
    p
}
