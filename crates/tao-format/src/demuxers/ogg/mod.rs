//! Ogg 容器解封装器.
//!
//! 负责页面读取, 段表重组 packet, 逻辑流管理与 seek. 各逻辑流的码流细节
//! (头包识别, 时间戳换算, 数据包解析) 由 [`codec`] 中按魔数选出的处理器完成:
//! - Kate (字幕, 完整解析)
//! - Vorbis / Opus (音频, 解析标识头)
//! - Theora / FLAC (透传)

pub mod codec;
pub mod kate;
pub mod opus;
mod page;
pub mod vorbis;

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use log::{debug, warn};
use tao_codec::{CodecId, Packet};
use tao_core::timestamp::{NOPTS_VALUE, is_nopts};
use tao_core::{TaoError, TaoResult, Timestamp};

use crate::demuxer::{Demuxer, SeekFlags};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{score_magic, FormatProbe, ProbeScore, SCORE_EXTENSION};
use crate::stream::Stream;

use codec::{HeaderStatus, OggCodec, OggCodecHandler};
use page::{OGG_SYNC, OggPage};

pub use codec::{OGG_CODECS, OggPayload, find_codec};
pub use kate::{KateError, KateHandler, KateHeader};

/// Ogg 逻辑流状态
struct OggLogicalStream {
    /// 序列号
    serial_number: u32,
    /// 流索引
    stream_index: usize,
    /// 编解码器描述符 (未识别时为 None)
    codec: Option<&'static OggCodec>,
    /// 编解码器处理器
    handler: Box<dyn OggCodecHandler>,
    /// 是否仍处于头包阶段
    in_headers: bool,
    /// 已保留的头包
    header_packets: Vec<Bytes>,
    /// 累积的不完整 packet 数据
    partial_packet: Vec<u8>,
    /// 残包起始页面的字节偏移
    partial_pos: i64,
    /// 正在丢弃无头续包 (缺少起始片段)
    discarding_orphan_continued: bool,
    /// 上一页的 granule
    last_granule: Option<u64>,
    /// 上一个页面序号
    last_page_sequence: Option<u32>,
    /// 当前逻辑流是否已遇到 EOS
    ended: bool,
}

impl OggLogicalStream {
    fn new(serial_number: u32, stream_index: usize, codec: Option<&'static OggCodec>) -> Self {
        Self {
            serial_number,
            stream_index,
            codec,
            handler: codec::create_handler(codec),
            in_headers: true,
            header_packets: Vec::new(),
            partial_packet: Vec::new(),
            partial_pos: -1,
            discarding_orphan_continued: false,
            last_granule: None,
            last_page_sequence: None,
            ended: false,
        }
    }

    /// 完成头包阶段所需的头包数
    fn required_headers(&self) -> usize {
        self.handler
            .expected_headers()
            .or(self.codec.map(|c| c.nb_header))
            .unwrap_or(0)
    }

    /// 是否还在等待头包
    fn awaiting_headers(&self) -> bool {
        self.in_headers && self.header_packets.len() < self.required_headers()
    }

    /// 运行态复位 (seek / 重启)
    fn reset_runtime(&mut self) {
        self.partial_packet.clear();
        self.partial_pos = -1;
        self.discarding_orphan_continued = false;
        self.last_granule = None;
        self.last_page_sequence = None;
        self.ended = false;
        self.handler.reset();
    }
}

/// Ogg 解封装器
pub struct OggDemuxer {
    /// 流信息列表
    streams: Vec<Stream>,
    /// 逻辑流状态, 与发现顺序一致
    logical_streams: Vec<OggLogicalStream>,
    /// 待发送的数据包队列
    packet_queue: VecDeque<Packet>,
    /// 是否已到达 EOF
    eof: bool,
    /// 容器时长 (秒)
    duration_sec: Option<f64>,
    /// 当前处理页面的起始字节偏移
    page_pos: i64,
}

impl OggDemuxer {
    /// 创建 Ogg 解封装器
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            logical_streams: Vec::new(),
            packet_queue: VecDeque::new(),
            eof: false,
            duration_sec: None,
            page_pos: -1,
        }
    }

    /// 创建 Ogg 解封装器实例 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 查找逻辑流
    fn find_logical_stream(&self, serial: u32) -> Option<usize> {
        self.logical_streams
            .iter()
            .position(|s| s.serial_number == serial)
    }

    /// 同步并读取下一个页面, 记录其起始偏移
    fn next_page(&mut self, io: &mut IoContext) -> TaoResult<OggPage> {
        let page = page::sync_to_page(io)?;
        // 位置不可知时记为 -1
        self.page_pos = io
            .position()
            .map_or(-1, |end| end.saturating_sub(page.size()) as i64);
        Ok(page)
    }

    /// 处理新逻辑流的 BOS 页面, 创建流后按普通页面处理
    fn handle_bos_page(&mut self, page: OggPage) -> TaoResult<()> {
        let packets = page.extract_packets();
        let Some(&(offset, length, _)) = packets.first() else {
            return Ok(());
        };
        let first = &page.data[offset..offset + length];
        let codec = find_codec(first);

        let stream_index = self.streams.len();
        self.streams.push(Stream::new(stream_index));
        self.logical_streams
            .push(OggLogicalStream::new(page.serial_number, stream_index, codec));

        debug!(
            "Ogg: 发现流 #{} (serial=0x{:08X}): {}",
            stream_index,
            page.serial_number,
            codec.map_or("未知", |c| c.name),
        );

        self.process_page(page)
    }

    /// 处理页面, 重组 packet 并交给逻辑流处理器
    fn process_page(&mut self, page: OggPage) -> TaoResult<()> {
        let Some(ls_idx) = self.find_logical_stream(page.serial_number) else {
            return Ok(()); // 未知流, 跳过
        };

        let packets = page.extract_packets();
        if page.is_bos() && self.logical_streams[ls_idx].last_page_sequence.is_some() {
            let restart = packets.first().and_then(|&(offset, length, complete)| {
                if complete {
                    find_codec(&page.data[offset..offset + length])
                } else {
                    None
                }
            });
            if let Some(codec) = restart {
                // 运行中重新遇到合法 BOS 头页, 视为逻辑流重启边界
                debug!(
                    "Ogg: 流 #{} 重启为 {}",
                    self.logical_streams[ls_idx].stream_index, codec.name,
                );
                let ls = &mut self.logical_streams[ls_idx];
                ls.codec = Some(codec);
                ls.handler = (codec.create)();
                ls.in_headers = true;
                ls.header_packets.clear();
                ls.reset_runtime();
            }
        }

        if self.logical_streams[ls_idx].ended {
            return Ok(());
        }

        let mut force_granule_none = false;
        if let Some(prev_seq) = self.logical_streams[ls_idx].last_page_sequence
            && page.page_sequence != prev_seq.wrapping_add(1)
        {
            // 页面序号断裂: 丢弃残包, 本页不传播 granule
            let ls = &mut self.logical_streams[ls_idx];
            ls.partial_packet.clear();
            ls.discarding_orphan_continued = page.is_continued();
            force_granule_none = true;
        }
        self.logical_streams[ls_idx].last_page_sequence = Some(page.page_sequence);

        // 上一页以 lacing=255 恰好在页尾结束的 packet, 在此补发
        if !page.is_continued() && !self.logical_streams[ls_idx].partial_packet.is_empty() {
            let ls = &mut self.logical_streams[ls_idx];
            if ls.discarding_orphan_continued {
                debug!(
                    "Ogg: 流 #{} 结束 orphan 丢弃状态, 丢弃 {} 字节残片",
                    ls.stream_index,
                    ls.partial_packet.len(),
                );
                ls.partial_packet.clear();
                ls.discarding_orphan_continued = false;
            } else {
                let granule = ls.last_granule;
                let pos = ls.partial_pos;
                let data = std::mem::take(&mut ls.partial_packet);
                self.route_packet(ls_idx, granule, data, pos)?;
            }
        }

        let page_granule = (page.has_granule() && !force_granule_none)
            .then_some(page.granule_position);
        let last_complete_idx = packets.iter().rposition(|(_, _, complete)| *complete);

        for (i, &(offset, length, complete)) in packets.iter().enumerate() {
            let chunk = &page.data[offset..offset + length];
            let granule = if Some(i) == last_complete_idx {
                page_granule
            } else {
                None
            };

            if i == 0 && page.is_continued() {
                let ls = &mut self.logical_streams[ls_idx];
                // 没有前置残片时, 该 continued 包缺少起始数据, 需要整包丢弃
                if ls.partial_packet.is_empty() {
                    ls.discarding_orphan_continued = !complete;
                    debug!(
                        "Ogg: 流 #{} 遇到无头续包, 丢弃当前片段 (len={}, complete={})",
                        ls.stream_index, length, complete,
                    );
                    continue;
                }
                ls.partial_packet.extend_from_slice(chunk);
                if complete {
                    ls.discarding_orphan_continued = false;
                    let pos = ls.partial_pos;
                    let data = std::mem::take(&mut ls.partial_packet);
                    self.route_packet(ls_idx, granule, data, pos)?;
                }
            } else if complete {
                let ls = &mut self.logical_streams[ls_idx];
                if ls.discarding_orphan_continued {
                    ls.discarding_orphan_continued = false;
                    debug!("Ogg: 流 #{} 结束无头续包丢弃状态", ls.stream_index);
                    continue;
                }
                self.route_packet(ls_idx, granule, chunk.to_vec(), self.page_pos)?;
            } else {
                let ls = &mut self.logical_streams[ls_idx];
                if !ls.discarding_orphan_continued {
                    if ls.partial_packet.is_empty() {
                        ls.partial_pos = self.page_pos;
                    }
                    ls.partial_packet.extend_from_slice(chunk);
                }
            }
        }

        if page_granule.is_some() {
            self.logical_streams[ls_idx].last_granule = page_granule;
        }

        if page.is_eos() {
            self.logical_streams[ls_idx].ended = true;
            debug!(
                "Ogg: 流 #{} (serial=0x{:08X}) 结束",
                self.logical_streams[ls_idx].stream_index, page.serial_number,
            );
        }
        Ok(())
    }

    /// 把一个完整 packet 交给逻辑流处理器, 需要输出时入队
    ///
    /// `pos` 为 packet 起始所在页面的字节偏移.
    fn route_packet(
        &mut self,
        ls_idx: usize,
        granule: Option<u64>,
        data: Vec<u8>,
        pos: i64,
    ) -> TaoResult<()> {
        let ls = &mut self.logical_streams[ls_idx];
        let stream = &mut self.streams[ls.stream_index];

        if ls.in_headers {
            match ls.handler.header(stream, &data)? {
                HeaderStatus::Header => {
                    if ls.header_packets.is_empty() {
                        stream.extra_data = data.clone();
                    }
                    ls.header_packets.push(Bytes::from(data));
                    return Ok(());
                }
                HeaderStatus::Data => {
                    ls.in_headers = false;
                    let required = ls.required_headers();
                    if ls.header_packets.len() < required {
                        warn!(
                            "Ogg: 流 #{} 头包不足: 收到 {}, 需要 {}",
                            ls.stream_index,
                            ls.header_packets.len(),
                            required,
                        );
                    }
                }
            }
        }

        let Some(payload) = ls.handler.packet(&data)? else {
            return Ok(());
        };

        let (mut pts, mut dts) = match granule {
            Some(g) => ls.handler.granule_to_timestamps(g),
            None => (NOPTS_VALUE, NOPTS_VALUE),
        };
        let granule_is_start = ls.codec.is_some_and(|c| c.granule_is_start);
        if is_nopts(pts) {
            pts = payload.pts;
            dts = payload.pts;
        } else if !granule_is_start && payload.duration > 0 {
            // granule 标记结束时间, 起点需回退一个 packet 时长
            pts = pts.saturating_sub(payload.duration);
            dts = pts;
        }

        let mut pkt = Packet::from_data(payload.data);
        pkt.stream_index = ls.stream_index;
        pkt.pts = pts;
        pkt.dts = dts;
        pkt.duration = payload.duration;
        pkt.flags = payload.flags;
        pkt.time_base = stream.time_base;
        pkt.pos = pos;
        self.packet_queue.push_back(pkt);
        Ok(())
    }

    /// 是否还有逻辑流在等待头包
    fn awaiting_headers(&self) -> bool {
        self.logical_streams.iter().any(OggLogicalStream::awaiting_headers)
    }

    /// 获取指定流已保留的头包
    pub fn header_packets(&self, stream_index: usize) -> &[Bytes] {
        self.logical_streams
            .iter()
            .find(|ls| ls.stream_index == stream_index)
            .map(|ls| ls.header_packets.as_slice())
            .unwrap_or_default()
    }

    /// 重置 seek 后的运行态缓存
    fn reset_runtime_state(&mut self) {
        self.packet_queue.clear();
        self.eof = false;
        for ls in &mut self.logical_streams {
            ls.reset_runtime();
        }
    }

    /// 估算时长并回填流 duration
    ///
    /// 仅在可 seek 输入上启用. 扫描后续页面的最大 granule, 由各逻辑流的处理器
    /// 换算为时间戳后作为流时长.
    fn estimate_duration(&mut self, io: &mut IoContext) -> TaoResult<()> {
        self.duration_sec = None;
        if !io.is_seekable() {
            return Ok(());
        }

        let resume_pos = io.position()?;
        let mut max_granule_by_serial: HashMap<u32, u64> = HashMap::new();

        loop {
            match page::sync_to_page(io) {
                Ok(page) => {
                    if !page.has_granule() || self.find_logical_stream(page.serial_number).is_none() {
                        continue;
                    }
                    let entry = max_granule_by_serial
                        .entry(page.serial_number)
                        .or_insert(page.granule_position);
                    *entry = (*entry).max(page.granule_position);
                }
                Err(TaoError::Eof) => break,
                Err(e) => {
                    debug!("Ogg: 时长扫描中止: {}", e);
                    break;
                }
            }
        }

        io.seek(std::io::SeekFrom::Start(resume_pos))?;

        for ls in &self.logical_streams {
            let Some(&max_granule) = max_granule_by_serial.get(&ls.serial_number) else {
                continue;
            };
            // 取 granule 换算出的起点. Kate 的 granule 只编码事件起始时间,
            // 末尾事件自身的持续时长不计入流时长
            let (end, _) = ls.handler.granule_to_timestamps(max_granule);
            if !is_nopts(end)
                && let Some(stream) = self.streams.get_mut(ls.stream_index)
            {
                stream.duration = end;
            }
        }

        self.duration_sec = self
            .streams
            .iter()
            .filter(|s| s.duration > 0)
            .filter_map(|s| Timestamp::new(s.duration, s.time_base).seconds())
            .reduce(f64::max);

        Ok(())
    }
}

impl Default for OggDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for OggDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Ogg
    }

    fn name(&self) -> &str {
        "ogg"
    }

    fn open(&mut self, io: &mut IoContext) -> TaoResult<()> {
        // 读取所有 BOS 页面, 再继续读取直到各流头包齐全或进入数据阶段
        loop {
            let page = match self.next_page(io) {
                Ok(page) => page,
                Err(TaoError::Eof) if !self.streams.is_empty() => {
                    self.eof = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            if page.is_bos() && self.find_logical_stream(page.serial_number).is_none() {
                self.handle_bos_page(page)?;
                continue;
            }
            self.process_page(page)?;
            if !self.awaiting_headers() {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(TaoError::InvalidData("Ogg 文件中未找到任何流".into()));
        }

        if let Err(e) = self.estimate_duration(io) {
            debug!("Ogg 时长估算失败: {}", e);
        }

        debug!("打开 Ogg: {} 个流", self.streams.len());
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> TaoResult<Packet> {
        loop {
            if let Some(pkt) = self.packet_queue.pop_front() {
                return Ok(pkt);
            }
            if self.eof {
                return Err(TaoError::Eof);
            }
            match self.next_page(io) {
                Ok(page) => {
                    if page.is_bos() && self.find_logical_stream(page.serial_number).is_none() {
                        self.handle_bos_page(page)?;
                    } else {
                        self.process_page(page)?;
                    }
                }
                Err(TaoError::Eof) => self.eof = true,
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: usize,
        timestamp: i64,
        flags: SeekFlags,
    ) -> TaoResult<()> {
        if stream_index >= self.streams.len() {
            return Err(TaoError::StreamNotFound(stream_index));
        }
        if flags.byte {
            return Err(TaoError::NotImplemented("Ogg 字节级 seek 尚未实现".into()));
        }
        if !io.is_seekable() {
            return Err(TaoError::Unsupported("不支持在非可寻址流上 seek".into()));
        }

        let ls_idx = self
            .logical_streams
            .iter()
            .position(|s| s.stream_index == stream_index)
            .ok_or(TaoError::StreamNotFound(stream_index))?;
        let target_serial = self.logical_streams[ls_idx].serial_number;
        let min_granule = match self.streams[stream_index].codec_id {
            // Vorbis/Opus 的 comment/setup 头包通常为 granule=0, seek 时跳过头包页
            CodecId::Vorbis | CodecId::Opus => 1,
            _ => 0,
        };
        let target = timestamp.max(0);

        io.seek(std::io::SeekFrom::Start(0))?;
        let mut first_non_bos: Option<u64> = None;
        let mut best_before: Option<u64> = None;
        let mut first_after: Option<u64> = None;

        loop {
            let page = match page::sync_to_page(io) {
                Ok(page) => page,
                Err(TaoError::Eof) => break,
                Err(e) => return Err(e),
            };
            let page_start = io.position()?.saturating_sub(page.size());

            if !page.is_bos() && first_non_bos.is_none() {
                first_non_bos = Some(page_start);
            }
            if page.serial_number != target_serial
                || page.data.is_empty()
                || !page.has_granule()
                || page.granule_position < min_granule
            {
                continue;
            }
            let (pts, _) = self.logical_streams[ls_idx]
                .handler
                .granule_to_timestamps(page.granule_position);
            if is_nopts(pts) {
                continue;
            }
            if pts <= target {
                best_before = Some(page_start);
                continue;
            }
            first_after = Some(page_start);
            break;
        }

        let seek_offset = if flags.backward {
            best_before.or(first_after)
        } else {
            first_after.or(best_before)
        }
        .or(first_non_bos)
        .unwrap_or(0);

        io.seek(std::io::SeekFrom::Start(seek_offset))?;
        self.reset_runtime_state();

        debug!(
            "Ogg seek: stream={}, target={}, 定位偏移={}, backward={}",
            stream_index, target, seek_offset, flags.backward
        );
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.duration_sec
    }

    fn header_packets(&self, stream_index: usize) -> &[Bytes] {
        OggDemuxer::header_packets(self, stream_index)
    }
}

/// Ogg 格式探测器
pub struct OggProbe;

impl FormatProbe for OggProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if let Some(score) = score_magic(data, OGG_SYNC) {
            return Some(score);
        }
        if filename.and_then(FormatId::from_filename) == Some(FormatId::Ogg) {
            return Some(SCORE_EXTENSION);
        }
        None
    }

    fn format_id(&self) -> FormatId {
        FormatId::Ogg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;
    use crate::stream::StreamParams;
    use kate::{SyncHeaderBuilder, build_event};
    use page::{
        FLAG_BOS, FLAG_CONTINUED, FLAG_EOS, GRANULE_NONE, build_page, build_page_multi, build_page_raw,
    };
    use tao_codec::PacketFlags;
    use tao_core::{MediaType, Rational};

    const KATE_SERIAL: u32 = 0x4B41_5445;

    fn open(data: Vec<u8>) -> (OggDemuxer, IoContext) {
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let mut demuxer = OggDemuxer::new();
        demuxer.open(&mut io).unwrap();
        (demuxer, io)
    }

    fn read_all(demuxer: &mut OggDemuxer, io: &mut IoContext) -> Vec<Packet> {
        let mut packets = Vec::new();
        loop {
            match demuxer.read_packet(io) {
                Ok(pkt) => packets.push(pkt),
                Err(TaoError::Eof) => return packets,
                Err(e) => panic!("读取失败: {e}"),
            }
        }
    }

    /// Kate 流: 同步头 + 2 个次级头 + 文本事件 + 结束包
    fn build_kate_ogg() -> Vec<u8> {
        let sync = SyncHeaderBuilder::default().build();
        let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
        data.extend(build_page_multi(
            0,
            0,
            KATE_SERIAL,
            1,
            &[b"\x81kate\0\0\0comments", b"\x82kate\0\0\0styles"],
        ));
        let first = build_event(0x00, 10, 2, b"first");
        let second = build_event(0x02, 12, 3, b"second");
        data.extend(build_page_multi(0, 12 << 32, KATE_SERIAL, 2, &[&first, &second]));
        data.extend(build_page(0, GRANULE_NONE, KATE_SERIAL, 3, &[0x01]));
        data.extend(build_page(FLAG_EOS, 20 << 32, KATE_SERIAL, 4, &[0x7F]));
        data
    }

    /// Vorbis 流: 三个头包页 + 三个音频页 + EOS
    fn build_vorbis_seek_test_ogg() -> Vec<u8> {
        let serial = 0x8765_4321;
        let mut data = build_page(FLAG_BOS, 0, serial, 0, &vorbis::build_identification(2, 44100));
        data.extend(build_page(0, 0, serial, 1, b"\x03vorbis\0\0\0\0\0\0\0\0"));
        data.extend(build_page(0, 0, serial, 2, b"\x05vorbis\0\0\0\0\0\0\0\0"));
        data.extend(build_page(0, 256, serial, 3, &[0x00, 0x11]));
        data.extend(build_page(0, 512, serial, 4, &[0x00, 0x22]));
        data.extend(build_page(0, 768, serial, 5, &[0x00, 0x33]));
        data.extend(build_page(FLAG_EOS, 1024, serial, 6, &[]));
        data
    }

    #[test]
    fn test_probe_ogg() {
        let probe = OggProbe;
        assert_eq!(probe.probe(b"OggS", None), Some(crate::probe::SCORE_MAX));
        assert!(probe.probe(b"RIFF", None).is_none());
        assert_eq!(probe.probe(b"ID3\x04\x00\x00\x00\x00\x00\x00OggS", None), Some(crate::probe::SCORE_AFTER_ID3));
        assert_eq!(probe.probe(&[], Some("subs.kate")), Some(SCORE_EXTENSION));
        assert!(probe.probe(&[], Some("test.mp3")).is_none());
        assert_eq!(probe.format_id(), FormatId::Ogg);
    }

    #[test]
    fn test_kate_stream_info() {
        let (demuxer, _) = open(build_kate_ogg());
        let streams = demuxer.streams();
        assert_eq!(streams.len(), 1);
        let s = &streams[0];
        assert_eq!(s.codec_id, CodecId::Kate);
        assert_eq!(s.media_type, MediaType::Subtitle);
        assert_eq!(s.time_base, Rational::new(1, 1));
        assert!(s.extra_data.starts_with(kate::KATE_MAGIC));
        assert!(matches!(&s.params, StreamParams::Subtitle(p) if p.language == "en"));
        // 同步头 + 2 个次级头
        assert_eq!(demuxer.header_packets(0).len(), 3);
        assert_eq!(demuxer.header_packets(0)[1][0], 0x81);
        assert!(demuxer.header_packets(7).is_empty());
    }

    #[test]
    fn test_kate_events() {
        let (mut demuxer, mut io) = open(build_kate_ogg());
        let packets = read_all(&mut demuxer, &mut io);
        assert_eq!(packets.len(), 2, "保活包与结束包不应输出");

        // 非页面末包: 时间戳来自负载
        assert_eq!(&packets[0].data[..], b"first");
        assert_eq!(packets[0].pts, 10);
        assert_eq!(packets[0].dts, 10);
        assert_eq!(packets[0].duration, 2);
        assert!(!packets[0].is_repeat());

        // 页面末包: 时间戳来自页面 granule
        assert_eq!(&packets[1].data[..], b"second");
        assert_eq!(packets[1].pts, 12);
        assert_eq!(packets[1].dts, 12);
        assert_eq!(packets[1].duration, 3);
        assert!(packets[1].flags.contains(PacketFlags::REPEAT | PacketFlags::KEY));
        assert_eq!(packets[1].time_base, Rational::new(1, 1));
    }

    #[test]
    fn test_kate_duration_from_last_granule() {
        let (demuxer, _) = open(build_kate_ogg());
        assert_eq!(demuxer.streams()[0].duration, 20);
        assert_eq!(demuxer.duration(), Some(20.0));
    }

    #[test]
    fn test_kate_bad_sync_header_fails_open() {
        let sync = SyncHeaderBuilder {
            major: 1,
            ..Default::default()
        }
        .build();
        let data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let err = OggDemuxer::new().open(&mut io).unwrap_err();
        assert!(matches!(err, TaoError::Unsupported(_)), "实际: {err}");
    }

    #[test]
    fn test_kate_header_after_data_is_error() {
        let sync = SyncHeaderBuilder {
            num_headers: 0,
            ..Default::default()
        }
        .build();
        let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
        data.extend(build_page(0, 1 << 32, KATE_SERIAL, 1, &build_event(0, 1, 1, b"a")));
        data.extend(build_page(0, GRANULE_NONE, KATE_SERIAL, 2, b"\x83late header"));
        let (mut demuxer, mut io) = open(data);
        assert_eq!(demuxer.read_packet(&mut io).unwrap().pts, 1);
        assert!(matches!(
            demuxer.read_packet(&mut io),
            Err(TaoError::InvalidData(_))
        ));
    }

    #[test]
    fn test_packet_spanning_pages() {
        let sync = SyncHeaderBuilder {
            num_headers: 0,
            ..Default::default()
        }
        .build();
        let text = vec![b'x'; 400];
        let event = build_event(0x00, 5, 1, &text);
        let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);

        // 第一页只有一个 255 段, packet 延续到下一页
        let (head, tail) = event.split_at(255);
        data.extend(build_page_raw(0, GRANULE_NONE, KATE_SERIAL, 1, &[255], head));
        data.extend(build_page(FLAG_CONTINUED | FLAG_EOS, 5 << 32, KATE_SERIAL, 2, tail));

        let (mut demuxer, mut io) = open(data);
        let packets = read_all(&mut demuxer, &mut io);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data.len(), 400);
        assert_eq!(packets[0].pts, 5);
    }

    #[test]
    fn test_packet_pos_is_start_page_offset() {
        let sync = SyncHeaderBuilder {
            num_headers: 0,
            ..Default::default()
        }
        .build();
        let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
        let first_pos = data.len() as i64;
        data.extend(build_page(0, 1 << 32, KATE_SERIAL, 1, &build_event(0x00, 1, 1, b"a")));

        // 跨页 packet 记录起始页偏移
        let long = build_event(0x00, 5, 1, &[b'y'; 300]);
        let (head, tail) = long.split_at(255);
        let span_pos = data.len() as i64;
        data.extend(build_page_raw(0, GRANULE_NONE, KATE_SERIAL, 2, &[255], head));
        data.extend(build_page(FLAG_CONTINUED | FLAG_EOS, 5 << 32, KATE_SERIAL, 3, tail));

        let (mut demuxer, mut io) = open(data);
        let packets = read_all(&mut demuxer, &mut io);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].pos, first_pos);
        assert_eq!(packets[1].pos, span_pos);
    }

    #[test]
    fn test_resync_after_short_junk_between_pages() {
        let sync = SyncHeaderBuilder {
            num_headers: 0,
            ..Default::default()
        }
        .build();
        for junk in 1..=3usize {
            let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
            data.extend(std::iter::repeat_n(0xAAu8, junk));
            let event_pos = data.len() as i64;
            data.extend(build_page(FLAG_EOS, 4 << 32, KATE_SERIAL, 1, &build_event(0x00, 4, 1, b"kept")));

            let (mut demuxer, mut io) = open(data);
            let packets = read_all(&mut demuxer, &mut io);
            assert_eq!(packets.len(), 1, "junk={junk}");
            assert_eq!(&packets[0].data[..], b"kept");
            assert_eq!(packets[0].pts, 4);
            assert_eq!(packets[0].pos, event_pos);
        }
    }

    #[test]
    fn test_kate_duration_ignores_last_event_length() {
        let sync = SyncHeaderBuilder {
            num_headers: 0,
            ..Default::default()
        }
        .build();
        let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
        data.extend(build_page(FLAG_EOS, 20 << 32, KATE_SERIAL, 1, &build_event(0x00, 20, 5, b"tail")));
        let (demuxer, _) = open(data);
        // 时长取最后 granule 的起点 20, 不含事件自身的 5
        assert_eq!(demuxer.streams()[0].duration, 20);
        assert_eq!(demuxer.duration(), Some(20.0));
    }

    #[test]
    fn test_orphan_continued_packet_dropped() {
        let sync = SyncHeaderBuilder {
            num_headers: 0,
            ..Default::default()
        }
        .build();
        let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
        data.extend(build_page_multi(
            FLAG_CONTINUED,
            3 << 32,
            KATE_SERIAL,
            1,
            &[b"tail of lost packet", &build_event(0, 3, 1, b"ok")],
        ));
        let (mut demuxer, mut io) = open(data);
        let packets = read_all(&mut demuxer, &mut io);
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0].data[..], b"ok");
    }

    #[test]
    fn test_vorbis_single_stream() {
        let (mut demuxer, mut io) = open(build_vorbis_seek_test_ogg());
        let streams = demuxer.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].codec_id, CodecId::Vorbis);
        assert_eq!(streams[0].media_type, MediaType::Audio);
        assert_eq!(streams[0].duration, 1024);
        assert_eq!(demuxer.header_packets(0).len(), 3);

        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.pts, 256);
        assert_eq!(&pkt.data[..], &[0x00, 0x11]);
    }

    #[test]
    fn test_unknown_stream_passthrough() {
        let serial = 9;
        let mut data = build_page(FLAG_BOS, 0, serial, 0, b"mystery codec");
        data.extend(build_page(FLAG_EOS, 77, serial, 1, b"payload"));
        let (mut demuxer, mut io) = open(data);
        assert_eq!(demuxer.streams()[0].codec_id, CodecId::None);
        assert_eq!(demuxer.streams()[0].media_type, MediaType::Data);

        let packets = read_all(&mut demuxer, &mut io);
        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[0].data[..], b"mystery codec");
        assert_eq!(packets[1].pts, 77);
    }

    #[test]
    fn test_multiplexed_kate_and_vorbis() {
        let vorbis_serial = 1;
        let mut data = build_page(FLAG_BOS, 0, vorbis_serial, 0, &vorbis::build_identification(1, 8000));
        data.extend(build_page(
            FLAG_BOS,
            0,
            KATE_SERIAL,
            0,
            &SyncHeaderBuilder {
                num_headers: 0,
                ..Default::default()
            }
            .build(),
        ));
        data.extend(build_page(0, 0, vorbis_serial, 1, b"\x03vorbis\0\0\0\0\0\0\0\0"));
        data.extend(build_page(0, 0, vorbis_serial, 2, b"\x05vorbis\0\0\0\0\0\0\0\0"));
        data.extend(build_page(0, 4 << 32, KATE_SERIAL, 1, &build_event(0, 4, 1, b"sub")));
        data.extend(build_page(FLAG_EOS, 160, vorbis_serial, 3, &[0x00]));

        let (mut demuxer, mut io) = open(data);
        assert_eq!(demuxer.streams().len(), 2);
        assert_eq!(demuxer.streams()[0].codec_id, CodecId::Vorbis);
        assert_eq!(demuxer.streams()[1].codec_id, CodecId::Kate);

        let packets = read_all(&mut demuxer, &mut io);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].stream_index, 1);
        assert_eq!(packets[0].pts, 4);
        assert_eq!(packets[1].stream_index, 0);
        assert_eq!(packets[1].pts, 160);
    }

    #[test]
    fn test_seek_skip_vorbis_header_pages() {
        let (mut demuxer, mut io) = open(build_vorbis_seek_test_ogg());
        demuxer.seek(&mut io, 0, 0, SeekFlags::default()).unwrap();
        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.pts, 256, "seek 应跳过 granule=0 的头包页");
    }

    #[test]
    fn test_seek_backward_and_forward() {
        let (mut demuxer, mut io) = open(build_vorbis_seek_test_ogg());
        demuxer.seek(&mut io, 0, 700, SeekFlags::default()).unwrap();
        assert_eq!(demuxer.read_packet(&mut io).unwrap().pts, 512);

        let flags = SeekFlags {
            backward: false,
            ..SeekFlags::default()
        };
        demuxer.seek(&mut io, 0, 700, flags).unwrap();
        assert_eq!(demuxer.read_packet(&mut io).unwrap().pts, 768);
    }

    #[test]
    fn test_seek_kate_by_converted_timestamp() {
        let sync = SyncHeaderBuilder {
            num_headers: 0,
            ..Default::default()
        }
        .build();
        let mut data = build_page(FLAG_BOS, 0, KATE_SERIAL, 0, &sync);
        for (seq, start) in [(1u32, 10i64), (2, 20), (3, 30)] {
            let event = build_event(0, start, 1, format!("t{start}").as_bytes());
            data.extend(build_page(0, (start as u64) << 32, KATE_SERIAL, seq, &event));
        }
        let (mut demuxer, mut io) = open(data);

        demuxer.seek(&mut io, 0, 25, SeekFlags::default()).unwrap();
        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.pts, 20);
        assert_eq!(&pkt.data[..], b"t20");
    }

    #[test]
    fn test_seek_errors() {
        let (mut demuxer, mut io) = open(build_vorbis_seek_test_ogg());
        assert!(matches!(
            demuxer.seek(&mut io, 5, 0, SeekFlags::default()),
            Err(TaoError::StreamNotFound(5))
        ));
        let flags = SeekFlags {
            byte: true,
            ..SeekFlags::default()
        };
        let err = demuxer.seek(&mut io, 0, 0, flags).unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[test]
    fn test_empty_input() {
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(Vec::new())));
        assert!(matches!(OggDemuxer::new().open(&mut io), Err(TaoError::Eof)));
    }
}
