//! Ogg 页面读取与校验.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (each 1 byte, packet sizes)
//! Page data:       sum(segment_table) bytes
//! ```
//!
//! 段表中连续的非 255 值段组合成一个完整的 packet.

use tao_core::{TaoError, TaoResult};

use crate::io::IoContext;

/// Ogg 同步字 (capture pattern)
pub(crate) const OGG_SYNC: &[u8; 4] = b"OggS";
/// Ogg CRC-32 多项式
const OGG_CRC_POLY: u32 = 0x04C11DB7;
/// 页面固定头部长度
pub(crate) const PAGE_HEADER_SIZE: u64 = 27;

/// 页面头部标志
pub(crate) const FLAG_CONTINUED: u8 = 0x01;
pub(crate) const FLAG_BOS: u8 = 0x02;
pub(crate) const FLAG_EOS: u8 = 0x04;

/// 页面 granule 为 -1 时表示本页没有 packet 在此结束
pub(crate) const GRANULE_NONE: u64 = u64::MAX;

const CRC_ERROR_PREFIX: &str = "Ogg 页面 CRC 校验失败";

/// 已解析的 Ogg 页面
#[derive(Debug)]
pub(crate) struct OggPage {
    /// 头部标志
    pub header_type: u8,
    /// 粒度位置 (原始 64 位值, `GRANULE_NONE` 表示未知)
    pub granule_position: u64,
    /// 逻辑流序列号
    pub serial_number: u32,
    /// 页面序号 (用于乱序检测)
    pub page_sequence: u32,
    /// 段表
    pub segment_table: Vec<u8>,
    /// 页面数据
    pub data: Vec<u8>,
}

impl OggPage {
    /// 是否为 BOS (beginning of stream) 页面
    pub fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    /// 是否为 EOS (end of stream) 页面
    pub fn is_eos(&self) -> bool {
        self.header_type & FLAG_EOS != 0
    }

    /// 是否为续延页面 (前一个 packet 的延续)
    pub fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }

    /// 页面是否携带有效 granule
    pub fn has_granule(&self) -> bool {
        self.granule_position != GRANULE_NONE
    }

    /// 页面总字节数 (含头部与段表)
    pub fn size(&self) -> u64 {
        PAGE_HEADER_SIZE + self.segment_table.len() as u64 + self.data.len() as u64
    }

    /// 从段表中提取 packet 边界
    ///
    /// 返回 (offset, length, is_complete) 列表
    pub fn extract_packets(&self) -> Vec<(usize, usize, bool)> {
        let mut packets = Vec::new();
        let mut offset = 0usize;
        let mut current_len = 0usize;

        for &seg_size in &self.segment_table {
            current_len += seg_size as usize;
            if seg_size < 255 {
                // packet 完成
                packets.push((offset, current_len, true));
                offset += current_len;
                current_len = 0;
            }
        }

        // 如果最后一个段是 255, 说明 packet 未完成 (跨页面)
        if current_len > 0 {
            packets.push((offset, current_len, false));
        }

        packets
    }
}

/// 计算 Ogg 页面 CRC-32
pub(crate) fn ogg_crc32(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ OGG_CRC_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// 读取同步字与版本号之后的页面内容, 并执行 CRC 校验
fn read_page_body(io: &mut IoContext) -> TaoResult<OggPage> {
    let header_type = io.read_u8()?;
    let granule_position = io.read_u64_le()?;
    let serial_number = io.read_u32_le()?;
    let page_sequence = io.read_u32_le()?;
    let crc = io.read_u32_le()?;
    let num_segments = io.read_u8()? as usize;

    let mut segment_table = vec![0u8; num_segments];
    io.read_exact(&mut segment_table)?;

    let data_size: usize = segment_table.iter().map(|&s| s as usize).sum();
    let mut data = vec![0u8; data_size];
    io.read_exact(&mut data)?;

    // Ogg CRC 覆盖整个页面, 其中 CRC 字段本身按 0 参与计算.
    let mut crc_page = Vec::with_capacity(PAGE_HEADER_SIZE as usize + num_segments + data_size);
    crc_page.extend_from_slice(OGG_SYNC);
    crc_page.push(0);
    crc_page.push(header_type);
    crc_page.extend_from_slice(&granule_position.to_le_bytes());
    crc_page.extend_from_slice(&serial_number.to_le_bytes());
    crc_page.extend_from_slice(&page_sequence.to_le_bytes());
    crc_page.extend_from_slice(&0u32.to_le_bytes());
    crc_page.push(num_segments as u8);
    crc_page.extend_from_slice(&segment_table);
    crc_page.extend_from_slice(&data);
    let crc_calc = ogg_crc32(&crc_page);
    if crc != crc_calc {
        return Err(TaoError::InvalidData(format!(
            "{CRC_ERROR_PREFIX}: 读取=0x{crc:08X}, 计算=0x{crc_calc:08X}",
        )));
    }

    Ok(OggPage {
        header_type,
        granule_position,
        serial_number,
        page_sequence,
        segment_table,
        data,
    })
}

fn is_crc_error(err: &TaoError) -> bool {
    matches!(err, TaoError::InvalidData(msg) if msg.starts_with(CRC_ERROR_PREFIX))
}

/// 同步到下一个 Ogg 页面
///
/// 以 4 字节滑动窗口逐字节搜索 "OggS", 已读取的字节始终留在窗口内,
/// 因此同步字前的任意长度垃圾数据都不会吞掉后续页面.
/// CRC 失败的页面已被完整消费, 从其后继续搜索.
pub(crate) fn sync_to_page(io: &mut IoContext) -> TaoResult<OggPage> {
    let mut window = io.read_tag()?;
    let mut skipped = 0u64;
    loop {
        if &window == OGG_SYNC {
            let version = io.read_u8()?;
            if version == 0 {
                match read_page_body(io) {
                    Ok(page) => {
                        if skipped > 0 {
                            log::debug!("Ogg: 重新同步, 跳过 {} 字节", skipped);
                        }
                        return Ok(page);
                    }
                    Err(e) if is_crc_error(&e) => {
                        log::debug!("跳过 CRC 错误的 Ogg 页面: {}", e);
                        window = io.read_tag()?;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            // 版本号非 0, 误判的同步字
            window = [window[1], window[2], window[3], version];
            skipped += 1;
            continue;
        }
        window = [window[1], window[2], window[3], io.read_u8()?];
        skipped += 1;
    }
}

/// 构建一个 Ogg 页面 (含正确的 CRC), 单个 packet
#[cfg(test)]
pub(crate) fn build_page(
    header_type: u8,
    granule: u64,
    serial: u32,
    page_seq: u32,
    packet_data: &[u8],
) -> Vec<u8> {
    build_page_multi(header_type, granule, serial, page_seq, &[packet_data])
}

/// 构建一个包含多个完整 packet 的 Ogg 页面
#[cfg(test)]
pub(crate) fn build_page_multi(
    header_type: u8,
    granule: u64,
    serial: u32,
    page_seq: u32,
    packets: &[&[u8]],
) -> Vec<u8> {
    let mut segments = Vec::new();
    for packet in packets {
        let mut remaining = packet.len();
        while remaining >= 255 {
            segments.push(255u8);
            remaining -= 255;
        }
        segments.push(remaining as u8);
    }
    build_page_raw(header_type, granule, serial, page_seq, &segments, &packets.concat())
}

/// 按给定段表构建页面, 可用于构造跨页 packet
#[cfg(test)]
pub(crate) fn build_page_raw(
    header_type: u8,
    granule: u64,
    serial: u32,
    page_seq: u32,
    segments: &[u8],
    data: &[u8],
) -> Vec<u8> {
    let mut page = Vec::new();
    page.extend_from_slice(OGG_SYNC);
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&page_seq.to_le_bytes());
    let crc_offset = page.len();
    page.extend_from_slice(&0u32.to_le_bytes());
    page.push(segments.len() as u8);
    page.extend_from_slice(segments);
    page.extend_from_slice(data);

    let crc = ogg_crc32(&page);
    page[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    #[test]
    fn test_page_extract_packets() {
        // 段表 [100, 50, 255, 200]:
        // 100 < 255 → packet 1 完成 (100 字节)
        // 50 < 255 → packet 2 完成 (50 字节)
        // 255 = 255 → 累积
        // 200 < 255 → packet 3 完成 (255+200=455 字节)
        let page = OggPage {
            header_type: 0,
            granule_position: 100,
            serial_number: 1,
            page_sequence: 0,
            segment_table: vec![100, 50, 255, 200],
            data: vec![0u8; 100 + 50 + 255 + 200],
        };
        let packets = page.extract_packets();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], (0, 100, true));
        assert_eq!(packets[1], (100, 50, true));
        assert_eq!(packets[2], (150, 455, true));

        // 段表以 255 结尾 → 最后一个 packet 未完成 (跨页面)
        let page2 = OggPage {
            header_type: 0,
            granule_position: 100,
            serial_number: 1,
            page_sequence: 0,
            segment_table: vec![100, 255],
            data: vec![0u8; 100 + 255],
        };
        let packets2 = page2.extract_packets();
        assert_eq!(packets2.len(), 2);
        assert_eq!(packets2[0], (0, 100, true));
        assert_eq!(packets2[1], (100, 255, false));
    }

    #[test]
    fn test_read_page_roundtrip_fields() {
        let bytes = build_page(FLAG_BOS, GRANULE_NONE, 0xABCD, 7, b"hello");
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(bytes.clone())));
        let page = sync_to_page(&mut io).unwrap();
        assert!(page.is_bos());
        assert!(!page.is_eos());
        assert!(!page.has_granule());
        assert_eq!(page.serial_number, 0xABCD);
        assert_eq!(page.page_sequence, 7);
        assert_eq!(page.data, b"hello");
        assert_eq!(page.size(), bytes.len() as u64);
    }

    #[test]
    fn test_read_page_crc_mismatch() {
        let mut bytes = build_page(0, 0, 1, 0, b"payload");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(bytes)));
        // 跳过同步字与版本号
        io.read_bytes(5).unwrap();
        let err = read_page_body(&mut io).unwrap_err();
        assert!(is_crc_error(&err), "期望 CRC 错误, 实际: {err}");
    }

    #[test]
    fn test_sync_after_short_garbage() {
        // 1..=3 字节垃圾与同步字部分重叠, 页面不能丢失
        for junk in 1..=5usize {
            let mut data = vec![b'x'; junk];
            data.extend_from_slice(&build_page(0, 4, 9, 0, b"event"));
            let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
            let page = sync_to_page(&mut io)
                .unwrap_or_else(|e| panic!("垃圾长度 {junk}: 同步失败: {e}"));
            assert_eq!(page.granule_position, 4, "垃圾长度 {junk}");
            assert_eq!(page.data, b"event");
        }
    }

    #[test]
    fn test_sync_skips_false_sync_with_bad_version() {
        let mut data = b"OggS\x01".to_vec();
        data.extend_from_slice(&build_page(0, 7, 9, 0, b"ok"));
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let page = sync_to_page(&mut io).unwrap();
        assert_eq!(page.granule_position, 7);
    }

    #[test]
    fn test_sync_skips_garbage_and_bad_page() {
        let mut data = b"junkjunk".to_vec();
        let mut bad = build_page(0, 0, 1, 0, b"bad");
        let last = bad.len() - 1;
        bad[last] ^= 0x55;
        data.extend_from_slice(&bad);
        data.extend_from_slice(&build_page(0, 42, 1, 1, b"good"));

        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let page = sync_to_page(&mut io).unwrap();
        assert_eq!(page.granule_position, 42);
        assert_eq!(page.data, b"good");
        assert!(matches!(sync_to_page(&mut io), Err(TaoError::Eof)));
    }
}
