//! 压缩数据包 (Packet).
//!
//! 对标 FFmpeg 的 `AVPacket`, 表示从容器格式中读取的一个数据单元
//! (一帧音视频压缩数据, 或一个字幕事件).

use bitflags::bitflags;
use bytes::Bytes;
use tao_core::{Rational, Timestamp};

bitflags! {
    /// 数据包标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PacketFlags: u32 {
        /// 关键帧 (可独立解码)
        const KEY = 1 << 0;
        /// 重复发送的字幕事件, 内容与之前某个事件相同
        const REPEAT = 1 << 1;
    }
}

/// 数据包
///
/// 从容器格式中读取的数据单元. 时间戳与时长均以 `time_base` 为单位.
#[derive(Debug, Clone)]
pub struct Packet {
    /// 负载数据
    pub data: Bytes,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 解码时间戳 (DTS)
    pub dts: i64,
    /// 数据包时长 (以 time_base 为单位, 0 表示未知)
    pub duration: i64,
    /// 时间基
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    /// 标志位
    pub flags: PacketFlags,
    /// 在容器中的字节偏移量 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: tao_core::timestamp::NOPTS_VALUE,
            dts: tao_core::timestamp::NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            flags: PacketFlags::empty(),
            pos: -1,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 是否为重复发送的字幕事件
    pub fn is_repeat(&self) -> bool {
        self.flags.contains(PacketFlags::REPEAT)
    }

    /// 带时间基的显示时间戳
    pub fn pts_timestamp(&self) -> Timestamp {
        Timestamp::new(self.pts, self.time_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_empty_no_timestamp() {
        let pkt = Packet::from_data(vec![1u8, 2, 3]);
        assert_eq!(pkt.size(), 3);
        assert!(!pkt.pts_timestamp().is_valid());
        assert!(!pkt.flags.contains(PacketFlags::KEY));
    }

    #[test]
    fn test_packet_flags() {
        let mut pkt = Packet::empty();
        pkt.flags = PacketFlags::KEY | PacketFlags::REPEAT;
        assert!(pkt.flags.contains(PacketFlags::KEY));
        assert!(pkt.is_repeat());
        assert!(pkt.is_empty());
    }
}
