//! # tao-codec
//!
//! Tao 多媒体框架编解码器库, 提供编解码器标识与 Packet 抽象.
//!
//! 本 crate 对标 FFmpeg 的 libavcodec 中与容器层共享的部分:
//! 容器层用 [`CodecId`] 标记识别出的流, 并以 [`Packet`] 向下游输出数据.

pub mod codec_id;
pub mod packet;

// 重导出常用类型
pub use codec_id::CodecId;
pub use packet::{Packet, PacketFlags};
