//! # Tao Kate
//!
//! 纯 Rust 实现的 Ogg 容器解封装, 重点支持 Kate 字幕流.
//!
//! - **容器格式**: Ogg 页面同步, CRC 校验, 跨页 packet 重组, 多路逻辑流
//! - **Kate 字幕**: 同步头解析与校验, 次级头跳过, granule 到时间戳换算,
//!   文本事件解析
//! - **其它 Ogg 编解码器**: Vorbis / Opus 头包识别, Theora / FLAC 透传
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tao_kate::format::IoContext;
//!
//! let registry = tao_kate::default_format_registry();
//! let mut io = IoContext::open_read("subtitles.ogg").unwrap();
//! let mut demuxer = registry.open_input(&mut io, Some("subtitles.ogg")).unwrap();
//! while let Ok(packet) = demuxer.read_packet(&mut io) {
//!     println!("流 #{} pts={} {:?}", packet.stream_index, packet.pts, packet.data);
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 核心类型与工具 |
//! | `tao-codec` | 编解码器标识与数据包 |
//! | `tao-format` | 容器格式框架与 Ogg 解封装 |

/// 核心类型与工具 (对标 libavutil)
pub use tao_core as core;

/// 编解码器标识与数据包 (对标 libavcodec)
pub use tao_codec as codec;

/// 容器格式框架 (对标 libavformat)
pub use tao_format as format;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> tao_format::FormatRegistry {
    let mut registry = tao_format::FormatRegistry::new();
    tao_format::register_all(&mut registry);
    registry
}
