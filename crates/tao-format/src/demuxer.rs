//! 解封装器 (Demuxer) trait 定义.
//!
//! 对标 FFmpeg 的 `AVInputFormat`, 定义了从容器格式中读取数据包的接口.

use bytes::Bytes;
use tao_codec::Packet;
use tao_core::TaoResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 使用流程:
/// 1. 调用 `open()` 打开容器, 解析各逻辑流的头包
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 读取数据包, 直到返回 `TaoError::Eof`
/// 4. 可选: 调用 `seek()` 进行定位
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开容器并解析头部信息
    ///
    /// 头包校验失败 (签名错误, 版本不支持等) 时返回错误, 容器不可继续使用.
    fn open(&mut self, io: &mut IoContext) -> TaoResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(TaoError::Eof)`: 已到达文件末尾
    /// - 其他错误: 码流损坏或不被支持, 调用方应停止读取
    fn read_packet(&mut self, io: &mut IoContext) -> TaoResult<Packet>;

    /// 定位到指定时间点
    ///
    /// # 参数
    /// - `stream_index`: 目标流索引
    /// - `timestamp`: 目标时间戳 (以流的 time_base 为单位)
    /// - `flags`: Seek 标志
    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: usize,
        timestamp: i64,
        flags: SeekFlags,
    ) -> TaoResult<()>;

    /// 获取容器时长 (秒), None 表示未知
    fn duration(&self) -> Option<f64>;

    /// 获取指定流已保留的头包 (不会作为数据包输出)
    fn header_packets(&self, _stream_index: usize) -> &[Bytes] {
        &[]
    }
}

/// Seek 标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekFlags {
    /// 向后 seek (定位到目标之前最近的页面)
    pub backward: bool,
    /// 基于字节位置 seek (而非时间戳)
    pub byte: bool,
}

impl Default for SeekFlags {
    fn default() -> Self {
        Self {
            backward: true,
            byte: false,
        }
    }
}
