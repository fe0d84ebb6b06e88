//! tao-probe - Ogg / Kate 字幕信息探测工具
//!
//! 对标 FFmpeg 的 ffprobe 命令行工具, 用于分析 Ogg 文件中的逻辑流与字幕事件.

mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use tao_codec::Packet;
use tao_core::timestamp::is_nopts;
use tao_core::{MediaType, TaoError, Timestamp};
use tao_format::demuxer::Demuxer;
use tao_format::stream::{AudioStreamParams, StreamParams, SubtitleStreamParams};
use tao_format::{FormatRegistry, IoContext};

/// Ogg / Kate 字幕信息探测工具
#[derive(Parser, Debug)]
#[command(name = "tao-probe", version, about = "纯 Rust Ogg / Kate 字幕探测工具")]
struct Cli {
    /// 输入文件路径
    input: Option<String>,

    /// 显示流信息
    #[arg(long, default_value_t = true)]
    show_streams: bool,

    /// 显示格式信息
    #[arg(long, default_value_t = true)]
    show_format: bool,

    /// 显示数据包统计 (会读取全部数据包)
    #[arg(long)]
    show_packets: bool,

    /// 显示字幕事件 (会读取全部数据包)
    #[arg(long)]
    show_events: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,

    /// 日志详细程度 (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 日志目录
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

// ============================================================
// JSON 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize)]
struct ProbeOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<FormatInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    streams: Option<Vec<StreamInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packets: Option<PacketSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<EventInfo>>,
}

/// 格式信息
#[derive(Serialize)]
struct FormatInfo {
    filename: String,
    format_name: String,
    nb_streams: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    probe_score: u32,
}

/// 流信息
#[derive(Serialize, Default)]
struct StreamInfo {
    index: usize,
    codec_type: String,
    codec_name: String,
    time_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    nb_header_packets: usize,
    // 音频字段
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u32>,
    // 字幕字段
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
}

/// 数据包统计
#[derive(Serialize, Default)]
struct PacketSummary {
    total_packets: u64,
    total_bytes: u64,
}

/// 字幕事件
#[derive(Serialize, Debug, PartialEq)]
struct EventInfo {
    stream_index: usize,
    pts: i64,
    duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<f64>,
    repeat: bool,
    text: String,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(input_path) = cli.input.as_deref() else {
        print_banner();
        return Ok(());
    };

    logging::init(&cli.log_dir, "tao-probe", cli.verbose)?;

    if !cli.quiet {
        eprintln!(
            "tao-probe 版本 {} -- 纯 Rust Ogg / Kate 探测工具",
            env!("CARGO_PKG_VERSION")
        );
        eprintln!("输入文件: {input_path}");
    }

    let mut format_registry = FormatRegistry::new();
    tao_format::register_all(&mut format_registry);

    let mut io = IoContext::open_read(input_path)
        .with_context(|| format!("无法打开文件 '{input_path}'"))?;

    let probe_result = format_registry
        .probe_input(&mut io, Some(input_path))
        .context("无法识别文件格式")?;
    info!(
        "格式: {} (置信度: {})",
        probe_result.format_id, probe_result.score
    );

    let mut demuxer = format_registry
        .create_demuxer(probe_result.format_id)
        .context("无法创建解封装器")?;
    demuxer.open(&mut io).context("无法解析文件头部")?;

    let format_info = cli.show_format.then(|| FormatInfo {
        filename: input_path.to_string(),
        format_name: probe_result.format_id.name().to_string(),
        nb_streams: demuxer.streams().len(),
        duration: demuxer.duration(),
        probe_score: probe_result.score,
    });

    let streams_info = cli.show_streams.then(|| {
        demuxer
            .streams()
            .iter()
            .map(|s| {
                let mut info = build_stream_info(s);
                info.nb_header_packets = demuxer.header_packets(s.index).len();
                info
            })
            .collect::<Vec<_>>()
    });

    let (packet_summary, events) = if cli.show_packets || cli.show_events {
        let (summary, events) = read_all_packets(demuxer.as_mut(), &mut io);
        (
            cli.show_packets.then_some(summary),
            cli.show_events.then_some(events),
        )
    } else {
        (None, None)
    };

    if cli.json {
        let output = ProbeOutput {
            format: format_info,
            streams: streams_info,
            packets: packet_summary,
            events,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        if let Some(ref fmt_info) = format_info {
            print_format_text(fmt_info);
        }
        if let Some(ref streams) = streams_info {
            print_streams_text(streams);
        }
        if let Some(ref pkt_sum) = packet_summary {
            print_packets_text(pkt_sum);
        }
        if let Some(ref events) = events {
            print_events_text(events);
        }
    }
    Ok(())
}

/// 读取全部数据包, 统计字节数并收集字幕事件
///
/// 读取出错时保留已读取的结果.
fn read_all_packets(
    demuxer: &mut dyn Demuxer,
    io: &mut IoContext,
) -> (PacketSummary, Vec<EventInfo>) {
    let mut summary = PacketSummary::default();
    let mut events = Vec::new();
    loop {
        match demuxer.read_packet(io) {
            Ok(pkt) => {
                summary.total_packets += 1;
                summary.total_bytes += pkt.size() as u64;
                let is_subtitle = demuxer
                    .streams()
                    .get(pkt.stream_index)
                    .is_some_and(|s| s.media_type == MediaType::Subtitle);
                if is_subtitle {
                    events.push(build_event_info(&pkt));
                }
            }
            Err(TaoError::Eof) => break,
            Err(e) => {
                warn!("读取数据包时出错: {e}");
                break;
            }
        }
    }
    (summary, events)
}

/// 从 Stream 构建 StreamInfo
fn build_stream_info(stream: &tao_format::Stream) -> StreamInfo {
    let duration = if stream.duration > 0 {
        Timestamp::new(stream.duration, stream.time_base).seconds()
    } else {
        None
    };

    let mut info = StreamInfo {
        index: stream.index,
        codec_type: stream.media_type.as_str().to_string(),
        codec_name: stream.codec_id.to_string(),
        time_base: stream.time_base.to_string(),
        duration,
        ..Default::default()
    };

    match &stream.params {
        StreamParams::Audio(AudioStreamParams {
            sample_rate,
            channels,
        }) => {
            info.sample_rate = Some(*sample_rate);
            info.channels = Some(*channels);
        }
        StreamParams::Subtitle(SubtitleStreamParams {
            width,
            height,
            language,
            category,
        }) => {
            if *width > 0 && *height > 0 {
                info.width = Some(*width);
                info.height = Some(*height);
            }
            if !language.is_empty() {
                info.language = Some(language.clone());
            }
            if !category.is_empty() {
                info.category = Some(category.clone());
            }
        }
        StreamParams::Other => {}
    }

    info
}

/// 从字幕数据包构建 EventInfo
fn build_event_info(pkt: &Packet) -> EventInfo {
    let start_time = pkt.pts_timestamp().seconds();
    let end_time = if is_nopts(pkt.pts) {
        None
    } else {
        Timestamp::new(pkt.pts.saturating_add(pkt.duration), pkt.time_base).seconds()
    };
    EventInfo {
        stream_index: pkt.stream_index,
        pts: pkt.pts,
        duration: pkt.duration,
        start_time,
        end_time,
        repeat: pkt.is_repeat(),
        text: String::from_utf8_lossy(&pkt.data).into_owned(),
    }
}

/// 文本输出: 格式信息
fn print_format_text(info: &FormatInfo) {
    println!("[FORMAT]");
    println!("  文件名       : {}", info.filename);
    println!("  格式名称     : {}", info.format_name);
    println!("  流数量       : {}", info.nb_streams);
    if let Some(dur) = info.duration {
        println!("  时长         : {dur:.3} 秒");
    }
    println!("  探测置信度   : {}", info.probe_score);
    println!("[/FORMAT]");
    println!();
}

/// 文本输出: 流信息
fn print_streams_text(streams: &[StreamInfo]) {
    for stream in streams {
        println!("[STREAM #{}]", stream.index);
        println!("  类型         : {}", stream.codec_type);
        println!("  编解码器     : {}", stream.codec_name);
        println!("  时间基       : {}", stream.time_base);
        println!("  头包数       : {}", stream.nb_header_packets);
        if let Some(dur) = stream.duration {
            println!("  时长         : {dur:.3} 秒");
        }

        // 音频特有
        if let Some(sr) = stream.sample_rate {
            println!("  采样率       : {sr} Hz");
        }
        if let Some(ch) = stream.channels {
            println!("  声道数       : {ch}");
        }

        // 字幕特有
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            println!("  画布         : {w}x{h}");
        }
        if let Some(ref lang) = stream.language {
            println!("  语言         : {lang}");
        }
        if let Some(ref cat) = stream.category {
            println!("  类别         : {cat}");
        }
        println!("[/STREAM]");
        println!();
    }
}

/// 文本输出: 数据包统计
fn print_packets_text(summary: &PacketSummary) {
    println!("[PACKETS]");
    println!("  数据包总数   : {}", summary.total_packets);
    println!(
        "  数据总量     : {} 字节 ({:.2} KB)",
        summary.total_bytes,
        summary.total_bytes as f64 / 1024.0
    );
    println!("[/PACKETS]");
    println!();
}

/// 文本输出: 字幕事件
fn print_events_text(events: &[EventInfo]) {
    println!("[EVENTS]");
    for event in events {
        let range = match (event.start_time, event.end_time) {
            (Some(start), Some(end)) => format!("{start:>9.3} --> {end:>9.3}"),
            _ => format!("{:>23}", "N/A"),
        };
        let repeat = if event.repeat { " (重复)" } else { "" };
        println!("  #{} {range}{repeat} {}", event.stream_index, event.text);
    }
    println!("[/EVENTS]");
    println!();
}

/// 打印版本横幅
fn print_banner() {
    println!(
        "tao-probe 版本 {} -- 纯 Rust Ogg / Kate 探测工具",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("用法: tao-probe [选项] <输入文件>");
    println!();
    println!("选项:");
    println!("  --show-streams    显示流信息 (默认开启)");
    println!("  --show-format     显示格式信息 (默认开启)");
    println!("  --show-packets    显示数据包统计");
    println!("  --show-events     显示字幕事件");
    println!("  --json            以 JSON 格式输出");
    println!("  -q, --quiet       静默模式");
    println!("  -v, -vv           提高日志详细程度");
    println!("  --log-dir <DIR>   日志目录 (默认 logs)");
    println!();
    println!("使用 --help 查看完整用法.");
}
