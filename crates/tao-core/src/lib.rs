//! # tao-core
//!
//! Tao 多媒体框架核心库, 提供基础类型定义与错误处理.
//!
//! 本 crate 对标 FFmpeg 的 libavutil, 为容器层与编解码器处理器提供底层基础设施.

pub mod error;
pub mod media_type;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{TaoError, TaoResult};
pub use media_type::MediaType;
pub use rational::Rational;
pub use timestamp::Timestamp;
