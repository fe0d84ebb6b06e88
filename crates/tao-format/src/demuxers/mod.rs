//! 解封装器实现模块.

pub mod ogg;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置解封装器
pub fn register_all_demuxers(registry: &mut FormatRegistry) {
    registry.register_demuxer(FormatId::Ogg, "ogg", ogg::OggDemuxer::create);
    registry.register_probe(Box::new(ogg::OggProbe));
}
