/// Level and tag filtering in front of the output sinks
use super::config::{get_logger_config, is_debug_enabled_for_tag};
use super::levels::LogLevel;
use super::tags::LogTag;

/// Errors always pass; everything else must clear the minimum level, debug
/// lines need their tag enabled, and a non-empty `enabled_tags` whitelists
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    if level == LogLevel::Error {
        return true;
    }

    let config = get_logger_config();
    let tag_allowed =
        config.enabled_tags.is_empty() || config.enabled_tags.contains(&tag.to_debug_key());

    level <= config.min_level
        && tag_allowed
        && (level != LogLevel::Debug || is_debug_enabled_for_tag(tag))
}

pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if should_log(&tag, level) {
        super::format::format_and_log(tag, level, message);
    }
}
