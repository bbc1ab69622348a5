//! Log formatting and output with ANSI colors
//!
//! Handles:
//! - Colorized console output with tag and level formatting
//! - Dual output (console + file)
//! - Broken pipe handling for piped commands

use super::config::{get_logger_config, ConsoleTarget};
use super::file::write_to_file;
use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stderr, stdout, ErrorKind, Write};

/// Log format widths for alignment
const TAG_WIDTH: usize = 8;
const LEVEL_WIDTH: usize = 7;

/// Format and output a log message
pub fn format_and_log(tag: LogTag, level: LogLevel, message: &str) {
    let now = Local::now();
    let time = now.format("%H:%M:%S%.3f").to_string();

    let console_line = format!(
        "{} [{}] [{}] {}",
        time.dimmed(),
        format_tag(&tag),
        format_level(level),
        message
    );

    match get_logger_config().console {
        ConsoleTarget::Stdout => print_safe(&mut stdout(), &console_line),
        ConsoleTarget::Stderr => print_safe(&mut stderr(), &console_line),
        ConsoleTarget::Off => {}
    }

    let file_line = format!(
        "{} [{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        tag.to_plain_string(),
        level.as_str(),
        message
    );
    #[cfg(test)]
    capture::record(&file_line);
    write_to_file(&file_line);
}

/// Format a tag with appropriate color
fn format_tag(tag: &LogTag) -> ColoredString {
    let padded = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::System => padded.bright_yellow().bold(),
        LogTag::Config => padded.yellow().bold(),
        LogTag::Swap => padded.bright_green().bold(),
        LogTag::Quote => padded.green().bold(),
        LogTag::Rpc => padded.bright_blue().bold(),
        LogTag::Wallet => padded.bright_magenta().bold(),
        LogTag::Worker => padded.bright_cyan().bold(),
        LogTag::Harness => padded.cyan().bold(),
        LogTag::Lock => padded.magenta().bold(),
        LogTag::Retry => padded.bright_red().bold(),
        LogTag::Monitor => padded.blue().bold(),
    }
}

fn format_level(level: LogLevel) -> ColoredString {
    let padded = format!("{:<width$}", level.as_str(), width = LEVEL_WIDTH);
    match level {
        LogLevel::Error => padded.bright_red().bold(),
        LogLevel::Warning => padded.bright_yellow().bold(),
        LogLevel::Info => padded.bright_white(),
        LogLevel::Debug => padded.bright_black(),
        LogLevel::Verbose => padded.dimmed(),
    }
}

/// Write a line, ignoring broken pipes (e.g. output piped into `head`)
fn print_safe<W: Write>(out: &mut W, line: &str) {
    if let Err(e) = writeln!(out, "{}", line) {
        if e.kind() != ErrorKind::BrokenPipe {
            eprintln!("Logger write failed: {}", e);
        }
        return;
    }
    let _ = out.flush();
}
