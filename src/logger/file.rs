/// Plain-text file sink for log lines
use super::config::get_logger_config;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

struct FileSink {
    path: PathBuf,
    file: File,
}

static FILE_SINK: Lazy<Mutex<Option<FileSink>>> = Lazy::new(|| Mutex::new(None));

/// Open (or reopen) the configured log file in append mode
pub fn init_file_logging() {
    let Some(path) = get_logger_config().file_path else {
        *FILE_SINK.lock() = None;
        return;
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => *FILE_SINK.lock() = Some(FileSink { path, file }),
        Err(e) => eprintln!("Failed to open log file {}: {}", path.display(), e),
    }
}

pub fn write_to_file(line: &str) {
    let mut sink = FILE_SINK.lock();
    if let Some(sink) = sink.as_mut() {
        if writeln!(sink.file, "{}", line).is_err() {
            eprintln!("Failed to write log file {}", sink.path.display());
        }
    }
}

pub fn flush_file_logging() {
    if let Some(sink) = FILE_SINK.lock().as_mut() {
        let _ = sink.file.flush();
    }
}
