use chrono::Local;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Maximum number of log entries to keep in memory
const MAX_LOG_ENTRIES: usize = 1000;

/// A log entry with timestamp and message
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: Level, target: &str, message: String) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S.%3f").to_string(),
            level: level.to_string().to_uppercase(),
            target: target.to_string(),
            message,
        }
    }

    /// Format for display in a log view
    pub fn format_for_display(&self) -> String {
        format!(
            "[{}] {} [{}] {}",
            self.timestamp, self.level, self.target, self.message
        )
    }
}

/// Thread-safe ring buffer for log entries
#[derive(Clone, Default)]
pub struct LogRingBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogRingBuffer {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.lock();
        if entries.len() >= MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn get_recent(&self, count: usize) -> Vec<LogEntry> {
        let entries = self.lock();
        entries.iter().rev().take(count).rev().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Writer that captures formatted log lines into the ring buffer and,
/// when configured, appends them to a log file
#[derive(Clone)]
pub struct LogWriter {
    buffer: LogRingBuffer,
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    pub fn new(buffer: LogRingBuffer, file: Option<File>) -> Self {
        Self {
            buffer,
            file: file.map(|f| Arc::new(Mutex::new(f))),
        }
    }

    fn record(&self, entry: LogEntry) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(
                    file,
                    "[{}] {} [{}] {}",
                    entry.timestamp, entry.level, entry.target, entry.message
                );
            }
        }
        self.buffer.push(entry);
    }
}

/// Split a compact-format line ("LEVEL target: message") into its parts
pub fn parse_compact_line(line: &str) -> Option<(Level, &str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (level, rest) = [
        (Level::TRACE, "TRACE "),
        (Level::DEBUG, "DEBUG "),
        (Level::INFO, "INFO "),
        (Level::WARN, "WARN "),
        (Level::ERROR, "ERROR "),
    ]
    .into_iter()
    .find_map(|(level, prefix)| line.strip_prefix(prefix).map(|rest| (level, rest.trim_start())))
    .unwrap_or((Level::INFO, line));

    // A target never contains spaces
    match rest.find(':') {
        Some(pos) if !rest[..pos].contains(' ') => Some((level, &rest[..pos], rest[pos + 1..].trim())),
        _ => Some((level, "general", rest)),
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = std::str::from_utf8(buf) {
            for line in text.lines() {
                if let Some((level, target, message)) = parse_compact_line(line) {
                    self.record(LogEntry::new(level, target, message.to_string()));
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.flush()?;
            }
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Global log buffer accessible throughout the application
static LOG_BUFFER: OnceLock<LogRingBuffer> = OnceLock::new();

/// Get the global log buffer
pub fn get_log_buffer() -> Option<LogRingBuffer> {
    LOG_BUFFER.get().cloned()
}

/// Timestamped log file name inside `dir`
pub fn log_file_path(dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("jsonl-viewer_{}.log", timestamp))
}

/// Initialize tracing: ring buffer always, log file when a directory is given.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(log_dir: Option<&Path>) -> (LogRingBuffer, Option<PathBuf>) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let buffer = LOG_BUFFER.get_or_init(LogRingBuffer::new).clone();

    let (file, path) = match log_dir {
        Some(dir) => {
            let _ = std::fs::create_dir_all(dir);
            let path = log_file_path(dir);
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => (Some(file), Some(path)),
                Err(_) => (None, None),
            }
        }
        None => (None, None),
    };

    let fmt_layer = fmt::layer()
        .with_writer(LogWriter::new(buffer.clone(), file))
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .without_time() // LogEntry carries its own timestamp
        .compact();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();

    tracing::info!(target: "logging", "Logging initialized");
    (buffer, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_line() {
        assert_eq!(
            parse_compact_line("INFO grid: Opening dataset"),
            Some((Level::INFO, "grid", "Opening dataset"))
        );
        assert_eq!(
            parse_compact_line("WARN poller: Status request failed: timeout"),
            Some((Level::WARN, "poller", "Status request failed: timeout"))
        );
        assert_eq!(
            parse_compact_line("no level here"),
            Some((Level::INFO, "general", "no level here"))
        );
        assert_eq!(parse_compact_line("   "), None);
    }

    #[test]
    fn test_ring_buffer_is_bounded() {
        let buffer = LogRingBuffer::new();
        for i in 0..(MAX_LOG_ENTRIES + 10) {
            buffer.push(LogEntry::new(Level::DEBUG, "test", i.to_string()));
        }
        assert_eq!(buffer.len(), MAX_LOG_ENTRIES);
        let recent = buffer.get_recent(1);
        assert_eq!(recent[0].message, (MAX_LOG_ENTRIES + 9).to_string());
    }

    #[test]
    fn test_writer_fills_buffer() {
        let buffer = LogRingBuffer::new();
        let mut writer = LogWriter::new(buffer.clone(), None);
        writer.write_all(b"DEBUG layout: Initialized\n").unwrap();
        let entries = buffer.get_recent(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, "layout");
        assert_eq!(entries[0].level, "DEBUG");
    }
}
