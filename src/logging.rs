/*
================================================================================
                        Inference Explorer Logging
================================================================================

Application logging goes through the `log` crate (debug!, info!, ...).

- `setup_logger()`: installs a composite logger. Console output comes from
  env_logger with timestamps and coloured levels. A ring buffer keeps the last
  1000 lines from this crate for export.
- `setup_panic_hook()`: writes panic.log with a backtrace and the buffered
  log lines.
- `export_debug_logs()`: writes the buffered log lines to debug.log.

Log levels:
- Debug builds: DEBUG and above
- Release builds: ERROR only (unless RUST_LOG is set)

On wasm32 the browser console is the only sink (console_log).

File locations: `<data_dir>/<app_name>/logs/` (dirs crate).
================================================================================
*/

use std::panic;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::collections::VecDeque;
use std::path::PathBuf;
use env_logger::fmt::Color;
use env_logger::fmt::Formatter;
use log::{Level, LevelFilter, Metadata, Record};
use chrono::Utc;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

pub const MAX_LOG_LINES: usize = 1000;
const LOG_TARGET: &str = "inference_explorer";

pub type LogBuffer = Arc<Mutex<VecDeque<String>>>;

struct BufferLogger {
    log_buffer: LogBuffer,
}

impl BufferLogger {
    fn new() -> Self {
        Self {
            log_buffer: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES))),
        }
    }

    fn log_to_buffer(&self, message: &str, target: &str, line: Option<u32>) {
        let mut buffer = self.log_buffer.lock().unwrap();
        if buffer.len() == MAX_LOG_LINES {
            buffer.pop_front();
        }

        // The module is already in the target, only the line is appended
        let formatted_message = if let Some(line_num) = line {
            format!("{target}:{line_num} {message}")
        } else {
            format!("{target} {message}")
        };

        buffer.push_back(formatted_message);
    }

    fn get_shared_buffer(&self) -> LogBuffer {
        Arc::clone(&self.log_buffer)
    }
}

impl log::Log for BufferLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with(LOG_TARGET) && metadata.level() <= LevelFilter::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("{:<5} {}", record.level(), record.args());
            self.log_to_buffer(&message, record.target(), record.line());
        }
    }

    fn flush(&self) {}
}

struct CompositeLogger {
    console_logger: env_logger::Logger,
    buffer_logger: BufferLogger,
}

impl log::Log for CompositeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console_logger.enabled(metadata) || self.buffer_logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console_logger.enabled(record.metadata()) {
            self.console_logger.log(record);
        }
        if self.buffer_logger.enabled(record.metadata()) {
            self.buffer_logger.log(record);
        }
    }

    fn flush(&self) {
        self.console_logger.flush();
        self.buffer_logger.flush();
    }
}

#[cfg(target_arch = "wasm32")]
pub fn setup_logger(_app_name: &str) -> LogBuffer {
    let level = if cfg!(debug_assertions) { Level::Debug } else { Level::Error };
    if let Err(e) = console_log::init_with_level(level) {
        eprintln!("Failed to set console logger: {e}");
    }
    Arc::new(Mutex::new(VecDeque::new()))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn setup_logger(_app_name: &str) -> LogBuffer {
    let buffer_logger = BufferLogger::new();
    let shared_buffer = buffer_logger.get_shared_buffer();

    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    } else if cfg!(debug_assertions) {
        builder.filter(Some(LOG_TARGET), LevelFilter::Debug);
    } else {
        builder.filter(Some(LOG_TARGET), LevelFilter::Error);
    }

    // Filter out all other crates' logs
    builder.filter(None, LevelFilter::Off);

    builder.format(|buf: &mut Formatter, record: &Record| {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        let module_info = match (record.module_path(), record.line()) {
            (Some(module), Some(line)) => format!("{module}:{line}"),
            (Some(module), None) => module.to_string(),
            (None, Some(line)) => format!("line:{line}"),
            (None, None) => "unknown".to_string(),
        };

        let mut level_style = buf.style();
        let mut meta_style = buf.style();

        match record.level() {
            Level::Error => level_style.set_color(Color::Red).set_bold(true),
            Level::Warn => level_style.set_color(Color::Yellow).set_bold(true),
            Level::Info => level_style.set_color(Color::Green).set_bold(true),
            Level::Debug => level_style.set_color(Color::Blue).set_bold(true),
            Level::Trace => level_style.set_color(Color::White),
        };

        #[cfg(target_os = "macos")]
        {
            // Color::Rgb does not work on macOS
            meta_style.set_color(Color::Blue);
        }

        #[cfg(not(target_os = "macos"))]
        {
            meta_style.set_color(Color::Rgb(120, 120, 120));
        }

        writeln!(
            buf,
            "{} {} {} {}",
            meta_style.value(timestamp),
            level_style.value(record.level()),
            meta_style.value(module_info),
            record.args()
        )
    });

    let composite_logger = CompositeLogger {
        console_logger: builder.build(),
        buffer_logger,
    };

    if let Err(e) = log::set_boxed_logger(Box::new(composite_logger)) {
        eprintln!("Failed to set logger: {e}");
        return shared_buffer;
    }

    // Always set the maximum level to Trace so that filtering works correctly
    log::set_max_level(LevelFilter::Trace);

    shared_buffer
}

pub fn get_log_directory(app_name: &str) -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(app_name).join("logs")
}

/// Exports the current log buffer to `debug.log` in the log directory.
///
/// Returns the path of the written file.
pub fn export_debug_logs(app_name: &str, log_buffer: &LogBuffer) -> Result<PathBuf, std::io::Error> {
    let log_dir_path = get_log_directory(app_name);
    std::fs::create_dir_all(&log_dir_path)?;

    let debug_log_path = log_dir_path.join("debug.log");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&debug_log_path)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
    writeln!(file, "{timestamp} Debug log export ({} entries)", MAX_LOG_LINES)?;

    let lines: Vec<String> = log_buffer.lock().unwrap().iter().cloned().collect();
    for line in lines {
        writeln!(file, "{line}")?;
    }
    file.flush()?;

    Ok(debug_log_path)
}

pub fn setup_panic_hook(app_name: &str, log_buffer: LogBuffer) {
    let log_dir = get_log_directory(app_name);
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        warn!("Failed to create log directory {}: {e}", log_dir.display());
    }
    let log_file_path = log_dir.join("panic.log");

    panic::set_hook(Box::new(move |info| {
        let backtrace = backtrace::Backtrace::new();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        let location = if let Some(location) = info.location() {
            format!("{}:{}", location.file(), location.line())
        } else {
            "unknown location".to_string()
        };

        let header_msg = format!("[PANIC] at {location} - {info}");
        let backtrace_lines: Vec<String> = format!("{backtrace:?}")
            .lines()
            .map(|line| format!("[BACKTRACE] {}", line.trim()))
            .collect();

        // A panic hook cannot propagate errors; write what we can
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_file_path)
        {
            let _ = writeln!(file, "{timestamp} {header_msg}");
            let _ = writeln!(file, "{timestamp} [PANIC] Backtrace:");
            for line in &backtrace_lines {
                let _ = writeln!(file, "{timestamp} {line}");
            }
            let _ = writeln!(file);
            let _ = writeln!(file, "{timestamp} [PANIC] Last {MAX_LOG_LINES} log entries:");
            if let Ok(buffer) = log_buffer.lock() {
                for log in buffer.iter() {
                    let _ = writeln!(file, "{timestamp} {log}");
                }
            }
        }

        eprintln!("\n\n{header_msg}");
        eprintln!("[PANIC] Backtrace:");
        for line in &backtrace_lines {
            eprintln!("{line}");
        }
        eprintln!("\nA complete crash log has been written to: {}", log_file_path.display());
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn test_buffer_logger_is_bounded() {
        let logger = BufferLogger::new();
        for i in 0..(MAX_LOG_LINES + 10) {
            logger.log_to_buffer(&format!("line {i}"), LOG_TARGET, Some(1));
        }
        let buffer = logger.get_shared_buffer();
        let buffer = buffer.lock().unwrap();
        assert_eq!(buffer.len(), MAX_LOG_LINES);
        assert_eq!(buffer.front().unwrap(), "inference_explorer:1 line 10");
    }

    #[test]
    fn test_buffer_logger_ignores_other_targets() {
        let logger = BufferLogger::new();
        let metadata = Metadata::builder().target("hyper::client").level(Level::Info).build();
        assert!(!logger.enabled(&metadata));
        let metadata = Metadata::builder().target("inference_explorer::transport").level(Level::Info).build();
        assert!(logger.enabled(&metadata));
    }
}
