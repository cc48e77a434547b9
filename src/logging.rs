// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Configures the `log` facade with either a human-readable console backend
//! (RFC3339 timestamps via `chrono`, level coloring via `colored`) or a
//! structured `serde_json` backend, mirroring the split the teacher's own
//! logging crate draws between development and machine-consumed output.

use std::io::Write as IoWrite;
use std::sync::{Arc, Once};

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use serde_json::json;

/// A line-oriented destination for rendered log records.
pub trait Sink: Send + Sync {
    fn write_line(&self, line: &str);
}

struct StderrSink;

impl Sink for StderrSink {
    fn write_line(&self, line: &str) {
        eprintln!("{line}");
    }
}

struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: IoWrite + Send> Sink for WriterSink<W> {
    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{line}");
    }
}

/// Selects the backend and minimum level a [`Logger`] renders at.
#[derive(Clone, Copy, Debug)]
pub struct LoggerConfig {
    pub level: LevelFilter,
    pub use_json: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: LevelFilter::Info,
            use_json: false,
        }
    }
}

struct Backend {
    config: LoggerConfig,
    sink: Arc<dyn Sink>,
}

impl Backend {
    fn render(&self, record: &Record) -> String {
        if self.config.use_json {
            json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "level": record.level().to_string(),
                "target": record.target(),
                "message": record.args().to_string(),
            })
            .to_string()
        } else {
            format!(
                "{} {} {}: {}",
                chrono::Utc::now().to_rfc3339(),
                colored_level(record.level()),
                record.target(),
                record.args()
            )
        }
    }
}

impl Log for Backend {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.config.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.sink.write_line(&self.render(record));
    }

    fn flush(&self) {}
}

fn colored_level(level: Level) -> colored::ColoredString {
    match level {
        Level::Error => "ERROR".red(),
        Level::Warn => "WARN".yellow(),
        Level::Info => "INFO".green(),
        Level::Debug => "DEBUG".blue(),
        Level::Trace => "TRACE".dimmed(),
    }
}

/// A cheap, `Clone`-able handle to a configured logging backend.
///
/// Writes go through this handle's own backend directly; a `Logger` does not
/// depend on whether it (or any logger at all) has been installed as the
/// process-wide `log` facade logger.
#[derive(Clone)]
pub struct Logger {
    backend: Arc<Backend>,
}

impl Logger {
    pub fn log(&self, level: Level, target: &str, message: &str) {
        let record = Record::builder()
            .level(level)
            .target(target)
            .args(format_args!("{message}"))
            .build();
        self.backend.log(&record);
    }

    pub fn error(&self, target: &str, message: &str) {
        self.log(Level::Error, target, message)
    }

    pub fn warn(&self, target: &str, message: &str) {
        self.log(Level::Warn, target, message)
    }

    pub fn info(&self, target: &str, message: &str) {
        self.log(Level::Info, target, message)
    }

    pub fn debug(&self, target: &str, message: &str) {
        self.log(Level::Debug, target, message)
    }

    pub fn trace(&self, target: &str, message: &str) {
        self.log(Level::Trace, target, message)
    }
}

struct GlobalLogger(Arc<Backend>);

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.0.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.0.log(record)
    }

    fn flush(&self) {}
}

static INSTALL_ONCE: Once = Once::new();

/// Builds a `Logger` writing to stderr and installs it as the process-wide
/// `log` facade logger.
///
/// Installation happens at most once per process; a second call to `install`
/// (or `install_with_writer`) builds and returns its own `Logger` but leaves
/// the first one as the global target, matching `log`'s own
/// install-once contract.
pub fn install(config: LoggerConfig) -> Logger {
    install_with_sink(config, Arc::new(StderrSink))
}

/// As [`install`], writing to `writer` instead of stderr.
pub fn install_with_writer<W: IoWrite + Send + 'static>(config: LoggerConfig, writer: W) -> Logger {
    install_with_sink(config, Arc::new(WriterSink { writer: Mutex::new(writer) }))
}

fn install_with_sink(config: LoggerConfig, sink: Arc<dyn Sink>) -> Logger {
    let logger = Logger {
        backend: Arc::new(Backend { config, sink }),
    };
    INSTALL_ONCE.call_once(|| {
        let global = GlobalLogger(Arc::clone(&logger.backend));
        if log::set_boxed_logger(Box::new(global)).is_ok() {
            log::set_max_level(config.level);
        }
    });
    logger
}

/// Builds a `Logger` without touching the global `log` registry.
///
/// For tests that need isolated, repeatable logger state: the process-wide
/// registry can only ever be installed once, so tests exercising logging
/// behavior build a detached logger instead.
pub fn detached<W: IoWrite + Send + 'static>(config: LoggerConfig, writer: W) -> Logger {
    Logger {
        backend: Arc::new(Backend {
            config,
            sink: Arc::new(WriterSink { writer: Mutex::new(writer) }),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[derive(Default)]
    struct VecWriter(StdArc<Mutex<Vec<u8>>>);

    impl IoWrite for VecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn human_backend_renders_rfc3339_timestamp_and_level() {
        let buf = StdArc::new(Mutex::new(Vec::new()));
        let logger = detached(
            LoggerConfig { level: LevelFilter::Info, use_json: false },
            VecWriter(StdArc::clone(&buf)),
        );
        logger.info("fspipe::source", "started");

        let rendered = String::from_utf8(buf.lock().clone()).unwrap();
        assert!(rendered.contains("fspipe::source"));
        assert!(rendered.contains("started"));
        assert!(rendered.contains('T')); // RFC3339 date/time separator
    }

    #[test]
    fn json_backend_renders_a_single_object_per_record() {
        let buf = StdArc::new(Mutex::new(Vec::new()));
        let logger = detached(
            LoggerConfig { level: LevelFilter::Info, use_json: true },
            VecWriter(StdArc::clone(&buf)),
        );
        logger.warn("fspipe::filter", "dropped an item");

        let rendered = String::from_utf8(buf.lock().clone()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(rendered.trim()).unwrap();
        assert_eq!(parsed["level"], "WARN");
        assert_eq!(parsed["target"], "fspipe::filter");
        assert_eq!(parsed["message"], "dropped an item");
    }

    #[test]
    fn records_below_the_configured_level_are_dropped() {
        let buf = StdArc::new(Mutex::new(Vec::new()));
        let logger = detached(
            LoggerConfig { level: LevelFilter::Warn, use_json: false },
            VecWriter(StdArc::clone(&buf)),
        );
        logger.info("fspipe::source", "should not appear");
        assert!(buf.lock().is_empty());
    }
}
