//! Decoupled logging pipeline for provisioning runs.
//!
//! `LogCollector` is the `log` backend. Every record goes to stderr
//! immediately and, when a log directory is configured, to a per-run file
//! written by a background thread.
//!
//! ```text
//! log::info!() ...
//!     |
//! [LogCollector] ---> stderr
//!     | (crossbeam channel)
//!     v
//! [writer thread] ---> <log_dir>/provision-<timestamp>.log
//! ```
//!
//! The writer is a plain OS thread, so records sent from tokio workers and
//! from blocking git threads all reach the file.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Environment variable holding the log level (`error`..`trace`)
pub const LOG_LEVEL_ENV: &str = "PROVISION_LOG";

/// Internal log line or special marker
enum LogMessage {
    /// Formatted line, newline excluded
    Line(String),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Parse a level name, falling back to `default` when absent or unknown.
pub fn parse_level(raw: Option<&str>, default: LevelFilter) -> LevelFilter {
    raw.and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Logger writing to stderr and, optionally, a per-run log file.
#[derive(Clone)]
pub struct LogCollector {
    level: LevelFilter,
    /// Channel to the file writer; `None` when file logging is off
    tx: Option<Sender<LogMessage>>,
    log_path: Option<PathBuf>,
}

impl LogCollector {
    /// Create a collector; with a `log_dir` the run log file is created
    /// immediately and a writer thread is started.
    pub fn new(level: LevelFilter, log_dir: Option<&Path>) -> Result<Self, String> {
        let Some(log_dir) = log_dir else {
            return Ok(LogCollector {
                level,
                tx: None,
                log_path: None,
            });
        };

        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create log directory {}: {}", log_dir.display(), e))?;

        let log_path = log_dir.join(format!(
            "provision-{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| format!("Failed to open log file {}: {}", log_path.display(), e))?;

        let (tx, rx) = unbounded::<LogMessage>();
        std::thread::Builder::new()
            .name("provision-log".to_string())
            .spawn(move || writer_loop(file, rx))
            .map_err(|e| format!("Failed to start log writer: {}", e))?;

        Ok(LogCollector {
            level,
            tx: Some(tx),
            log_path: Some(log_path),
        })
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Path of the run log file, if file logging is on.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Install a clone of this collector as the global `log` backend.
    pub fn install(&self) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }

    /// Block until every line sent so far is written and synced.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        tx.send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        done_rx
            .recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

fn writer_loop(file: File, rx: crossbeam_channel::Receiver<LogMessage>) {
    let mut out = BufWriter::new(file);
    while let Ok(msg) = rx.recv() {
        match msg {
            LogMessage::Line(line) => {
                if let Err(e) = writeln!(out, "{}", line) {
                    eprintln!("[Log] Failed to write log file: {}", e);
                }
            }
            LogMessage::Flush(done) => {
                let _ = out.flush();
                let _ = out.get_ref().sync_data();
                let _ = done.send(());
            }
        }
    }
    let _ = out.flush();
}

/// Wires all `log::info!()`, `log::warn!()`, ... calls into the collector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("[{}] {}", record.level(), record.args());
        if let Some(tx) = &self.tx {
            let line = format!(
                "[{}] [{}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            );
            let _ = tx.send(LogMessage::Line(line));
        }
    }

    fn flush(&self) {
        if let Err(e) = self.wait_for_empty() {
            eprintln!("[Log] [FLUSH] {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::fs;
    use tempfile::TempDir;

    fn record<'a>(level: Level, args: std::fmt::Arguments<'a>) -> Record<'a> {
        Record::builder().level(level).args(args).build()
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug"), LevelFilter::Info), LevelFilter::Debug);
        assert_eq!(parse_level(Some("WARN"), LevelFilter::Info), LevelFilter::Warn);
        assert_eq!(parse_level(Some("loud"), LevelFilter::Info), LevelFilter::Info);
        assert_eq!(parse_level(None, LevelFilter::Error), LevelFilter::Error);
    }

    #[test]
    fn test_collector_writes_run_log() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let collector =
            LogCollector::new(LevelFilter::Info, Some(temp.path())).expect("collector");

        for i in 0..100 {
            collector.log(&record(Level::Info, format_args!("[Provision] line {}", i)));
        }
        collector.log(&record(Level::Debug, format_args!("filtered out")));
        collector.wait_for_empty().expect("flush");

        let path = collector.log_path().expect("log path").to_path_buf();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        assert!(name.starts_with("provision-") && name.ends_with(".log"));

        let content = fs::read_to_string(&path).expect("read log");
        assert_eq!(content.lines().count(), 100);
        assert!(content.contains("[INFO] [Provision] line 99"));
        assert!(!content.contains("filtered out"));
    }

    #[test]
    fn test_install_registers_global_logger() {
        let collector = LogCollector::new(LevelFilter::Debug, None).expect("collector");
        collector.install().expect("no other logger in this test binary");
        assert_eq!(log::max_level(), LevelFilter::Debug);
        log::logger().flush();
    }

    #[test]
    fn test_collector_without_log_dir() {
        let collector = LogCollector::new(LevelFilter::Warn, None).expect("collector");
        assert!(collector.log_path().is_none());
        assert!(collector.wait_for_empty().is_ok());
        assert!(!collector.enabled(&Metadata::builder().level(Level::Info).build()));
    }
}
