//! Run logger (spec.md §8): a `log::Log` implementation that mirrors the
//! original's `log_message`/`log_error`/`log_exception` trio -- every line
//! is timestamped and indented to a caller-chosen depth, and optionally
//! mirrored to stdout when the run is verbose.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;
use log::{Level, Log, Metadata, Record};

/// Installs a [`RunLogger`] writing to `wgst_log_<timestamp>.txt` under
/// `logs_dir`, and returns the path it wrote to. Call once per run, before
/// any other component logs anything.
pub fn install(logs_dir: &std::path::Path, verbose: bool) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;
    let stamp = Local::now().format("%Y-%m-%d@%H-%M-%S");
    let path = logs_dir.join(format!("wgst_log_{stamp}.txt"));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let logger = RunLogger { file: Mutex::new(file), verbose };
    log::set_max_level(log::LevelFilter::Trace);
    // Only one `RunLogger` is ever installed per process; if a previous
    // run in the same process already installed one this is a no-op.
    let _ = log::set_boxed_logger(Box::new(logger));
    Ok(path)
}

/// Custom logger: one line per record, `%m-%d-%Y %H:%M:%S\t<message>`,
/// matching the original's `logging.basicConfig` format string exactly.
struct RunLogger {
    file: Mutex<std::fs::File>,
    verbose: bool,
}

impl Log for RunLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let timestamp = Local::now().format("%m-%d-%Y %H:%M:%S");
        let line = format!("{timestamp}\t{}\n", record.args());
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
        if self.verbose || record.level() <= Level::Warn {
            print!("{line}");
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// A spacer proportional to `depth`, matching the original's `makePretty`
/// tab-indentation helper.
fn indent(depth: usize) -> String {
    "\t".repeat(depth)
}

/// Logs an informational message at the given nesting depth.
pub fn log_message(depth: usize, message: &str) {
    log::info!("{}{message}", indent(depth));
}

/// Logs a recoverable-error message (QC failures, integrity warnings) at
/// the given nesting depth.
pub fn log_error(depth: usize, message: &str) {
    log::error!("{}{message}", indent(depth));
}

/// Logs an exception-style message: an error plus whatever context string
/// the caller has on hand (mirrors the original's traceback dump, without
/// a Rust backtrace attached since none is reliably available here).
pub fn log_exception(depth: usize, message: &str, detail: &str) {
    log::error!("{}{message}: {detail}", indent(depth));
}
