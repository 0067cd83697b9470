use super::DapEmitter;
use crate::config::ConfigError;
use serde_json::json;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

fn format_record(record: &log::Record) -> String {
    let mut output = String::new();
    _ = write!(output, "[{}] ", record.level());
    if let Some(module) = record.module_path() {
        _ = write!(output, "{module} ");
    }
    _ = writeln!(output, "{}", record.args());
    output
}

/// Sends engine records to the DAP client as `console` output events.
pub struct DapLogger {
    emitter: Arc<DapEmitter>,
}

impl DapLogger {
    pub fn new(emitter: Arc<DapEmitter>) -> Self {
        Self { emitter }
    }
}

impl log::Log for DapLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.emitter.send_event_or_log(
            "output",
            Some(json!({"category": "console", "output": format_record(record)})),
        );
    }

    fn flush(&self) {}
}

/// Appends engine records to a file.
pub struct FileLogger {
    file: Mutex<File>,
}

impl FileLogger {
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ConfigError::EngineLogFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl log::Log for FileLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if let Ok(mut file) = self.file.lock() {
            _ = file.write_all(format_record(record).as_bytes());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            _ = file.flush();
        }
    }
}
