//! Process wide logger with a swappable backend.
//!
//! [`LOGGER_SWITCHER`] is installed as the `log` facade logger once. The main backend
//! can be replaced at any time, records with the `engine` target can be routed to a
//! dedicated backend (see `--engine-logging`).

use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::sync::{Once, RwLock};

/// Log target of debug engine diagnostics.
pub const ENGINE_TARGET: &str = "engine";

pub static LOGGER_SWITCHER: Lazy<LoggerSwitcher> = Lazy::new(|| LoggerSwitcher {
    logger: RwLock::new(Box::new(env_logger::Logger::from_default_env())),
    engine: RwLock::new(None),
    filter: RwLock::new(LevelFilter::Off),
});

static INSTALL: Once = Once::new();

fn is_engine_record(target: &str) -> bool {
    target == ENGINE_TARGET || target.starts_with("engine::")
}

pub struct LoggerSwitcher {
    logger: RwLock<Box<dyn Log>>,
    engine: RwLock<Option<Box<dyn Log>>>,
    filter: RwLock<LevelFilter>,
}

impl LoggerSwitcher {
    fn install(&'static self) {
        INSTALL.call_once(|| {
            if log::set_logger(self).is_err() {
                eprintln!("global logger already installed");
            }
        });
    }

    fn update_max_level(&self) {
        let mut level = *self.filter.read().unwrap();
        if self.engine.read().unwrap().is_some() {
            level = level.max(LevelFilter::Debug);
        }
        log::set_max_level(level);
    }

    /// Replace the main backend, `filter` is its maximum level.
    pub fn switch(&'static self, logger: impl Log + 'static, filter: LevelFilter) {
        *self.logger.write().unwrap() = Box::new(logger);
        *self.filter.write().unwrap() = filter;
        self.install();
        self.update_max_level();
    }

    /// Send engine records to `logger` instead of the main backend.
    pub fn route_engine(&'static self, logger: impl Log + 'static) {
        *self.engine.write().unwrap() = Some(Box::new(logger));
        self.install();
        self.update_max_level();
    }

    /// Return engine records to the main backend.
    pub fn reset_engine_route(&self) {
        self.engine.write().unwrap().take();
        self.update_max_level();
    }
}

impl Log for LoggerSwitcher {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if is_engine_record(metadata.target()) {
            if let Some(engine) = self.engine.read().unwrap().as_ref() {
                return engine.enabled(metadata);
            }
        }
        self.logger.read().unwrap().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if is_engine_record(record.target()) {
            if let Some(engine) = self.engine.read().unwrap().as_ref() {
                engine.log(record);
                return;
            }
        }
        self.logger.read().unwrap().log(record)
    }

    fn flush(&self) {
        self.logger.read().unwrap().flush();
        if let Some(engine) = self.engine.read().unwrap().as_ref() {
            engine.flush();
        }
    }
}
