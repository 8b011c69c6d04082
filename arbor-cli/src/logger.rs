//! Terminal logger.
use colored::Colorize;
use log::{Level, Log, Metadata, Record, SetLoggerError};

struct Logger {
    level: Level,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("{}", record.args());
        let message = match record.level() {
            Level::Error => message.red().to_string(),
            Level::Warn => message.yellow().to_string(),
            Level::Info => message,
            Level::Debug | Level::Trace => message.dimmed().to_string(),
        };
        eprintln!("{} {}", record.target().bold(), message);
    }

    fn flush(&self) {}
}

/// Install the logger at the given level.
pub fn init(level: Level) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger { level }))?;
    log::set_max_level(level.to_level_filter());

    Ok(())
}
