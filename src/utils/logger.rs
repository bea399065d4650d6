//! Terminal logger for the demo binary
//!
//! The library only emits records through the `log` facade, installing a
//! logger is left to executables.

use std::time::Instant;

use colored::{ColoredString, Colorize};
use log::info;
use thiserror::Error;

pub use log::LevelFilter;

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `WARN`, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(#[from] log::SetLoggerError),
}

/// Install a coloured stdout logger with elapsed-time stamps.
///
/// Must only be called once per process.
pub fn logger_init(min_level: LevelFilter) -> Result<(), LoggerInitError> {
    if min_level < LevelFilter::Warn {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let epoch = Instant::now();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            let elapsed = epoch.elapsed().as_secs_f64();
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    elapsed,
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    elapsed,
                    level_to_str(record.level()),
                    message
                ))
            }
        })
        .level(min_level)
        .level_for("osqp", LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;

    info!("Logging initialised at level {:?}", min_level);
    Ok(())
}

fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info => "INF".normal(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_silent_levels() {
        let result = logger_init(LevelFilter::Off);
        assert!(matches!(result, Err(LoggerInitError::InvalidMinLogLevel(LevelFilter::Off))));
    }
}
