//! Logger initialization.
//!
//! Configures `env_logger` with colored levels and emoji prefixes. The
//! logger is parameterized from `Logging` options rather than reached
//! through ad-hoc globals.

use std::io::Write;

use colored::Colorize;
use log::LevelFilter;

use crate::config::Logging;

/// Initializes the process logger from logging options.
///
/// `silence` wins over `debug`. Noisy dependency modules are clamped so
/// scan output stays readable. Uses `try_init` so repeated initialization
/// (tests) is not an error.
pub fn init_logger(opts: &Logging) -> Result<(), log::SetLoggerError> {
    let level = if opts.silence {
        LevelFilter::Off
    } else if opts.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("chromiumoxide", LevelFilter::Error);
    builder.filter_module("sqlx", LevelFilter::Warn);
    builder.filter_module("tungstenite", LevelFilter::Warn);

    builder.format(|buf, record| {
        let level = record.level();
        let colored_level = match level {
            log::Level::Error => level.to_string().red(),
            log::Level::Warn => level.to_string().yellow(),
            log::Level::Info => level.to_string().green(),
            log::Level::Debug => level.to_string().blue(),
            log::Level::Trace => level.to_string().purple(),
        };

        let emoji = match level {
            log::Level::Error => "❌",
            log::Level::Warn => "⚠️",
            log::Level::Info => "✔️",
            log::Level::Debug => "🔍",
            log::Level::Trace => "🔬",
        };

        writeln!(buf, "{} [{}] {}", emoji, colored_level, record.args())
    });

    builder.try_init()
}
