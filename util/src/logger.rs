//! Logging for the mast executables
//!
//! Records are prefixed by the number of seconds elapsed since the session epoch. Stdout gets
//! coloured level tags, the session log file receives the same records as plain text.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{self, info, Level};
use serde::Deserialize;
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Logging configuration, usually the `[log]` table of an executable's parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogParams {
    /// Minimum level of the records kept, must let through at least `INFO`.
    pub level: LevelFilter,

    /// Level overrides keyed by module path, for example `"mast_lib::mast_ctrl::motion"`.
    pub modules: BTreeMap<String, LevelFilter>,

    /// Colour the level tags written to stdout.
    pub colour: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LogParams {
    fn default() -> Self {
        let mut modules = BTreeMap::new();
        modules.insert(String::from("rustyline"), LevelFilter::Warn);

        Self {
            level: LevelFilter::Debug,
            modules,
            colour: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(params: &LogParams, session: &session::Session) -> Result<(), LoggerInitError> {
    if params.level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(params.level));
    }

    let log_file =
        fern::log_file(&session.log_file_path).map_err(LoggerInitError::LogFileInitError)?;

    let colour = params.colour;
    let stdout = fern::Dispatch::new()
        .format(move |out, message, record| {
            let tag = match colour {
                true => level_tag(record.level()),
                false => level_tag(record.level()).clear(),
            };
            write_record(out, message, record, tag)
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            write_record(out, message, record, level_tag(record.level()).clear())
        })
        .chain(log_file);

    let mut dispatch = fern::Dispatch::new().level(params.level);
    for (module, level) in params.modules.iter() {
        dispatch = dispatch.level_for(module.clone(), *level);
    }

    dispatch
        .chain(stdout)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", params.level);
    for (module, level) in params.modules.iter() {
        info!("    Log level of {}: {:?}", module, level);
    }
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn write_record(
    out: fern::FormatCallback<'_>,
    message: &fmt::Arguments<'_>,
    record: &log::Record<'_>,
    tag: ColoredString,
) {
    // Debug and trace records carry their target
    if record.level() > Level::Info {
        out.finish(format_args!(
            "[{:10.6} {}] {}: {}",
            session::get_elapsed_seconds(),
            tag,
            record.target(),
            message
        ))
    } else {
        out.finish(format_args!(
            "[{:10.6} {}] {}",
            session::get_elapsed_seconds(),
            tag,
            message
        ))
    }
}

/// Three letter tag of a log level
fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info => "INF".normal(),
        Level::Warn => "WRN".yellow(),
        Level::Error => "ERR".red().bold(),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
