// Copyright 2025 Oxide Computer Company

//! Building the root logger for a comparison run
//!
//! Everything in this crate logs through `slog`.  Callers that already have a
//! logger pass it in.  Otherwise the `[log]` block of the config file
//! describes one, and [`Comparator::from_config`](crate::Comparator) builds it
//! with [`ConfigLogging::to_logger`]:
//!
//! ```toml
//! [log]
//! mode = "file"
//! level = "info"
//! path = "logs/apicheck.log"
//! if_exists = "append"
//! ```

use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Serialize;
use slog::Drain;
use slog::Level;
use slog::Logger;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::LineWriter;
use std::io::Write;

/// Records queued for the async drain before callers start to block
const LOG_QUEUE_DEPTH: usize = 1024;

/// Where log records go and how much of them
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ConfigLogging {
    /// Human-readable records on stderr, colored when stderr is a terminal
    StderrTerminal { level: ConfigLoggingLevel },
    /// Human-readable records on stderr without any terminal escapes, for CI
    /// job logs
    StderrPlain { level: ConfigLoggingLevel },
    /// Bunyan-formatted records in a file
    File {
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
}

impl Default for ConfigLogging {
    fn default() -> Self {
        ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Warn }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl From<ConfigLoggingLevel> for Level {
    fn from(level: ConfigLoggingLevel) -> Level {
        match level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

/// What to do when the log file is already there
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    Fail,
    Truncate,
    Append,
}

impl ConfigLoggingIfExists {
    fn open(self, path: &Utf8Path) -> io::Result<File> {
        let mut options = OpenOptions::new();
        match self {
            ConfigLoggingIfExists::Fail => options.write(true).create_new(true),
            ConfigLoggingIfExists::Truncate => {
                options.write(true).create(true).truncate(true)
            }
            ConfigLoggingIfExists::Append => options.append(true).create(true),
        };
        options.open(path)
    }
}

impl ConfigLogging {
    pub fn level(&self) -> ConfigLoggingLevel {
        match self {
            ConfigLogging::StderrTerminal { level }
            | ConfigLogging::StderrPlain { level }
            | ConfigLogging::File { level, .. } => *level,
        }
    }

    /// Builds a root logger.  `log_name` names the logger in bunyan records.
    pub fn to_logger<S: AsRef<str>>(&self, log_name: S) -> io::Result<Logger> {
        let level = self.level();
        match self {
            ConfigLogging::StderrTerminal { .. } => {
                let decorator =
                    slog_term::TermDecorator::new().stderr().build();
                Ok(root_logger(
                    level,
                    slog_term::FullFormat::new(decorator).build(),
                ))
            }

            ConfigLogging::StderrPlain { .. } => {
                let decorator = slog_term::PlainDecorator::new(io::stderr());
                Ok(root_logger(
                    level,
                    slog_term::CompactFormat::new(decorator).build(),
                ))
            }

            ConfigLogging::File { path, if_exists, .. } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = LineWriter::new(if_exists.open(path)?);
                // slog_bunyan wants a `&'static str` name.
                let name: &'static str =
                    Box::leak(log_name.as_ref().to_owned().into_boxed_str());
                let log = root_logger(
                    level,
                    slog_bunyan::with_name(name, file).build(),
                );

                // Records no longer show up on stderr, so say where they went.
                if let Err(err) =
                    writeln!(io::stderr(), "note: logging to \"{path}\"")
                {
                    warn!(log, "failed to report log path on stderr";
                        "err" => %err);
                }
                Ok(log)
            }
        }
    }
}

fn root_logger<D>(level: ConfigLoggingLevel, drain: D) -> Logger
where
    D: Drain + Send + 'static,
    D::Err: std::fmt::Debug,
{
    let filtered = drain.fuse().filter_level(Level::from(level)).fuse();
    let drain = slog_async::Async::new(filtered)
        .chan_size(LOG_QUEUE_DEPTH)
        .build()
        .fuse();
    Logger::root(drain, o!())
}
