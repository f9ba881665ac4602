use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use env_logger::{Builder, Env, Target};
use eyre::{Result, eyre};
use log::{Level, LevelFilter, Log, Record};

/// Environment variable holding the log filter (env_logger syntax)
pub const LOG_FILTER_ENV: &str = "RUN_LOG";

const DEFAULT_FILTER: &str = "info";
const LOG_TARGET: &str = "run";

/// Where log records are written
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    File(PathBuf),
}

impl LogSink {
    /// `-` selects stderr, anything else is a file path
    pub fn parse(value: &str) -> Self {
        if value == "-" {
            LogSink::Stderr
        } else {
            LogSink::File(PathBuf::from(value))
        }
    }

    /// `<local data dir>/run/logs/run.log`
    pub fn default_file() -> Result<Self> {
        let log_dir = dirs::data_local_dir()
            .ok_or_else(|| eyre!("Could not determine local data directory"))?
            .join("run")
            .join("logs");
        Ok(LogSink::File(log_dir.join("run.log")))
    }
}

/// Logging handle handed to the dispatcher and the shell.
///
/// Wraps an `env_logger::Logger` that is built but never installed as the
/// process-wide `log` backend, so two handles with different sinks can coexist.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<env_logger::Logger>,
}

impl Logger {
    /// Build a logger for `sink`, filtered by `RUN_LOG` (default `info`)
    pub fn new(sink: &LogSink) -> Result<Self> {
        let mut builder = Builder::from_env(Env::new().filter_or(LOG_FILTER_ENV, DEFAULT_FILTER));
        Self::attach(&mut builder, sink)?;
        Ok(Self::from_builder(builder))
    }

    /// Build a logger with an explicit filter, ignoring the environment
    pub fn with_filter(sink: &LogSink, filter: &str) -> Result<Self> {
        let mut builder = Builder::new();
        builder.parse_filters(filter);
        Self::attach(&mut builder, sink)?;
        Ok(Self::from_builder(builder))
    }

    /// A logger that drops every record
    pub fn disabled() -> Self {
        let mut builder = Builder::new();
        builder.filter_level(LevelFilter::Off);
        Self::from_builder(builder)
    }

    fn attach(builder: &mut Builder, sink: &LogSink) -> Result<()> {
        match sink {
            LogSink::Stderr => {
                builder.target(Target::Stderr);
            }
            LogSink::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let log_file = OpenOptions::new().create(true).append(true).open(path)?;
                builder.target(Target::Pipe(Box::new(log_file)));
            }
        }
        Ok(())
    }

    fn from_builder(mut builder: Builder) -> Self {
        Self {
            inner: Arc::new(builder.build()),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level.to_level_filter() <= self.inner.filter()
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder().args(args).level(level).target(LOG_TARGET).build();
        if self.inner.matches(&record) {
            self.inner.log(&record);
        }
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn flush(&self) {
        self.inner.flush();
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("filter", &self.inner.filter()).finish()
    }
}
