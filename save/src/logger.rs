//! Optional logging for codec, migration and validation calls.
//!
//! By default messages route to the [`log`] facade so they land wherever the
//! host application already sends engine logs. Callers that want save logs
//! somewhere else (an in-game console, a crash-report buffer) install a sink
//! callback instead. Logging is never used to signal errors.

use std::fmt;
use std::sync::Arc;

/// Severity filter for save-engine log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Err,
    /// Suppress all output.
    Off,
}

type Sink = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Level filter plus an optional caller-supplied sink.
#[derive(Clone)]
pub struct SaveLogger {
    level: LogLevel,
    sink: Option<Sink>,
}

impl SaveLogger {
    /// Logger routing to the `log` facade at the given level.
    pub fn new(level: LogLevel) -> Self {
        Self { level, sink: None }
    }

    /// Logger delivering every enabled message to `sink` instead of `log`.
    pub fn with_sink(level: LogLevel, sink: impl Fn(LogLevel, &str) + Send + Sync + 'static) -> Self {
        Self {
            level,
            sink: Some(Arc::new(sink)),
        }
    }

    /// Logger that discards everything.
    pub fn off() -> Self {
        Self::new(LogLevel::Off)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level >= self.level
    }

    pub fn debug(&self, message: impl FnOnce() -> String) {
        self.emit(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl FnOnce() -> String) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl FnOnce() -> String) {
        self.emit(LogLevel::Warn, message);
    }

    pub fn err(&self, message: impl FnOnce() -> String) {
        self.emit(LogLevel::Err, message);
    }

    fn emit(&self, level: LogLevel, message: impl FnOnce() -> String) {
        if !self.enabled(level) {
            return;
        }
        let message = message();
        match &self.sink {
            Some(sink) => sink(level, &message),
            None => match level {
                LogLevel::Debug => log::debug!("{message}"),
                LogLevel::Info => log::info!("{message}"),
                LogLevel::Warn => log::warn!("{message}"),
                LogLevel::Err => log::error!("{message}"),
                LogLevel::Off => {}
            },
        }
    }
}

impl Default for SaveLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl fmt::Debug for SaveLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveLogger")
            .field("level", &self.level)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
