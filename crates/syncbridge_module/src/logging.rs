//! Runtime log level control.
//!
//! The host picks a level by name; [`LogControl`] applies it to a reloadable
//! `tracing` filter so the change takes effect without reinstalling the
//! subscriber.

use crate::error::{ModuleError, ModuleResult};
use parking_lot::RwLock;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, Registry};

/// Log levels accepted from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Everything.
    Verbose,
    /// Debug detail.
    Debug,
    /// Lifecycle messages.
    Info,
    /// Warnings and errors only.
    Warn,
    /// Errors only.
    Error,
    /// Assertion failures; logged at error level.
    Assert,
}

impl LogLevel {
    /// Level applied before the host sets one.
    pub const DEFAULT: LogLevel = LogLevel::Warn;

    /// The `tracing` filter for this level.
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Verbose => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Assert => LevelFilter::ERROR,
        }
    }

    /// Host-facing name.
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Assert => "ASSERT",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VERBOSE" => Ok(LogLevel::Verbose),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "ASSERT" => Ok(LogLevel::Assert),
            _ => Err(ModuleError::bad_parameter(
                "level",
                format!("unknown log level {s:?}"),
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Owns the process log level.
pub struct LogControl {
    handle: Option<reload::Handle<LevelFilter, Registry>>,
    level: RwLock<LogLevel>,
}

impl LogControl {
    /// Installs a global `fmt` subscriber at the default level.
    ///
    /// Fails if another global subscriber is already set.
    pub fn install() -> ModuleResult<Self> {
        let (filter, handle) = reload::Layer::new(LogLevel::DEFAULT.filter());
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ModuleError::Logging(e.to_string()))?;
        Ok(Self {
            handle: Some(handle),
            level: RwLock::new(LogLevel::DEFAULT),
        })
    }

    /// A control that only tracks the level, for hosts that own the subscriber.
    pub fn unmanaged() -> Self {
        Self {
            handle: None,
            level: RwLock::new(LogLevel::DEFAULT),
        }
    }

    /// Returns the current level.
    pub fn level(&self) -> LogLevel {
        *self.level.read()
    }

    /// Applies a new level.
    pub fn set_level(&self, level: LogLevel) -> ModuleResult<()> {
        info!(%level, "setting log level");
        if let Some(handle) = &self.handle {
            handle
                .reload(level.filter())
                .map_err(|e| ModuleError::Logging(e.to_string()))?;
        }
        *self.level.write() = level;
        Ok(())
    }
}

impl Default for LogControl {
    fn default() -> Self {
        Self::unmanaged()
    }
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("level", &self.level())
            .field("managed", &self.handle.is_some())
            .finish()
    }
}
