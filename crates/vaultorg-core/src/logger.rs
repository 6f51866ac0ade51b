// Structured logger with level filtering and a pluggable handler.
//
// Default output goes to stderr with ANSI colors; tests install a recording
// handler instead.

use std::fmt;
use std::sync::Arc;

/// ANSI color codes for terminal output.
pub mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";

    pub mod fg {
        pub const RED: &str = "\x1b[31m";
        pub const YELLOW: &str = "\x1b[33m";
        pub const BLUE: &str = "\x1b[34m";
        pub const MAGENTA: &str = "\x1b[35m";
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn color(&self) -> &'static str {
        match self {
            LogLevel::Debug => ansi::fg::MAGENTA,
            LogLevel::Info => ansi::fg::BLUE,
            LogLevel::Warn => ansi::fg::YELLOW,
            LogLevel::Error => ansi::fg::RED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Custom log sink invoked instead of stderr when installed.
pub type LogHandler = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct LoggerConfig {
    /// Minimum level to emit; `None` means Info and above.
    pub level: Option<LogLevel>,
    /// Disable output entirely.
    pub disabled: bool,
    pub handler: Option<LogHandler>,
}

/// Leveled logger threaded through the membership services.
#[derive(Clone, Default)]
pub struct OrgLogger {
    config: LoggerConfig,
}

impl OrgLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }

    /// A logger that emits nothing; used as the test default.
    pub fn disabled() -> Self {
        Self {
            config: LoggerConfig {
                disabled: true,
                ..Default::default()
            },
        }
    }

    fn should_publish(&self, level: LogLevel) -> bool {
        !self.config.disabled && level >= self.config.level.unwrap_or(LogLevel::Info)
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.should_publish(level) {
            return;
        }
        if let Some(handler) = &self.config.handler {
            handler(level, message);
            return;
        }
        eprintln!(
            "{}{}{} {}[vaultorg]{} {}",
            level.color(),
            level,
            ansi::RESET,
            ansi::DIM,
            ansi::RESET,
            message
        );
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

impl fmt::Debug for OrgLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgLogger")
            .field("disabled", &self.config.disabled)
            .field("level", &self.config.level)
            .finish()
    }
}
