//! Logging as an injected capability, mirroring [`crate::pin::PinDriver`]
//! rather than a global `static` logger.

/// Severity cascade matching the original source's `SWD_LOG_LEVEL_*` chain:
/// selecting a level implies every level above it is also enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Verbose,
}

/// A sink for diagnostic events. Implementors decide how (or whether) to
/// render `msg`; this crate never formats more than a `&str` so it stays
/// usable from `no_std` without pulling in `core::fmt::Arguments` plumbing
/// at every call site.
pub trait LogSink {
    fn log(&mut self, level: LogLevel, msg: &str);
}

/// A sink that discards everything. Used when a caller has no log
/// destination; costs nothing at the call site once inlined.
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&mut self, _level: LogLevel, _msg: &str) {}
}

pub(crate) fn log_if<S: LogSink>(sink: &mut S, config_level: LogLevel, level: LogLevel, msg: &str) {
    if config_level != LogLevel::Off && level <= config_level {
        sink.log(level, msg);
    }
}

#[cfg(feature = "rtt-log")]
mod rtt {
    use super::{LogLevel, LogSink};

    /// Forwards to `rtt_target::rprintln!`, the same channel the teacher
    /// firmware uses for its own diagnostics.
    pub struct RttSink;

    impl LogSink for RttSink {
        fn log(&mut self, level: LogLevel, msg: &str) {
            let tag = match level {
                LogLevel::Off => return,
                LogLevel::Error => "ERROR",
                LogLevel::Warn => "WARN ",
                LogLevel::Info => "INFO ",
                LogLevel::Debug => "DEBUG",
                LogLevel::Verbose => "VBOSE",
            };
            rtt_target::rprintln!("[{}] {}", tag, msg);
        }
    }
}

#[cfg(feature = "rtt-log")]
pub use rtt::RttSink;
