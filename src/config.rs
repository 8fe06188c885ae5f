//! Runtime configuration, threaded through construction rather than read from
//! compile-time `#define`s the way the original source selects behavior.

use crate::log::LogLevel;

/// Toggles accepted by [`Dap::new`](crate::dap::Dap::new) / [`Host::new`](crate::host::Host::new).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Run a JTAG-to-SWD switch sequence as part of `start`. Most targets
    /// power up in JTAG mode and need this; a target wired SWD-only does not.
    pub auto_jtag_switch: bool,
    /// Refuse reads/writes to the optional safety-blockable port set
    /// (AP_DB0..3, AP_BASE) with [`crate::error::Error::DapUndefinedPort`]
    /// instead of letting them reach the target.
    pub block_undefined_ports: bool,
    /// Enable `debug_assert!`-style internal consistency checks. Distinct
    /// from ordinary error returns: these catch programmer errors (e.g. a
    /// port table with a malformed offset) rather than protocol failures.
    pub runtime_assertions: bool,
    /// Minimum severity passed to the injected `LogSink`.
    pub log_level: LogLevel,
    /// Number of WAIT retries attempted before a transfer gives up.
    /// Must be at least 1.
    pub retry_count: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            auto_jtag_switch: true,
            block_undefined_ports: false,
            runtime_assertions: false,
            log_level: LogLevel::Warn,
            retry_count: 10,
        }
    }
}
