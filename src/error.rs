//! Flat error taxonomy shared by every layer of the crate.

use core::fmt;

/// Every fallible operation in this crate returns one of these variants.
///
/// The taxonomy is deliberately flat rather than per-layer: a caller walking
/// up from a memory read to a register read to a breakpoint add wants one
/// `match`, not three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Unspecified failure, used where the source protocol gives no further
    /// detail to propagate (e.g. an ACK retry budget exhausted, or a
    /// protocol error that survived a resync attempt).
    General,
    /// A DAP operation was attempted before `Dap::start`.
    DapNotStarted,
    /// A port operation was requested that the port does not support
    /// (e.g. a write to a read-only port).
    DapInvalidPortOp,
    /// The port is in the optional safety-blockable set (AP_DB0..3, AP_BASE)
    /// and [`crate::config::Config::block_undefined_ports`] is set.
    DapUndefinedPort,
    /// `Dap::start` itself failed (line reset or JTAG-to-SWD switch error).
    DapStartErr,
    /// A host operation was attempted before `Host::start`.
    HostNotStarted,
    /// `Host::start` failed to bring the DAP up or apply its initial config.
    HostStartErr,
    /// A register or step operation was requested while the core is running.
    TargetNotHalted,
    /// A memory access address violated an alignment or range requirement.
    TargetInvalidAddr,
    /// No free FPB comparator slot remains.
    TargetNoMoreBkpt,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::General => "general error",
            Error::DapNotStarted => "DAP not started",
            Error::DapInvalidPortOp => "invalid port operation",
            Error::DapUndefinedPort => "port blocked by safety configuration",
            Error::DapStartErr => "DAP start error",
            Error::HostNotStarted => "host not started",
            Error::HostStartErr => "host start error",
            Error::TargetNotHalted => "target not halted",
            Error::TargetInvalidAddr => "invalid target address",
            Error::TargetNoMoreBkpt => "no more breakpoint comparators",
        };
        f.write_str(s)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
