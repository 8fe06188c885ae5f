//! Host-side ADIv5/ARMv7-M debug access over a bit-banged SWD line.
//!
//! Layering, bottom to top: [`pin::PinDriver`] (external GPIO contract) →
//! [`line::LineDriver`] (bit-serial transport) → [`dap::Dap`] (8-bit packet
//! framing, ACK/retry/fault handling, SELECT caching) → [`host::Host`]
//! (ADIv5 memory access, core register access, halt/step/reset, FPB-aware
//! stepping) → [`fpb::FpbManager`] (comparator allocation).
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod dap;
pub mod error;
pub mod fpb;
pub mod host;
pub mod line;
pub mod log;
pub mod packet;
pub mod pin;
pub mod port;
pub mod target;

pub use config::Config;
pub use dap::{Dap, PortAccess};
pub use error::{Error, Result};
pub use fpb::{FpbManager, FpbVersion};
pub use host::Host;
pub use line::LineDriver;
pub use log::{LogLevel, LogSink, NullSink};
pub use pin::PinDriver;
pub use port::Port;
pub use target::TargetRegister;
