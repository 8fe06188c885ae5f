//! The physical two-wire interface (SWCLK + SWDIO) as an injected capability.
//!
//! This is intentionally the only layer this crate does not implement: pin
//! timing, drive strength and pull configuration are board-specific. The
//! [`Dap`](crate::dap::Dap) is generic over `P: PinDriver` so a concrete
//! implementation monomorphizes to a direct, inlinable call chain rather
//! than going through a vtable.
pub trait PinDriver {
    /// Configure SWDIO as an input (pulldown, per the SWD electrical spec).
    fn swdio_cfg_input(&mut self);
    /// Configure SWDIO as an output.
    fn swdio_cfg_output(&mut self);
    /// Read the current level of SWDIO. Only bit 0 is significant.
    fn swdio_read(&mut self) -> u8;
    /// Drive SWDIO to the given level. Only bit 0 is significant.
    fn swdio_write(&mut self, bit: u8);
    /// Drive SWCLK high.
    fn swclk_set(&mut self);
    /// Drive SWCLK low.
    fn swclk_clear(&mut self);
    /// Hold for one half-period. Must land within the SWD timing window
    /// (10ns - 500us high/low per ARM's spec); the concrete implementation
    /// picks the exact duration for its target clock rate.
    fn hold(&mut self);
}
