//! ADIv5 memory access and ARMv7-M debug-register choreography, built on
//! top of the DAP engine's port-level [`PortAccess`].

use crate::config::Config;
use crate::dap::{PortAccess, CSW_ADDRINC_NONE, CSW_ADDRINC_SINGLE, CSW_SIZE_BYTE, CSW_SIZE_WORD};
use crate::error::Error;
use crate::fpb::{decode_fp_ctrl, FpbManager, FP_CTRL, FP_ENABLE, FP_KEY};
use crate::log::{log_if, LogLevel, LogSink, NullSink};
use crate::port::Port;
use crate::target::TargetRegister;

const AIRCR: u32 = 0xE000_ED0C;
const DHCSR: u32 = 0xE000_EDF0;
const DCRSR: u32 = 0xE000_EDF4;
const DCRDR: u32 = 0xE000_EDF8;
const DEMCR: u32 = 0xE000_EDFC;

const DBG_KEY: u32 = 0xA05F_0000;
const C_DEBUGEN: u32 = 0x1;
const C_HALT: u32 = 0x2;
const C_STEP: u32 = 0x4;
const S_HALTED: u32 = 0x2_0000;
const S_REGRDY: u32 = 0x1_0000;

const VECTKEY: u32 = 0x05FA_0000;
const SYSRESETREQ: u32 = 0x4;
const VC_CORERESET: u32 = 0x1;

/// Owns a [`PortAccess`] (normally a [`crate::dap::Dap`]) and the FPB's
/// bookkeeping, and translates typed requests into AP transactions and
/// ARMv7-M register writes.
pub struct Host<D: PortAccess, L: LogSink = NullSink> {
    dap: D,
    log: L,
    config: Config,
    is_stopped: bool,
    /// Populated by [`Host::start`] from FP_CTRL; absent while stopped.
    fpb: Option<FpbManager>,
}

impl<D: PortAccess> Host<D, NullSink> {
    pub fn new(dap: D, config: Config) -> Self {
        Host::with_log(dap, NullSink, config)
    }
}

impl<D: PortAccess, L: LogSink> Host<D, L> {
    pub fn with_log(dap: D, log: L, config: Config) -> Self {
        Host { dap, log, config, is_stopped: true, fpb: None }
    }

    fn log(&mut self, level: LogLevel, msg: &str) {
        log_if(&mut self.log, self.config.log_level, level, msg);
    }

    fn check_started(&self) -> Result<(), Error> {
        if self.is_stopped {
            Err(Error::HostNotStarted)
        } else {
            Ok(())
        }
    }

    fn fpb_mut(&mut self) -> Result<&mut FpbManager, Error> {
        self.fpb.as_mut().ok_or(Error::HostNotStarted)
    }

    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    /// Start the underlying DAP, put the AP into word-sized no-increment
    /// transfers as a known baseline, then detect and enable the FPB.
    pub fn start(&mut self) -> Result<(), Error> {
        self.log(LogLevel::Info, "starting host");
        if self.dap.start().is_err() {
            return Err(Error::HostStartErr);
        }
        self.is_stopped = false;

        let result = self
            .dap
            .set_csw(CSW_SIZE_WORD, CSW_ADDRINC_NONE)
            .map_err(|_| Error::HostStartErr)
            .and_then(|()| self.detect_fpb());

        if result.is_err() {
            self.is_stopped = true;
            self.dap.stop();
            return result;
        }
        Ok(())
    }

    fn detect_fpb(&mut self) -> Result<(), Error> {
        let raw = self.memory_read_word(FP_CTRL)?;
        let ctrl = decode_fp_ctrl(raw).map_err(|_| Error::HostStartErr)?;
        self.memory_write_word(FP_CTRL, FP_KEY | FP_ENABLE)?;
        self.fpb = Some(FpbManager::from_fp_ctrl(ctrl));
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), Error> {
        self.is_stopped = true;
        self.fpb = None;
        self.dap.stop();
        Ok(())
    }

    // --- control signals ---------------------------------------------

    pub fn halt(&mut self) -> Result<(), Error> {
        self.check_started()?;
        self.memory_write_word(DHCSR, DBG_KEY | C_DEBUGEN | C_HALT)
    }

    pub fn cont(&mut self) -> Result<(), Error> {
        self.check_started()?;
        self.memory_write_word(DHCSR, DBG_KEY | C_DEBUGEN)
    }

    pub fn reset(&mut self) -> Result<(), Error> {
        self.check_started()?;
        self.cont()?;
        self.memory_write_word(AIRCR, VECTKEY | SYSRESETREQ)
    }

    pub fn halt_reset(&mut self) -> Result<(), Error> {
        self.check_started()?;
        self.memory_write_word(DHCSR, DBG_KEY | C_DEBUGEN)?;
        let demcr = self.memory_read_word(DEMCR)?;
        self.memory_write_word(DEMCR, demcr | VC_CORERESET)?;
        self.memory_write_word(AIRCR, VECTKEY | SYSRESETREQ)?;
        self.memory_write_word(DEMCR, demcr & !VC_CORERESET)
    }

    pub fn is_halted(&mut self) -> Result<bool, Error> {
        self.check_started()?;
        let dhcsr = self.memory_read_word(DHCSR)?;
        Ok(dhcsr & S_HALTED != 0)
    }

    /// Single-step. If the core is halted exactly at an address currently
    /// covered by an FPB comparator, the FPB is disabled for the duration
    /// of the step so the breakpoint isn't re-hit immediately, then
    /// re-enabled.
    pub fn step(&mut self) -> Result<(), Error> {
        self.check_started()?;
        let pc = self.register_read(TargetRegister::DebugReturnAddress)?;
        let at_breakpoint = self.fpb_mut()?.list().any(|addr| addr & !0x3 == pc & !0x3);

        if at_breakpoint {
            self.memory_write_word(FP_CTRL, FP_KEY)?;
        }
        let result = self.memory_write_word(DHCSR, DBG_KEY | C_DEBUGEN | C_STEP);
        if at_breakpoint {
            self.memory_write_word(FP_CTRL, FP_KEY | FP_ENABLE)?;
        }
        result
    }

    // --- memory access --------------------------------------------------

    pub fn memory_write_word(&mut self, addr: u32, data: u32) -> Result<(), Error> {
        self.check_started()?;
        if addr % 4 != 0 {
            return Err(Error::TargetInvalidAddr);
        }
        self.dap.port_write(Port::ApTar, addr)?;
        self.dap.port_write(Port::ApDrw, data)
    }

    pub fn memory_read_word(&mut self, addr: u32) -> Result<u32, Error> {
        self.check_started()?;
        if addr % 4 != 0 {
            return Err(Error::TargetInvalidAddr);
        }
        self.dap.port_write(Port::ApTar, addr)?;
        self.dap.port_read(Port::ApDrw)
    }

    /// Write `data` starting at `start_addr` using CSW auto-increment,
    /// restoring the word-sized, no-increment baseline on every exit path.
    /// Returns the number of words written alongside the result, since a
    /// partial failure still needs to report how far it got.
    pub fn memory_write_word_block(&mut self, start_addr: u32, data: &[u32]) -> (u32, Result<(), Error>) {
        if self.check_started().is_err() {
            return (0, Err(Error::HostNotStarted));
        }
        if start_addr % 4 != 0 {
            return (0, Err(Error::TargetInvalidAddr));
        }
        if let Err(e) = self.dap.set_csw(CSW_SIZE_WORD, CSW_ADDRINC_SINGLE) {
            return (0, Err(e));
        }

        let mut written = 0u32;
        let outcome = self.dap.port_write(Port::ApTar, start_addr).and_then(|()| {
            for &word in data {
                self.dap.port_write(Port::ApDrw, word)?;
                written += 1;
            }
            Ok(())
        });

        let _ = self.dap.set_csw(CSW_SIZE_WORD, CSW_ADDRINC_NONE);
        (written, outcome)
    }

    pub fn memory_read_word_block(&mut self, start_addr: u32, buf: &mut [u32]) -> (u32, Result<(), Error>) {
        if self.check_started().is_err() {
            return (0, Err(Error::HostNotStarted));
        }
        if start_addr % 4 != 0 {
            return (0, Err(Error::TargetInvalidAddr));
        }
        if let Err(e) = self.dap.set_csw(CSW_SIZE_WORD, CSW_ADDRINC_SINGLE) {
            return (0, Err(e));
        }

        let mut read = 0u32;
        let outcome = self.dap.port_write(Port::ApTar, start_addr).and_then(|()| {
            for slot in buf.iter_mut() {
                *slot = self.dap.port_read(Port::ApDrw)?;
                read += 1;
            }
            Ok(())
        });

        let _ = self.dap.set_csw(CSW_SIZE_WORD, CSW_ADDRINC_NONE);
        (read, outcome)
    }

    /// Byte-granularity write via CSW.Size=byte, placing each byte in the
    /// lane `TAR`'s low bits and the target's endianness dictate (strategy
    /// (a) of the byte-block contract). Always reports the number of bytes
    /// actually transferred, on both success and partial failure.
    pub fn memory_write_byte_block(&mut self, start_addr: u32, data: &[u8]) -> (u32, Result<(), Error>) {
        if self.check_started().is_err() {
            return (0, Err(Error::HostNotStarted));
        }
        if let Err(e) = self.dap.set_csw(CSW_SIZE_BYTE, CSW_ADDRINC_SINGLE) {
            return (0, Err(e));
        }
        let little_endian = self.dap.little_endian();

        let mut written = 0u32;
        let outcome = self.dap.port_write(Port::ApTar, start_addr).and_then(|()| {
            for (i, &byte) in data.iter().enumerate() {
                let addr = start_addr.wrapping_add(i as u32);
                let lane = byte_lane(addr, little_endian);
                self.dap.port_write(Port::ApDrw, (byte as u32) << (lane * 8))?;
                written += 1;
            }
            Ok(())
        });

        let _ = self.dap.set_csw(CSW_SIZE_WORD, CSW_ADDRINC_NONE);
        (written, outcome)
    }

    pub fn memory_read_byte_block(&mut self, start_addr: u32, buf: &mut [u8]) -> (u32, Result<(), Error>) {
        if self.check_started().is_err() {
            return (0, Err(Error::HostNotStarted));
        }
        if let Err(e) = self.dap.set_csw(CSW_SIZE_BYTE, CSW_ADDRINC_SINGLE) {
            return (0, Err(e));
        }
        let little_endian = self.dap.little_endian();

        let mut read = 0u32;
        let outcome = self.dap.port_write(Port::ApTar, start_addr).and_then(|()| {
            for (i, slot) in buf.iter_mut().enumerate() {
                let addr = start_addr.wrapping_add(i as u32);
                let lane = byte_lane(addr, little_endian);
                let word = self.dap.port_read(Port::ApDrw)?;
                *slot = ((word >> (lane * 8)) & 0xFF) as u8;
                read += 1;
            }
            Ok(())
        });

        let _ = self.dap.set_csw(CSW_SIZE_WORD, CSW_ADDRINC_NONE);
        (read, outcome)
    }

    // --- core registers ---------------------------------------------

    pub fn register_read(&mut self, reg: TargetRegister) -> Result<u32, Error> {
        self.check_started()?;
        if !self.is_halted()? {
            return Err(Error::TargetNotHalted);
        }
        self.memory_write_word(DCRSR, reg.as_regsel(false))?;
        let mut retries = self.config.retry_count;
        loop {
            let dhcsr = self.memory_read_word(DHCSR)?;
            if dhcsr & S_REGRDY != 0 {
                return self.memory_read_word(DCRDR);
            }
            if retries == 0 {
                return Err(Error::General);
            }
            retries -= 1;
        }
    }

    pub fn register_write(&mut self, reg: TargetRegister, data: u32) -> Result<(), Error> {
        self.check_started()?;
        if !self.is_halted()? {
            return Err(Error::TargetNotHalted);
        }
        self.memory_write_word(DCRDR, data)?;
        let mut retries = self.config.retry_count;
        loop {
            let dhcsr = self.memory_read_word(DHCSR)?;
            if dhcsr & S_REGRDY != 0 {
                return self.memory_write_word(DCRSR, reg.as_regsel(true));
            }
            if retries == 0 {
                return Err(Error::General);
            }
            retries -= 1;
        }
    }

    // --- breakpoints ---------------------------------------------------

    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), Error> {
        self.check_started()?;
        if let Some((reg, val)) = self.fpb_mut()?.add(addr)? {
            self.memory_write_word(reg, val)?;
        }
        Ok(())
    }

    pub fn remove_breakpoint(&mut self, addr: u32) -> Result<(), Error> {
        self.check_started()?;
        let reg = self.fpb_mut()?.remove(addr).ok_or(Error::TargetInvalidAddr)?;
        self.memory_write_word(reg, 0)
    }

    pub fn clear_breakpoints(&mut self) -> Result<(), Error> {
        self.check_started()?;
        let mut regs = [0u32; crate::fpb::MAX_COMPARATORS];
        let mut n = 0usize;
        for reg in self.fpb_mut()?.clear_all() {
            regs[n] = reg;
            n += 1;
        }
        for &reg in &regs[..n] {
            self.memory_write_word(reg, 0)?;
        }
        Ok(())
    }

    pub fn breakpoint_count(&self) -> u8 {
        self.fpb.as_ref().map_or(0, FpbManager::capacity)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.fpb.iter().flat_map(|fpb| fpb.list())
    }
}

/// Byte lane within a 32-bit AP transfer, derived from the address's low
/// two bits and target endianness: LSB-at-LSB for little-endian, LSB-at-MSB
/// for big-endian.
fn byte_lane(addr: u32, little_endian: bool) -> u32 {
    let offset = addr & 0x3;
    if little_endian {
        offset
    } else {
        3 - offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// A port-level double standing in for a real [`crate::dap::Dap`]: a
    /// flat memory map keyed by the AP_TAR address currently latched,
    /// following CSW auto-increment the way the AP would.
    struct MockBus {
        tar: u32,
        csw_size: u32,
        csw_autoinc: u32,
        little_endian: bool,
        memory: HashMap<u32, u32>,
    }

    impl MockBus {
        fn new() -> Self {
            let mut memory = HashMap::new();
            memory.insert(DHCSR, 0);
            memory.insert(DEMCR, 0);
            // v2, 6 code comparators, 0 literal comparators.
            memory.insert(FP_CTRL, (1u32 << 28) | (6 << 4));
            MockBus {
                tar: 0,
                csw_size: CSW_SIZE_WORD,
                csw_autoinc: CSW_ADDRINC_NONE,
                little_endian: true,
                memory,
            }
        }

        fn addrinc(&self) -> u32 {
            if self.csw_autoinc != CSW_ADDRINC_NONE {
                if self.csw_size == CSW_SIZE_BYTE { 1 } else { 4 }
            } else {
                0
            }
        }
    }

    impl PortAccess for MockBus {
        fn start(&mut self) -> Result<(), Error> {
            Ok(())
        }
        fn stop(&mut self) {}

        fn port_read(&mut self, port: Port) -> Result<u32, Error> {
            match port {
                Port::ApDrw => {
                    let word_addr = if self.csw_size == CSW_SIZE_BYTE { self.tar & !0x3 } else { self.tar };
                    let v = *self.memory.get(&word_addr).unwrap_or(&0);
                    self.tar = self.tar.wrapping_add(self.addrinc());
                    Ok(v)
                }
                _ => Ok(0),
            }
        }

        fn port_write(&mut self, port: Port, data: u32) -> Result<(), Error> {
            match port {
                Port::ApTar => self.tar = data,
                Port::ApDrw => {
                    if self.csw_size == CSW_SIZE_BYTE {
                        // `data` arrives already positioned in its byte lane
                        // (see `host::byte_lane`); only that lane is live.
                        let word_addr = self.tar & !0x3;
                        let lane = self.tar & 0x3;
                        let existing = *self.memory.get(&word_addr).unwrap_or(&0);
                        let mask = 0xFFu32 << (lane * 8);
                        let merged = (existing & !mask) | (data & mask);
                        self.memory.insert(word_addr, merged);
                    } else {
                        self.memory.insert(self.tar, data);
                    }
                    self.tar = self.tar.wrapping_add(self.addrinc());
                }
                _ => {}
            }
            Ok(())
        }

        fn set_csw(&mut self, size: u32, autoinc: u32) -> Result<(), Error> {
            self.csw_size = size;
            self.csw_autoinc = autoinc;
            Ok(())
        }

        fn little_endian(&self) -> bool {
            self.little_endian
        }
    }

    fn started_host() -> Host<MockBus> {
        let mut host = Host::new(MockBus::new(), Config::default());
        host.start().unwrap();
        host
    }

    #[test]
    fn start_detects_fpb_from_fp_ctrl() {
        let host = started_host();
        assert_eq!(host.breakpoint_count(), 6);
    }

    #[test]
    fn halt_writes_dbg_key_debugen_halt_to_dhcsr() {
        let mut host = started_host();
        host.halt().unwrap();
        assert_eq!(*host.dap.memory.get(&DHCSR).unwrap(), 0xA05F_0003);
    }

    #[test]
    fn halt_reset_sequence_matches_the_documented_choreography() {
        let mut host = started_host();
        host.halt_reset().unwrap();
        assert_eq!(*host.dap.memory.get(&DHCSR).unwrap(), 0xA05F_0001);
        assert_eq!(*host.dap.memory.get(&AIRCR).unwrap(), 0x05FA_0004);
        assert_eq!(*host.dap.memory.get(&DEMCR).unwrap(), 0);
    }

    #[test]
    fn unaligned_word_write_is_rejected_before_touching_the_bus() {
        let mut host = started_host();
        let result = host.memory_write_word(0x2000_0001, 0x1234);
        assert_eq!(result, Err(Error::TargetInvalidAddr));
        assert!(host.dap.memory.get(&0x2000_0001).is_none());
        assert!(host.dap.memory.get(&0x2000_0000).is_none());
    }

    #[test]
    fn operations_before_start_are_rejected() {
        let mut host = Host::new(MockBus::new(), Config::default());
        assert_eq!(host.halt(), Err(Error::HostNotStarted));
    }

    #[test]
    fn register_read_polls_until_regrdy_then_reads_dcrdr() {
        let mut host = started_host();
        host.dap.memory.insert(DHCSR, S_HALTED | S_REGRDY);
        host.dap.memory.insert(DCRDR, 0xCAFEBABE);
        let value = host.register_read(TargetRegister::R0).unwrap();
        assert_eq!(value, 0xCAFEBABE);
        assert_eq!(*host.dap.memory.get(&DCRSR).unwrap(), 0);
    }

    #[test]
    fn register_access_requires_halted_core() {
        let mut host = started_host();
        host.dap.memory.insert(DHCSR, 0);
        assert_eq!(host.register_read(TargetRegister::R0), Err(Error::TargetNotHalted));
    }

    #[test]
    fn word_block_write_reports_count_and_restores_csw() {
        let mut host = started_host();
        let (count, result) = host.memory_write_word_block(0x2000_0000, &[1, 2, 3]);
        assert_eq!(count, 3);
        assert!(result.is_ok());
        assert_eq!(host.dap.csw_autoinc, CSW_ADDRINC_NONE);
        assert_eq!(*host.dap.memory.get(&0x2000_0000).unwrap(), 1);
        assert_eq!(*host.dap.memory.get(&0x2000_0004).unwrap(), 2);
        assert_eq!(*host.dap.memory.get(&0x2000_0008).unwrap(), 3);
    }

    #[test]
    fn byte_block_write_places_bytes_in_little_endian_lanes() {
        let mut host = started_host();
        let (count, result) = host.memory_write_byte_block(0x2000_0000, &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(count, 4);
        assert!(result.is_ok());
        assert_eq!(*host.dap.memory.get(&0x2000_0000).unwrap(), 0x4433_2211);
    }

    #[test]
    fn byte_block_read_extracts_bytes_from_little_endian_lanes() {
        let mut host = started_host();
        host.dap.memory.insert(0x2000_0000, 0xAABB_CCDD);
        let mut buf = [0u8; 4];
        let (count, result) = host.memory_read_byte_block(0x2000_0000, &mut buf);
        assert_eq!(count, 4);
        assert!(result.is_ok());
        assert_eq!(buf, [0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn add_breakpoint_writes_fp_comp0() {
        let mut host = started_host();
        host.add_breakpoint(0x0800_0100).unwrap();
        assert_eq!(*host.dap.memory.get(&0xE000_2008).unwrap(), 0x0800_0100 | FP_ENABLE);
        assert_eq!(host.breakpoints().count(), 1);
    }

    #[test]
    fn step_disables_and_reenables_fpb_when_halted_on_a_breakpoint() {
        let mut host = started_host();
        host.dap.memory.insert(DHCSR, S_HALTED | S_REGRDY);
        host.dap.memory.insert(DCRDR, 0x0800_0100);
        host.add_breakpoint(0x0800_0100).unwrap();
        host.step().unwrap();
        // re-enabled after the step
        assert_eq!(*host.dap.memory.get(&FP_CTRL).unwrap(), FP_KEY | FP_ENABLE);
    }

    #[test]
    fn add_breakpoint_rejects_an_odd_address() {
        let mut host = started_host();
        let result = host.add_breakpoint(0x0800_0101);
        assert_eq!(result, Err(Error::TargetInvalidAddr));
        assert_eq!(host.breakpoints().count(), 0);
    }

    #[test]
    fn remove_breakpoint_reports_invalid_addr_when_not_set() {
        let mut host = started_host();
        assert_eq!(host.remove_breakpoint(0x1000), Err(Error::TargetInvalidAddr));
    }

    #[test]
    fn clear_breakpoints_zeroes_every_comparator_register() {
        let mut host = started_host();
        host.add_breakpoint(0x1000).unwrap();
        host.add_breakpoint(0x2000).unwrap();
        host.clear_breakpoints().unwrap();
        assert_eq!(host.breakpoints().count(), 0);
        assert_eq!(*host.dap.memory.get(&0xE000_2008).unwrap(), 0);
        assert_eq!(*host.dap.memory.get(&0xE000_200C).unwrap(), 0);
    }
}
