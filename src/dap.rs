//! DAP engine: packet framing, ACK handling, WAIT/FAULT/protocol-error
//! recovery, and SELECT/CSW-register caching over the closed [`Port`] set.

use crate::config::Config;
use crate::line::LineDriver;
use crate::packet;
use crate::pin::PinDriver;
use crate::port::Port;
use crate::Error;

/// Target ACK, decoded from the 3-bit one-hot response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    Wait,
    Fault,
    /// Any bit pattern other than OK/WAIT/FAULT.
    Protocol,
}

fn decode_ack(bits: u32) -> Result<(), Ack> {
    match bits & 0x7 {
        0b001 => Ok(()),
        0b010 => Err(Ack::Wait),
        0b100 => Err(Ack::Fault),
        _ => Err(Ack::Protocol),
    }
}

pub const CSW_SIZE_MASK: u32 = 0x7;
pub const CSW_SIZE_BYTE: u32 = 0x0;
pub const CSW_SIZE_WORD: u32 = 0x2;
pub const CSW_ADDRINC_MASK: u32 = 0x30;
pub const CSW_ADDRINC_NONE: u32 = 0x00;
pub const CSW_ADDRINC_SINGLE: u32 = 0x10;

const CTRLSTAT_POWER_REQ: u32 = 0x5000_0000;
const CTRLSTAT_POWER_ACK: u32 = 0xA000_0000;
const ABORT_CLEAR_ALL: u32 = 0x1F;
const WDATAERR: u32 = 0x80;
const STICKYERR: u32 = 0x20;

/// Owns the line driver and the DP/AP transfer state machine.
pub struct Dap<P: PinDriver> {
    line: LineDriver<P>,
    config: Config,
    is_stopped: bool,
    ap_error: bool,
    apbanksel: Option<u8>,
    ctrlsel: Option<u8>,
    csw_size: Option<u32>,
    csw_autoinc: Option<u32>,
    little_endian: bool,
}

impl<P: PinDriver> Dap<P> {
    pub fn new(pin: P, config: Config) -> Self {
        Dap {
            line: LineDriver::new(pin),
            config,
            is_stopped: true,
            ap_error: false,
            apbanksel: None,
            ctrlsel: None,
            csw_size: None,
            csw_autoinc: None,
            little_endian: true,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    pub fn ap_error(&self) -> bool {
        self.ap_error
    }

    pub fn little_endian(&self) -> bool {
        self.little_endian
    }

    pub fn line_mut(&mut self) -> &mut LineDriver<P> {
        &mut self.line
    }

    /// Bring the line up, resync on IDCODE, power on the AP and clear sticky
    /// errors. Mirrors the same sequence [`Dap::handle_protocol_error`] reruns
    /// after a loss of sync.
    pub fn start(&mut self) -> Result<(), Error> {
        self.is_stopped = false;
        match self.resync() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.is_stopped = true;
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        self.is_stopped = true;
    }

    pub fn port_read(&mut self, port: Port) -> Result<u32, Error> {
        if self.is_stopped {
            return Err(Error::DapNotStarted);
        }
        let info = port.info();
        if !info.readable {
            return Err(Error::DapInvalidPortOp);
        }
        if !info.defined && self.config.block_undefined_ports {
            return Err(Error::DapUndefinedPort);
        }
        self.ensure_select(info.is_ap, info.apbanksel, info.ctrlsel)?;

        let is_ap = info.is_ap;
        let addr_bits = info.addr_bits;
        let value = self.transfer(|dap| dap.raw_read(is_ap, addr_bits))?;

        if is_ap {
            // AP reads are posted: this value belongs to the PREVIOUS
            // transaction. The real result must be retrieved from RDBUFF.
            let rdbuff_bits = Port::DpRdbuff.info().addr_bits;
            return self.transfer(|dap| dap.raw_read(false, rdbuff_bits));
        }
        Ok(value)
    }

    pub fn port_write(&mut self, port: Port, data: u32) -> Result<(), Error> {
        if self.is_stopped {
            return Err(Error::DapNotStarted);
        }
        let info = port.info();
        if !info.writable {
            return Err(Error::DapInvalidPortOp);
        }
        if !info.defined && self.config.block_undefined_ports {
            return Err(Error::DapUndefinedPort);
        }
        self.ensure_select(info.is_ap, info.apbanksel, info.ctrlsel)?;

        let is_ap = info.is_ap;
        let addr_bits = info.addr_bits;
        self.transfer(|dap| dap.raw_write(is_ap, addr_bits, data))?;

        if is_ap {
            self.line.idle_short();
            self.line.idle_short();
        }
        Ok(())
    }

    /// Read-modify-write CSW.Size/CSW.AddrInc, eliding the write entirely
    /// when the cached values already match.
    pub fn set_csw(&mut self, size: u32, autoinc: u32) -> Result<(), Error> {
        if self.csw_size == Some(size) && self.csw_autoinc == Some(autoinc) {
            return Ok(());
        }
        let csw = self.port_read(Port::ApCsw)?;
        let value = (csw & !(CSW_SIZE_MASK | CSW_ADDRINC_MASK)) | size | autoinc;
        self.port_write(Port::ApCsw, value)?;
        self.csw_size = Some(size);
        self.csw_autoinc = Some(autoinc);
        Ok(())
    }

    /// Write SELECT only when the requested APBANKSEL/CTRLSEL differs from
    /// the cached value. Both fields start at an "unknown" sentinel so the
    /// first access after `start` always writes SELECT once.
    fn ensure_select(
        &mut self,
        is_ap: bool,
        apbanksel: Option<u8>,
        ctrlsel: Option<u8>,
    ) -> Result<(), Error> {
        if is_ap {
            let bank = apbanksel.expect("AP port without an APBANKSEL");
            if self.apbanksel != Some(bank) {
                let value = (bank as u32) | (self.ctrlsel.unwrap_or(0) as u32);
                self.write_select(value)?;
                self.apbanksel = Some(bank);
            }
        } else if let Some(sel) = ctrlsel {
            if self.ctrlsel != Some(sel) {
                let value = (self.apbanksel.unwrap_or(0) as u32) | (sel as u32);
                self.write_select(value)?;
                self.ctrlsel = Some(sel);
            }
        }
        Ok(())
    }

    fn write_select(&mut self, value: u32) -> Result<(), Error> {
        let addr_bits = Port::DpSelect.info().addr_bits;
        self.transfer(|dap| dap.raw_write(false, addr_bits, value))
    }

    /// Run `op`, retrying on WAIT, recovering on FAULT, and resyncing the
    /// whole line on a protocol error before giving the original call one
    /// more chance.
    fn transfer<T>(&mut self, mut op: impl FnMut(&mut Self) -> Result<T, Ack>) -> Result<T, Error> {
        let mut retries = self.config.retry_count;
        loop {
            match op(self) {
                Ok(v) => return Ok(v),
                Err(Ack::Wait) => {
                    if retries == 0 {
                        return Err(Error::General);
                    }
                    retries -= 1;
                }
                Err(Ack::Fault) => {
                    self.handle_fault()?;
                    if retries == 0 {
                        return Err(Error::General);
                    }
                    retries -= 1;
                }
                Err(Ack::Protocol) => {
                    if self.resync().is_err() {
                        self.is_stopped = true;
                        return Err(Error::General);
                    }
                    if retries == 0 {
                        return Err(Error::General);
                    }
                    retries -= 1;
                }
            }
        }
    }

    /// Read CTRL/STAT, clear whichever sticky-error bits are set via ABORT.
    fn handle_fault(&mut self) -> Result<(), Error> {
        let ctrlstat = self.port_read(Port::DpCtrlStat)?;
        let mut abort = 0u32;
        if ctrlstat & WDATAERR != 0 {
            abort |= 0x8;
        }
        if ctrlstat & STICKYERR != 0 {
            abort |= 0x4;
            self.ap_error = true;
        }
        if abort != 0 {
            self.port_write(Port::DpAbort, abort)?;
        }
        Ok(())
    }

    /// Line reset, re-run the IDCODE resync, re-power the AP and re-clear
    /// sticky errors. Used both by [`Dap::start`] and, after a protocol
    /// error, to resynchronize before the caller's original operation
    /// retries. A single unrecoverable failure here means the target is
    /// unreachable; callers must stop the DAP rather than recurse.
    fn resync(&mut self) -> Result<(), Error> {
        if self.config.auto_jtag_switch {
            self.line.jtag_to_swd();
        } else {
            self.line.line_reset();
            self.line.idle_short();
        }
        self.apbanksel = None;
        self.ctrlsel = None;
        self.csw_size = None;
        self.csw_autoinc = None;
        self.ap_error = false;

        let idcode_bits = Port::DpIdcode.info().addr_bits;
        self.raw_read(false, idcode_bits).map_err(|_| Error::DapStartErr)?;
        self.power_on_ap_and_detect_endian()
    }

    /// Single-attempt, non-recursive AP power-on: write CTRL/STAT's power
    /// request bits, verify the ack bits came back, clear sticky errors via
    /// ABORT, then read AP_CFG.BE to learn target endianness. Uses
    /// [`Dap::raw_read`]/[`Dap::raw_write`] directly rather than
    /// [`Dap::port_read`]/[`Dap::port_write`] so a second protocol error here
    /// cannot recurse back into [`Dap::resync`].
    fn power_on_ap_and_detect_endian(&mut self) -> Result<(), Error> {
        let ctrlstat_bits = Port::DpCtrlStat.info().addr_bits;
        self.raw_write(false, ctrlstat_bits, CTRLSTAT_POWER_REQ)
            .map_err(|_| Error::DapStartErr)?;
        let ctrlstat = self.raw_read(false, ctrlstat_bits).map_err(|_| Error::DapStartErr)?;
        if ctrlstat & CTRLSTAT_POWER_ACK != CTRLSTAT_POWER_ACK {
            return Err(Error::DapStartErr);
        }

        let abort_bits = Port::DpAbort.info().addr_bits;
        self.raw_write(false, abort_bits, ABORT_CLEAR_ALL)
            .map_err(|_| Error::DapStartErr)?;

        let select_bits = Port::DpSelect.info().addr_bits;
        let apcfg_bank = Port::ApCfg.info().apbanksel.expect("AP_CFG has a bank");
        self.raw_write(false, select_bits, apcfg_bank as u32)
            .map_err(|_| Error::DapStartErr)?;
        self.apbanksel = Some(apcfg_bank);

        let cfg_bits = Port::ApCfg.info().addr_bits;
        self.raw_read(true, cfg_bits).map_err(|_| Error::DapStartErr)?; // posted, discard
        let rdbuff_bits = Port::DpRdbuff.info().addr_bits;
        let cfg = self.raw_read(false, rdbuff_bits).map_err(|_| Error::DapStartErr)?;
        self.little_endian = cfg & 0x1 == 0;
        Ok(())
    }

    fn raw_read(&mut self, is_ap: bool, addr_bits: u8) -> Result<u32, Ack> {
        let req = packet::encode(is_ap, true, addr_bits);
        self.line.write_bits(req as u32, 8);
        self.line.turnaround();
        let ack_bits = self.line.read_bits(3);
        if let Err(ack) = decode_ack(ack_bits) {
            self.line.turnaround();
            self.line.idle_short();
            return Err(ack);
        }
        let data = self.line.read_bits(32);
        let parity_bit = (self.line.read_bits(1) & 1) as u8;
        self.line.turnaround();
        if packet::data_parity(data) != parity_bit {
            return Err(Ack::Protocol);
        }
        Ok(data)
    }

    /// Writes the request, ack, and data/parity phases, then — per the
    /// write-path of the low-level transfer loop — reads CTRL/STAT to check
    /// WDATAERR before reporting success; a set WDATAERR is surfaced as
    /// `Ack::Wait` so the caller's normal retry loop re-attempts the write.
    fn raw_write(&mut self, is_ap: bool, addr_bits: u8, data: u32) -> Result<(), Ack> {
        let req = packet::encode(is_ap, false, addr_bits);
        self.line.write_bits(req as u32, 8);
        self.line.turnaround();
        let ack_bits = self.line.read_bits(3);
        self.line.turnaround();
        if let Err(ack) = decode_ack(ack_bits) {
            self.line.idle_short();
            return Err(ack);
        }
        let parity = packet::data_parity(data);
        self.line.write_bits(data, 32);
        self.line.write_bits(parity as u32, 1);

        let ctrlstat_bits = Port::DpCtrlStat.info().addr_bits;
        let ctrlstat = self.raw_read(false, ctrlstat_bits)?;
        if ctrlstat & WDATAERR != 0 {
            return Err(Ack::Wait);
        }
        Ok(())
    }
}

/// The port-level surface [`crate::host::Host`] depends on, so it can be
/// generic over anything that can read/write DP/AP ports rather than
/// requiring a concrete [`Dap`] (and, transitively, a concrete pin driver).
/// This is also what makes the host layer's unit tests possible without
/// simulating the bit-level wire protocol.
pub trait PortAccess {
    fn start(&mut self) -> Result<(), Error>;
    fn stop(&mut self);
    fn port_read(&mut self, port: Port) -> Result<u32, Error>;
    fn port_write(&mut self, port: Port, data: u32) -> Result<(), Error>;
    fn set_csw(&mut self, size: u32, autoinc: u32) -> Result<(), Error>;
    fn little_endian(&self) -> bool;
}

impl<P: PinDriver> PortAccess for Dap<P> {
    fn start(&mut self) -> Result<(), Error> {
        Dap::start(self)
    }

    fn stop(&mut self) {
        Dap::stop(self)
    }

    fn port_read(&mut self, port: Port) -> Result<u32, Error> {
        Dap::port_read(self, port)
    }

    fn port_write(&mut self, port: Port, data: u32) -> Result<(), Error> {
        Dap::port_write(self, port, data)
    }

    fn set_csw(&mut self, size: u32, autoinc: u32) -> Result<(), Error> {
        Dap::set_csw(self, size, autoinc)
    }

    fn little_endian(&self) -> bool {
        Dap::little_endian(self)
    }
}
