//! The closed enumeration of DP and AP ports and their static metadata
//! (register offset, access direction, required APBANKSEL).

use num_enum::IntoPrimitive;

/// A DP or AP register, addressed through the DAP engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Port {
    // DP ports
    DpAbort,
    DpIdcode,
    DpCtrlStat,
    DpWcr,
    DpResend,
    DpSelect,
    DpRdbuff,
    DpRoutesel,

    // AP ports
    ApCsw,
    ApTar,
    ApDrw,
    ApDb0,
    ApDb1,
    ApDb2,
    ApDb3,
    ApCfg,
    ApBase,
    ApIdr,
}

#[derive(Debug, Clone, Copy)]
pub struct PortInfo {
    pub is_ap: bool,
    /// Register select, `A[3:2]`, as a 2-bit value (`offset >> 2`).
    pub addr_bits: u8,
    pub readable: bool,
    pub writable: bool,
    /// Required SELECT.APBANKSEL value for AP ports; `None` for DP ports.
    pub apbanksel: Option<u8>,
    /// Required SELECT.CTRLSEL value for the two DP ports that share offset
    /// 0x4 (`CTRL_STAT`/`WCR`); `None` elsewhere.
    pub ctrlsel: Option<u8>,
    /// False for the optional safety-blockable set (AP_DB0..3, AP_BASE).
    /// Gated by [`crate::config::Config::block_undefined_ports`]; `true`
    /// ports are always reachable regardless of that flag.
    pub defined: bool,
}

impl Port {
    pub fn info(self) -> PortInfo {
        use Port::*;
        match self {
            DpAbort => PortInfo { is_ap: false, addr_bits: 0x0, readable: false, writable: true, apbanksel: None, ctrlsel: None, defined: true },
            DpIdcode => PortInfo { is_ap: false, addr_bits: 0x0, readable: true, writable: false, apbanksel: None, ctrlsel: None, defined: true },
            DpCtrlStat => PortInfo { is_ap: false, addr_bits: 0x1, readable: true, writable: true, apbanksel: None, ctrlsel: Some(0), defined: true },
            DpWcr => PortInfo { is_ap: false, addr_bits: 0x1, readable: true, writable: true, apbanksel: None, ctrlsel: Some(1), defined: true },
            DpResend => PortInfo { is_ap: false, addr_bits: 0x2, readable: true, writable: false, apbanksel: None, ctrlsel: None, defined: true },
            DpSelect => PortInfo { is_ap: false, addr_bits: 0x2, readable: false, writable: true, apbanksel: None, ctrlsel: None, defined: true },
            DpRdbuff => PortInfo { is_ap: false, addr_bits: 0x3, readable: true, writable: false, apbanksel: None, ctrlsel: None, defined: true },
            // Multi-drop SWD only (see Non-goals); not part of the
            // block_undefined_ports safety set.
            DpRoutesel => PortInfo { is_ap: false, addr_bits: 0x3, readable: false, writable: true, apbanksel: None, ctrlsel: None, defined: true },

            ApCsw => PortInfo { is_ap: true, addr_bits: 0x0, readable: true, writable: true, apbanksel: Some(0x00), ctrlsel: None, defined: true },
            ApTar => PortInfo { is_ap: true, addr_bits: 0x1, readable: true, writable: true, apbanksel: Some(0x00), ctrlsel: None, defined: true },
            ApDrw => PortInfo { is_ap: true, addr_bits: 0x3, readable: true, writable: true, apbanksel: Some(0x00), ctrlsel: None, defined: true },
            ApDb0 => PortInfo { is_ap: true, addr_bits: 0x0, readable: true, writable: true, apbanksel: Some(0x10), ctrlsel: None, defined: false },
            ApDb1 => PortInfo { is_ap: true, addr_bits: 0x1, readable: true, writable: true, apbanksel: Some(0x10), ctrlsel: None, defined: false },
            ApDb2 => PortInfo { is_ap: true, addr_bits: 0x2, readable: true, writable: true, apbanksel: Some(0x10), ctrlsel: None, defined: false },
            ApDb3 => PortInfo { is_ap: true, addr_bits: 0x3, readable: true, writable: true, apbanksel: Some(0x10), ctrlsel: None, defined: false },
            ApCfg => PortInfo { is_ap: true, addr_bits: 0x1, readable: true, writable: false, apbanksel: Some(0xF0), ctrlsel: None, defined: true },
            ApBase => PortInfo { is_ap: true, addr_bits: 0x2, readable: true, writable: false, apbanksel: Some(0xF0), ctrlsel: None, defined: false },
            ApIdr => PortInfo { is_ap: true, addr_bits: 0x3, readable: true, writable: false, apbanksel: Some(0xF0), ctrlsel: None, defined: true },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ap_bank_assignment_matches_reference_table() {
        assert_eq!(Port::ApCsw.info().apbanksel, Some(0x00));
        assert_eq!(Port::ApTar.info().apbanksel, Some(0x00));
        assert_eq!(Port::ApDrw.info().apbanksel, Some(0x00));
        assert_eq!(Port::ApDb0.info().apbanksel, Some(0x10));
        assert_eq!(Port::ApCfg.info().apbanksel, Some(0xF0));
        assert_eq!(Port::ApBase.info().apbanksel, Some(0xF0));
        assert_eq!(Port::ApIdr.info().apbanksel, Some(0xF0));
    }

    #[test]
    fn ctrl_stat_and_wcr_share_offset_but_differ_in_ctrlsel() {
        let cs = Port::DpCtrlStat.info();
        let wcr = Port::DpWcr.info();
        assert_eq!(cs.addr_bits, wcr.addr_bits);
        assert_eq!(cs.ctrlsel, Some(0));
        assert_eq!(wcr.ctrlsel, Some(1));
    }

    #[test]
    fn write_only_and_read_only_ports_reject_the_other_direction() {
        assert!(!Port::DpAbort.info().readable);
        assert!(Port::DpAbort.info().writable);
        assert!(Port::DpIdcode.info().readable);
        assert!(!Port::DpIdcode.info().writable);
    }

    #[test]
    fn block_undefined_ports_blockable_set_is_ap_db_and_base_only() {
        assert!(!Port::ApDb0.info().defined);
        assert!(!Port::ApDb1.info().defined);
        assert!(!Port::ApDb2.info().defined);
        assert!(!Port::ApDb3.info().defined);
        assert!(!Port::ApBase.info().defined);
        assert!(Port::DpRoutesel.info().defined);
        assert!(Port::ApCsw.info().defined);
    }
}
