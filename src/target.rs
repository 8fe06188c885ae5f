//! Core/FPU register enumeration and its mapping onto DCRSR's REGSEL field.

/// DCRSR.REGSEL write bit: set for a register write, clear for a read.
const REG_W: u32 = 0x1_0000;

/// A register accessible through DCRSR/DCRDR while the core is halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRegister {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    Sp,
    Lr,
    /// The address the core resumes at on leaving the debug state ("PC").
    DebugReturnAddress,
    Xpsr,
    Msp,
    Psp,
    /// CONTROL/FAULTMASK/BASEPRI/PRIMASK packed register ("CFBP").
    ControlFaultmaskBasepriPrimask,
    Fpscr,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    S12,
    S13,
    S14,
    S15,
    S16,
    S17,
    S18,
    S19,
    S20,
    S21,
    S22,
    S23,
    S24,
    S25,
    S26,
    S27,
    S28,
    S29,
    S30,
    S31,
}

impl TargetRegister {
    fn regsel(self) -> u32 {
        use TargetRegister::*;
        match self {
            R0 => 0,
            R1 => 1,
            R2 => 2,
            R3 => 3,
            R4 => 4,
            R5 => 5,
            R6 => 6,
            R7 => 7,
            R8 => 8,
            R9 => 9,
            R10 => 10,
            R11 => 11,
            R12 => 12,
            Sp => 13,
            Lr => 14,
            DebugReturnAddress => 15,
            Xpsr => 16,
            Msp => 17,
            Psp => 18,
            ControlFaultmaskBasepriPrimask => 20,
            Fpscr => 33,
            S0 => 64,
            S1 => 65,
            S2 => 66,
            S3 => 67,
            S4 => 68,
            S5 => 69,
            S6 => 70,
            S7 => 71,
            S8 => 72,
            S9 => 73,
            S10 => 74,
            S11 => 75,
            S12 => 76,
            S13 => 77,
            S14 => 78,
            S15 => 79,
            S16 => 80,
            S17 => 81,
            S18 => 82,
            S19 => 83,
            S20 => 84,
            S21 => 85,
            S22 => 86,
            S23 => 87,
            S24 => 88,
            S25 => 89,
            S26 => 90,
            S27 => 91,
            S28 => 92,
            S29 => 93,
            S30 => 94,
            S31 => 95,
        }
    }

    /// The value to write to DCRSR to read or write this register.
    pub fn as_regsel(self, is_write: bool) -> u32 {
        let sel = self.regsel();
        if is_write {
            sel | REG_W
        } else {
            sel
        }
    }
}
