//! GDB view of the trap frame.
//!
//! The lx106 gdb port expects 22 registers: a0..a15, pc, sar, litbase, sr176,
//! an unused slot and ps. The view is computed from [`RawTrapFrame`] on every
//! access, writes go straight back into the frame.

use crate::frame::RawTrapFrame;

pub const GDB_REGISTER_COUNT: usize = 22;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GdbRegister {
    /// Address register a0..a15.
    A(u8),
    Pc,
    Sar,
    Litbase,
    Sr176,
    /// Reads as zero, writes are ignored.
    Reserved,
    Ps,
}

impl GdbRegister {
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0..=15 => Some(GdbRegister::A(index as u8)),
            16 => Some(GdbRegister::Pc),
            17 => Some(GdbRegister::Sar),
            18 => Some(GdbRegister::Litbase),
            19 => Some(GdbRegister::Sr176),
            20 => Some(GdbRegister::Reserved),
            21 => Some(GdbRegister::Ps),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = GdbRegister> {
        (0..GDB_REGISTER_COUNT).filter_map(GdbRegister::from_index)
    }
}

impl RawTrapFrame {
    /// Address register `n` with a0, a1 and a2..a15 joined into one bank.
    pub fn areg(&self, n: u8) -> u32 {
        match n {
            0 => self.a0,
            1 => self.a1,
            2..=15 => self.a[n as usize - 2],
            _ => 0,
        }
    }

    pub fn set_areg(&mut self, n: u8, value: u32) {
        match n {
            0 => self.a0 = value,
            1 => self.a1 = value,
            2..=15 => self.a[n as usize - 2] = value,
            _ => log::warn!("write to nonexistent address register a{}", n),
        }
    }

    pub fn gdb_register(&self, reg: GdbRegister) -> u32 {
        match reg {
            GdbRegister::A(n) => self.areg(n),
            GdbRegister::Pc => self.pc,
            GdbRegister::Sar => self.sar,
            GdbRegister::Litbase => self.litbase,
            GdbRegister::Sr176 => self.sr176,
            GdbRegister::Reserved => 0,
            GdbRegister::Ps => self.ps,
        }
    }

    pub fn set_gdb_register(&mut self, reg: GdbRegister, value: u32) {
        match reg {
            GdbRegister::A(n) => self.set_areg(n, value),
            GdbRegister::Pc => self.pc = value,
            GdbRegister::Sar => self.sar = value,
            GdbRegister::Litbase => self.litbase = value,
            GdbRegister::Sr176 => self.sr176 = value,
            GdbRegister::Reserved => {}
            GdbRegister::Ps => self.ps = value,
        }
    }

    /// Register values in GDB order, byte swapped the way they go on the wire.
    pub fn wire_registers(&self) -> [u32; GDB_REGISTER_COUNT] {
        let mut out = [0u32; GDB_REGISTER_COUNT];
        for (slot, reg) in out.iter_mut().zip(GdbRegister::all()) {
            *slot = self.gdb_register(reg).swap_bytes();
        }
        out
    }

    /// Inverse of [`RawTrapFrame::wire_registers`].
    pub fn set_wire_registers(&mut self, values: &[u32; GDB_REGISTER_COUNT]) {
        for (value, reg) in values.iter().zip(GdbRegister::all()) {
            self.set_gdb_register(reg, value.swap_bytes());
        }
    }
}
