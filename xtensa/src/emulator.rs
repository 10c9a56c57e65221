//! Emulation of the word load/store that tripped a data breakpoint.
//!
//! Re-executing the instruction would hit the same DBREAK again, so the
//! access is carried out here and pc is moved past it.

use crate::frame::RawTrapFrame;
use crate::memory::{TargetMemory, WordBus};

macro_rules! op0 {
    ($bytes:expr) => {
        $bytes[0] & 0x0f
    };
}

macro_rules! field_t {
    ($bytes:expr) => {
        $bytes[0] >> 4
    };
}

macro_rules! field_s {
    ($bytes:expr) => {
        $bytes[1] & 0x0f
    };
}

macro_rules! field_r {
    ($bytes:expr) => {
        $bytes[1] >> 4
    };
}

const OP0_LSAI: u8 = 0b0010;
const OP0_L32I_N: u8 = 0b1000;
const OP0_S32I_N: u8 = 0b1001;
const LSAI_R_L32I: u8 = 0b0010;
const LSAI_R_S32I: u8 = 0b0110;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Load,
    Store,
}

/// A decoded `l32i`, `s32i`, `l32i.n` or `s32i.n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadStore {
    pub access: Access,
    /// Loaded or stored register.
    pub t: u8,
    /// Base address register.
    pub s: u8,
    /// Byte offset from the base register.
    pub offset: u32,
    /// Instruction length, 2 for the narrow forms.
    pub len: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no l32i/s32i at {pc:#010x}: {bytes:02x?}")]
pub struct DecodeFailure {
    pub pc: u32,
    pub bytes: [u8; 3],
}

impl LoadStore {
    /// `bytes` are the three bytes at pc in memory order.
    pub fn decode(bytes: [u8; 3]) -> Option<Self> {
        let (access, offset, len) = match op0!(bytes) {
            OP0_LSAI => {
                let access = match field_r!(bytes) {
                    LSAI_R_L32I => Access::Load,
                    LSAI_R_S32I => Access::Store,
                    _ => return None,
                };
                (access, bytes[2] as u32 * 4, 3)
            }
            OP0_L32I_N => (Access::Load, field_r!(bytes) as u32 * 4, 2),
            OP0_S32I_N => (Access::Store, field_r!(bytes) as u32 * 4, 2),
            _ => return None,
        };
        Some(LoadStore {
            access,
            t: field_t!(bytes),
            s: field_s!(bytes),
            offset,
            len,
        })
    }

    pub fn effective_address(&self, frame: &RawTrapFrame) -> u32 {
        frame.areg(self.s).wrapping_add(self.offset)
    }
}

/// Executes the load/store at `frame.pc` against `memory` and steps over it.
///
/// On failure the frame is left alone; resuming will most likely trap on the
/// same watchpoint again.
pub fn emulate_load_store<B: WordBus>(
    frame: &mut RawTrapFrame,
    memory: &mut TargetMemory<B>,
) -> Result<LoadStore, DecodeFailure> {
    let pc = frame.pc;
    let bytes = [
        memory.read_byte(pc),
        memory.read_byte(pc.wrapping_add(1)),
        memory.read_byte(pc.wrapping_add(2)),
    ];
    let insn = LoadStore::decode(bytes).ok_or(DecodeFailure { pc, bytes })?;

    // the program's own access, so the debugger window does not apply
    let addr = insn.effective_address(frame);
    let bus = memory.bus_mut();
    match insn.access {
        Access::Load => {
            let value = bus.read_word(addr & !3);
            frame.set_areg(insn.t, value);
        }
        Access::Store => bus.write_word(addr & !3, frame.areg(insn.t)),
    }
    frame.pc = pc.wrapping_add(insn.len);
    log::debug!("emulated {:?} a{} @ {:#010x}", insn.access, insn.t, addr);
    Ok(insn)
}
