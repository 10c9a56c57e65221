//! Bookkeeping for the IBREAK/DBREAK comparators.
//!
//! Programming the comparators is left to a [`DebugHardware`] implementation,
//! this module only validates requests and tracks which addresses own a slot.

#[derive(Clone, Copy, Debug, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum WatchKind {
    Read = 1,
    Write = 2,
    Access = 3,
}

impl WatchKind {
    /// Maps the type field of a `Z2`/`Z3`/`Z4` packet.
    pub fn from_z_type(z_type: u8) -> Option<Self> {
        match z_type {
            2 => Some(WatchKind::Write),
            3 => Some(WatchKind::Read),
            4 => Some(WatchKind::Access),
            _ => None,
        }
    }

    /// Load/store enable bits as the DBREAKC programming code expects them.
    pub fn hardware_bits(self) -> u32 {
        num_traits::ToPrimitive::to_u32(&self).unwrap_or(0)
    }
}

/// Claims and releases comparator slots. Each call returns whether the
/// hardware accepted it.
pub trait DebugHardware {
    fn claim_breakpoint(&mut self, addr: u32, len: u32) -> bool;
    fn claim_watchpoint(&mut self, addr: u32, mask: u32, kind: WatchKind) -> bool;
    fn release_breakpoint(&mut self, addr: u32) -> bool;
    fn release_watchpoint(&mut self, addr: u32) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BreakpointError {
    #[error("watch length {0} is not a power of two between 1 and 64")]
    UnsupportedLength(u32),
    #[error("no free hardware slot for {0:#010x}")]
    NoSlotAvailable(u32),
    #[error("nothing set at {0:#010x}")]
    NotFound(u32),
}

/// DBREAKC mask bits for a watched region of `len` bytes.
pub fn watch_mask(len: u32) -> Option<u32> {
    match len {
        1 => Some(0x3f),
        2 => Some(0x3e),
        4 => Some(0x3c),
        8 => Some(0x38),
        16 => Some(0x30),
        32 => Some(0x20),
        64 => Some(0x00),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub addr: u32,
    pub len: u32,
    pub kind: Option<WatchKind>,
}

/// The lx106 has one instruction and one data breakpoint.
pub struct BreakpointManager<H: DebugHardware, const BREAK: usize = 1, const WATCH: usize = 1> {
    hardware: H,
    breakpoints: [Option<Slot>; BREAK],
    watchpoints: [Option<Slot>; WATCH],
}

impl<H: DebugHardware, const BREAK: usize, const WATCH: usize> BreakpointManager<H, BREAK, WATCH> {
    pub fn new(hardware: H) -> Self {
        Self {
            hardware,
            breakpoints: [None; BREAK],
            watchpoints: [None; WATCH],
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Slot> {
        self.breakpoints.iter().flatten()
    }

    pub fn watchpoints(&self) -> impl Iterator<Item = &Slot> {
        self.watchpoints.iter().flatten()
    }

    pub fn set_breakpoint(&mut self, addr: u32, len: u32) -> Result<(), BreakpointError> {
        if find(&self.breakpoints, addr).is_some() {
            return Ok(());
        }
        let free = free_slot(&self.breakpoints).ok_or(BreakpointError::NoSlotAvailable(addr))?;
        if !self.hardware.claim_breakpoint(addr, len) {
            return Err(BreakpointError::NoSlotAvailable(addr));
        }
        self.breakpoints[free] = Some(Slot {
            addr,
            len,
            kind: None,
        });
        log::debug!("hw breakpoint set at {:#010x}", addr);
        Ok(())
    }

    pub fn del_breakpoint(&mut self, addr: u32) -> Result<(), BreakpointError> {
        let index = find(&self.breakpoints, addr).ok_or(BreakpointError::NotFound(addr))?;
        self.breakpoints[index] = None;
        if !self.hardware.release_breakpoint(addr) {
            return Err(BreakpointError::NotFound(addr));
        }
        log::debug!("hw breakpoint at {:#010x} removed", addr);
        Ok(())
    }

    pub fn set_watchpoint(
        &mut self,
        addr: u32,
        len: u32,
        kind: WatchKind,
    ) -> Result<(), BreakpointError> {
        let mask = watch_mask(len).ok_or(BreakpointError::UnsupportedLength(len))?;
        if find(&self.watchpoints, addr).is_some() {
            return Ok(());
        }
        let free = free_slot(&self.watchpoints).ok_or(BreakpointError::NoSlotAvailable(addr))?;
        if !self.hardware.claim_watchpoint(addr, mask, kind) {
            return Err(BreakpointError::NoSlotAvailable(addr));
        }
        self.watchpoints[free] = Some(Slot {
            addr,
            len,
            kind: Some(kind),
        });
        log::debug!("{:?} watchpoint set at {:#010x}, {} bytes", kind, addr, len);
        Ok(())
    }

    pub fn del_watchpoint(&mut self, addr: u32) -> Result<(), BreakpointError> {
        let index = find(&self.watchpoints, addr).ok_or(BreakpointError::NotFound(addr))?;
        self.watchpoints[index] = None;
        if !self.hardware.release_watchpoint(addr) {
            return Err(BreakpointError::NotFound(addr));
        }
        log::debug!("watchpoint at {:#010x} removed", addr);
        Ok(())
    }
}

fn find(slots: &[Option<Slot>], addr: u32) -> Option<usize> {
    slots
        .iter()
        .position(|slot| matches!(slot, Some(slot) if slot.addr == addr))
}

fn free_slot(slots: &[Option<Slot>]) -> Option<usize> {
    slots.iter().position(Option::is_none)
}
