use xtensa_lx106::StopReason;

/// GDB signal numbers used in stop replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::ToPrimitive)]
#[allow(clippy::upper_case_acronyms)]
pub enum Signal {
    Zero = 0,
    SIGINT = 2,
    SIGILL = 4,
    SIGTRAP = 5,
    SIGABRT = 6,
    SIGBUS = 7,
    SIGFPE = 8,
    SIGSEGV = 11,
    SIGSYS = 31,
}

/// Signal for EXCCAUSE 0..=15, anything above is a memory fault of some kind.
const EXCEPTION_SIGNALS: [Signal; 16] = [
    Signal::SIGILL,  // illegal instruction
    Signal::SIGSYS,  // syscall
    Signal::SIGSEGV, // instruction fetch error
    Signal::SIGSEGV, // load/store error
    Signal::SIGINT,  // level 1 interrupt
    Signal::SIGABRT, // alloca
    Signal::SIGFPE,  // integer divide by zero
    Signal::Zero,
    Signal::SIGABRT, // privileged
    Signal::SIGBUS,  // load/store alignment
    Signal::Zero,
    Signal::Zero,
    Signal::SIGBUS, // instr pif data error
    Signal::SIGBUS, // load/store pif data error
    Signal::SIGBUS, // instr pif addr error
    Signal::SIGBUS, // load/store pif addr error
];

impl Signal {
    pub fn from_stop_reason(reason: StopReason) -> Self {
        match reason {
            StopReason::DebugTrap(_) => Signal::SIGTRAP,
            StopReason::Exception(cause) => EXCEPTION_SIGNALS
                .get(cause as usize)
                .copied()
                .unwrap_or(Signal::SIGSEGV),
        }
    }

    pub fn as_protocol_u8(self) -> u8 {
        num_traits::ToPrimitive::to_u8(&self).unwrap_or(0)
    }
}
