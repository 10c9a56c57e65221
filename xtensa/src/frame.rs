/// Number of 32 bit words in a [`RawTrapFrame`] as laid out by the trap entry code.
pub const FRAME_WORDS: usize = 24;

/// Bit 7 of `reason` separates exceptions from debug traps.
pub const EXCEPTION_FLAG: u32 = 0x80;

/// Register snapshot taken by the trap entry code.
///
/// Field order is the save order of the exception vector. The first 19 words are
/// what the HAL stores on its own, the rest are appended by the debug entry code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawTrapFrame {
    pub pc: u32,
    pub ps: u32,
    pub sar: u32,
    pub vpri: u32,
    pub a0: u32,
    /// a2..a15
    pub a: [u32; 14],
    pub litbase: u32,
    pub sr176: u32,
    pub sr208: u32,
    pub a1: u32,
    /// Exception cause with bit 7 set, or a DEBUGCAUSE bitmap with bit 7 clear.
    pub reason: u32,
}

impl RawTrapFrame {
    pub fn from_words(words: &[u32; FRAME_WORDS]) -> Self {
        let mut a = [0u32; 14];
        a.copy_from_slice(&words[5..19]);
        Self {
            pc: words[0],
            ps: words[1],
            sar: words[2],
            vpri: words[3],
            a0: words[4],
            a,
            litbase: words[19],
            sr176: words[20],
            sr208: words[21],
            a1: words[22],
            reason: words[23],
        }
    }

    pub fn as_words(&self) -> [u32; FRAME_WORDS] {
        let mut words = [0u32; FRAME_WORDS];
        words[0] = self.pc;
        words[1] = self.ps;
        words[2] = self.sar;
        words[3] = self.vpri;
        words[4] = self.a0;
        words[5..19].copy_from_slice(&self.a);
        words[19] = self.litbase;
        words[20] = self.sr176;
        words[21] = self.sr208;
        words[22] = self.a1;
        words[23] = self.reason;
        words
    }

    /// Flags the frame as coming from the exception vector rather than the debug vector.
    pub fn mark_exception(&mut self) {
        self.reason |= EXCEPTION_FLAG;
    }

    pub fn stop_reason(&self) -> StopReason {
        StopReason::from_reason(self.reason)
    }
}

bitflags::bitflags! {
    /// DEBUGCAUSE bits as reported in the low bits of `reason` for debug traps.
    pub struct DebugCause: u32 {
        /// ICOUNT reached zero, i.e. a single step finished.
        const ICOUNT       = 1 << 0;
        /// IBREAK comparator matched.
        const IBREAK       = 1 << 1;
        /// DBREAK comparator matched.
        const DBREAK       = 1 << 2;
        /// `break` instruction.
        const BREAK        = 1 << 3;
        /// `break.n` instruction.
        const BREAK_N      = 1 << 4;
        const DEBUG_INT    = 1 << 5;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Raw EXCCAUSE value, kept unconverted so unknown causes still map to a signal.
    Exception(u8),
    DebugTrap(DebugCause),
}

impl StopReason {
    pub fn from_reason(reason: u32) -> Self {
        if reason & EXCEPTION_FLAG != 0 {
            StopReason::Exception((reason & 0x7f) as u8)
        } else {
            StopReason::DebugTrap(DebugCause::from_bits_truncate(reason & 0x7f))
        }
    }

    /// True for a data breakpoint hit that is not also a general exception.
    pub fn is_watchpoint(&self) -> bool {
        matches!(self, StopReason::DebugTrap(cause) if cause.contains(DebugCause::DBREAK))
    }

    pub fn exception_cause(&self) -> Option<ExceptionCause> {
        match self {
            StopReason::Exception(cause) => ExceptionCause::try_from(*cause).ok(),
            StopReason::DebugTrap(_) => None,
        }
    }
}

//----------------------------------------------------------------------

/// EXCCAUSE values of the LX106 core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum ExceptionCause {
    IllegalInstruction = 0,
    Syscall = 1,
    InstructionFetchError = 2,
    LoadStoreError = 3,
    Level1Interrupt = 4,
    Alloca = 5,
    IntegerDivideByZero = 6,
    Speculation = 7,
    Privileged = 8,
    Unaligned = 9,
    InstrPifDataError = 12,
    LoadStorePifDataError = 13,
    InstrPifAddrError = 14,
    LoadStorePifAddrError = 15,
    InstTlbMiss = 16,
    InstTlbMultiHit = 17,
    InstFetchPrivilege = 18,
    InstFetchProhibited = 20,
    LoadStoreTlbMiss = 24,
    LoadStoreTlbMultiHit = 25,
    LoadStorePrivilege = 26,
    LoadProhibited = 28,
    StoreProhibited = 29,
}

impl TryFrom<u8> for ExceptionCause {
    type Error = ();
    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match num_traits::FromPrimitive::from_u8(val) {
            Option::Some(val) => Result::Ok(val),
            Option::None => Result::Err(()),
        }
    }
}

impl From<ExceptionCause> for u8 {
    fn from(cause: ExceptionCause) -> u8 {
        num_traits::ToPrimitive::to_u8(&cause).unwrap_or(u8::MAX)
    }
}

/// Causes the stub hooks when it owns the exception vector.
pub const DEBUGGED_EXCEPTIONS: [ExceptionCause; 13] = [
    ExceptionCause::IllegalInstruction,
    ExceptionCause::Syscall,
    ExceptionCause::InstructionFetchError,
    ExceptionCause::LoadStoreError,
    ExceptionCause::IntegerDivideByZero,
    ExceptionCause::Unaligned,
    ExceptionCause::InstrPifDataError,
    ExceptionCause::LoadStorePifDataError,
    ExceptionCause::InstrPifAddrError,
    ExceptionCause::LoadStorePifAddrError,
    ExceptionCause::InstFetchProhibited,
    ExceptionCause::LoadProhibited,
    ExceptionCause::StoreProhibited,
];
