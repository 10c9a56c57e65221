use core::sync::atomic::{AtomicBool, Ordering};

use xtensa_lx106::{
    breakpoint::{BreakpointManager, DebugHardware},
    emulator::emulate_load_store,
    frame::DEBUGGED_EXCEPTIONS,
    memory::{TargetMemory, WordBus},
    RawTrapFrame, StopReason,
};

use crate::{
    connection::Connection,
    packets::psm::{Frame, PacketStateMachine},
    stub::{write_stop_reply, Action, GdbError, Stub},
    target::{Target, TrapHandler, TrapRegistry},
};

static SESSION_TAKEN: AtomicBool = AtomicBool::new(false);

/// Proof that no other [`DebugSession`] exists.
pub struct SessionToken {
    _private: (),
}

impl SessionToken {
    /// Hands out the token once per program run.
    ///
    /// The lx106 has no compare-and-swap, so this must be called before
    /// interrupts that could race it are enabled.
    pub fn take() -> Option<Self> {
        if SESSION_TAKEN.load(Ordering::Acquire) {
            return None;
        }
        SESSION_TAKEN.store(true, Ordering::Release);
        Some(Self { _private: () })
    }

    /// # Safety
    /// The caller guarantees that no two sessions built from stolen tokens
    /// ever handle the same trap vectors.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubConfig {
    /// Step over the load or store that hit a data breakpoint before resuming.
    /// Without this the core traps again on the same access forever.
    pub emulate_watchpoint_access: bool,
    /// Stop in [`DebugSession::install`] so the debugger is attached before
    /// the program runs on.
    pub break_on_init: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            emulate_watchpoint_access: true,
            break_on_init: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Trapped,
    Serving,
    Resuming,
}

/// The stopped-program side of the debugger.
///
/// `BREAK` and `WATCH` size the breakpoint and watchpoint pools, one of each
/// on the lx106.
pub struct DebugSession<
    C: Connection,
    T: Target,
    B: WordBus,
    H: DebugHardware,
    const BREAK: usize = 1,
    const WATCH: usize = 1,
> {
    connection: C,
    target: T,
    memory: TargetMemory<B>,
    breakpoints: BreakpointManager<H, BREAK, WATCH>,
    psm: PacketStateMachine,
    cfg: StubConfig,
    state: SessionState,
    frame: RawTrapFrame,
    stop: StopReason,
    _token: SessionToken,
}

impl<C: Connection, T: Target, B: WordBus, H: DebugHardware, const BREAK: usize, const WATCH: usize>
    DebugSession<C, T, B, H, BREAK, WATCH>
{
    pub fn new(
        token: SessionToken,
        connection: C,
        target: T,
        memory: TargetMemory<B>,
        breakpoints: BreakpointManager<H, BREAK, WATCH>,
        cfg: StubConfig,
    ) -> Self {
        Self {
            connection,
            target,
            memory,
            breakpoints,
            psm: PacketStateMachine::new(),
            cfg,
            state: SessionState::Idle,
            frame: RawTrapFrame::default(),
            stop: StopReason::from_reason(0),
            _token: token,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frame of the most recent trap.
    pub fn frame(&self) -> &RawTrapFrame {
        &self.frame
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn memory_mut(&mut self) -> &mut TargetMemory<B> {
        &mut self.memory
    }

    pub fn breakpoints(&self) -> &BreakpointManager<H, BREAK, WATCH> {
        &self.breakpoints
    }

    fn handle_trap(&mut self, frame: RawTrapFrame) -> RawTrapFrame {
        if self.state != SessionState::Idle {
            log::warn!(
                "nested trap at {:#010x} while {:?}, previous stop at {:#010x} is lost",
                frame.pc,
                self.state,
                self.frame.pc
            );
        }
        self.state = SessionState::Trapped;
        self.target.mask_interrupts();
        self.target.disable_watchdog();
        self.frame = frame;
        self.stop = frame.stop_reason();
        log::info!("stopped at {:#010x}: {:?}", frame.pc, self.stop);

        self.state = SessionState::Serving;
        self.psm.reset();
        let action = match self.serve() {
            Ok(action) => action,
            Err(err) => {
                log::error!("{}, resuming without the debugger", err);
                Action::Continue
            }
        };

        self.state = SessionState::Resuming;
        // a redirected pc no longer points at the access that trapped
        if self.cfg.emulate_watchpoint_access && self.stop.is_watchpoint() && self.frame.pc == frame.pc {
            if let Err(err) = emulate_load_store(&mut self.frame, &mut self.memory) {
                log::warn!("{}", err);
            }
        }
        if action == Action::Step {
            self.target.arm_single_step();
        }
        self.target.enable_watchdog();
        self.target.unmask_interrupts();
        self.state = SessionState::Idle;
        log::info!("resuming at {:#010x}", self.frame.pc);
        self.frame
    }

    fn serve(&mut self) -> Result<Action, GdbError<C::Error>> {
        write_stop_reply(&mut self.connection, self.stop).map_err(GdbError::ConnectionWrite)?;

        loop {
            let byte = loop {
                match self.connection.try_read().map_err(GdbError::ConnectionRead)? {
                    Some(byte) => break byte,
                    None => self.target.feed_watchdog(),
                }
            };

            match self.psm.incomming_data(byte) {
                None | Some(Frame::OutOfBand(b'+')) => {}
                Some(Frame::OutOfBand(b'-')) => log::debug!("<-- - (reply not resent)"),
                Some(Frame::OutOfBand(other)) => {
                    log::debug!("<-- {:#04x} outside a packet ignored", other)
                }
                Some(Frame::Rejected(err)) => {
                    log::warn!("<-- rejected packet: {}", err);
                    self.connection.write(b'-').map_err(GdbError::ConnectionWrite)?;
                    self.connection.flush().map_err(GdbError::ConnectionWrite)?;
                    log::trace!("--> -");
                }
                Some(Frame::Packet(payload)) => {
                    self.connection.write(b'+').map_err(GdbError::ConnectionWrite)?;
                    log::trace!("--> +");

                    let mut stub = Stub {
                        frame: &mut self.frame,
                        memory: &mut self.memory,
                        breakpoints: &mut self.breakpoints,
                        stop: self.stop,
                    };
                    let action = stub.handle_packet(&mut self.connection, payload)?;
                    if action != Action::Stay {
                        log::debug!("leaving the stub: {:?}", action);
                        return Ok(action);
                    }
                }
            }
        }
    }
}

impl<C, T, B, H, const BREAK: usize, const WATCH: usize> DebugSession<C, T, B, H, BREAK, WATCH>
where
    C: Connection + 'static,
    T: Target + 'static,
    B: WordBus + 'static,
    H: DebugHardware + 'static,
{
    /// Routes the debug vector and the exceptions worth stopping for to this session.
    ///
    /// With [`StubConfig::break_on_init`] the program stops right here and
    /// waits for the debugger to attach.
    pub fn install<R: TrapRegistry>(&'static mut self, registry: &mut R) -> Result<(), R::Error> {
        let break_on_init = self.cfg.break_on_init;
        registry.register_handler(&DEBUGGED_EXCEPTIONS, self)?;
        if break_on_init {
            log::info!("waiting for the debugger");
            T::request_break();
        }
        Ok(())
    }
}

impl<C: Connection, T: Target, B: WordBus, H: DebugHardware, const BREAK: usize, const WATCH: usize>
    TrapHandler for DebugSession<C, T, B, H, BREAK, WATCH>
{
    fn on_debug_trap(&mut self, frame: RawTrapFrame) -> RawTrapFrame {
        self.handle_trap(frame)
    }

    fn on_exception(&mut self, mut frame: RawTrapFrame) -> RawTrapFrame {
        frame.mark_exception();
        self.handle_trap(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::ScriptedConnection;
    use core::sync::atomic::AtomicUsize;
    use xtensa_lx106::{
        breakpoint::WatchKind,
        memory::{MemoryWindow, RamBus},
        DebugCause, ExceptionCause,
    };

    #[derive(Default)]
    struct RecordingTarget {
        events: Vec<&'static str>,
        feeds: usize,
    }

    impl Target for RecordingTarget {
        fn mask_interrupts(&mut self) {
            self.events.push("mask");
        }
        fn unmask_interrupts(&mut self) {
            self.events.push("unmask");
        }
        fn disable_watchdog(&mut self) {
            self.events.push("wdt off");
        }
        fn enable_watchdog(&mut self) {
            self.events.push("wdt on");
        }
        fn feed_watchdog(&mut self) {
            self.feeds += 1;
        }
        fn arm_single_step(&mut self) {
            self.events.push("step");
        }
        fn request_break() {
            BREAK_REQUESTS.fetch_add(1, Ordering::Relaxed);
        }
    }

    static BREAK_REQUESTS: AtomicUsize = AtomicUsize::new(0);

    struct NoHardware;

    impl DebugHardware for NoHardware {
        fn claim_breakpoint(&mut self, _addr: u32, _len: u32) -> bool {
            false
        }
        fn claim_watchpoint(&mut self, _addr: u32, _mask: u32, _kind: WatchKind) -> bool {
            false
        }
        fn release_breakpoint(&mut self, _addr: u32) -> bool {
            false
        }
        fn release_watchpoint(&mut self, _addr: u32) -> bool {
            false
        }
    }

    type TestSession<'a> = DebugSession<ScriptedConnection, RecordingTarget, RamBus<'a>, NoHardware>;

    fn session<'a>(ram: &'a mut [u32], input: &[u8]) -> TestSession<'a> {
        DebugSession::new(
            unsafe { SessionToken::steal() },
            ScriptedConnection::new(input),
            RecordingTarget::default(),
            TargetMemory::new(RamBus::new(0x3ffe_8000, ram), MemoryWindow::ESP8266),
            BreakpointManager::new(NoHardware),
            StubConfig::default(),
        )
    }

    fn leaked_session(input: &[u8], cfg: StubConfig) -> &'static mut TestSession<'static> {
        let ram: &'static mut [u32] = Box::leak(vec![0u32; 4].into_boxed_slice());
        let mut session = session(ram, input);
        session.cfg = cfg;
        Box::leak(Box::new(session))
    }

    fn debug_frame(pc: u32, cause: DebugCause) -> RawTrapFrame {
        RawTrapFrame {
            pc,
            reason: cause.bits(),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct VectorTable {
        causes: Vec<ExceptionCause>,
        handler: Option<&'static mut dyn TrapHandler>,
    }

    impl TrapRegistry for VectorTable {
        type Error = ();

        fn register_handler(
            &mut self,
            causes: &[ExceptionCause],
            handler: &'static mut dyn TrapHandler,
        ) -> Result<(), Self::Error> {
            self.causes.extend_from_slice(causes);
            self.handler = Some(handler);
            Ok(())
        }
    }

    #[test]
    fn install_registers_debugged_causes() {
        let session = leaked_session(b"$c#63", StubConfig::default());
        let mut table = VectorTable::default();
        session.install(&mut table).unwrap();
        assert_eq!(table.causes, DEBUGGED_EXCEPTIONS);

        let handler = table.handler.take().unwrap();
        let out = handler.on_debug_trap(debug_frame(0x4010_0000, DebugCause::BREAK));
        assert_eq!(out.pc, 0x4010_0000);
    }

    #[test]
    fn break_on_init_requests_a_break_after_install() {
        let before = BREAK_REQUESTS.load(Ordering::Relaxed);
        let cfg = StubConfig {
            break_on_init: true,
            ..StubConfig::default()
        };
        let session = leaked_session(b"$c#63", cfg);
        let mut table = VectorTable::default();
        session.install(&mut table).unwrap();
        assert!(table.handler.is_some());
        assert_eq!(BREAK_REQUESTS.load(Ordering::Relaxed), before + 1);
    }

    #[test]
    fn pools_follow_the_session_parameters() {
        struct TwoOfEach(usize);

        impl DebugHardware for TwoOfEach {
            fn claim_breakpoint(&mut self, _addr: u32, _len: u32) -> bool {
                self.0 += 1;
                true
            }
            fn claim_watchpoint(&mut self, _addr: u32, _mask: u32, _kind: WatchKind) -> bool {
                self.0 += 1;
                true
            }
            fn release_breakpoint(&mut self, _addr: u32) -> bool {
                true
            }
            fn release_watchpoint(&mut self, _addr: u32) -> bool {
                true
            }
        }

        let mut ram = [0u32; 4];
        let mut s: DebugSession<_, _, _, _, 2, 2> = DebugSession::new(
            unsafe { SessionToken::steal() },
            ScriptedConnection::new(
                b"$Z1,40100000,3#9b$Z1,40100010,3#9c$Z1,40100020,3#9d$c#63",
            ),
            RecordingTarget::default(),
            TargetMemory::new(RamBus::new(0x3ffe_8000, &mut ram), MemoryWindow::ESP8266),
            BreakpointManager::new(TwoOfEach(0)),
            StubConfig::default(),
        );
        s.on_debug_trap(debug_frame(0x4010_0000, DebugCause::BREAK));
        assert_eq!(s.breakpoints().hardware().0, 2);
        assert!(s.connection().output().ends_with(b"$E01#a6+"));
    }

    #[test]
    fn token_is_handed_out_once() {
        let first = SessionToken::take();
        assert!(first.is_some());
        assert!(SessionToken::take().is_none());
    }

    #[test]
    fn trap_masks_and_restores() {
        let mut ram = [0u32; 4];
        let mut s = session(&mut ram, b"$c#63");
        let out = s.on_debug_trap(debug_frame(0x4010_0000, DebugCause::BREAK));
        assert_eq!(out.pc, 0x4010_0000);
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.target().events, ["mask", "wdt off", "wdt on", "unmask"]);
        assert_eq!(s.connection().output(), b"$T05#b9+");
    }

    #[test]
    fn step_arms_icount() {
        let mut ram = [0u32; 4];
        let mut s = session(&mut ram, b"$s#73");
        s.on_debug_trap(debug_frame(0x4010_0000, DebugCause::BREAK));
        assert_eq!(s.target().events, ["mask", "wdt off", "step", "wdt on", "unmask"]);
    }

    #[test]
    fn exception_entry_marks_frame() {
        let mut ram = [0u32; 4];
        let mut s = session(&mut ram, b"$c#63");
        let frame = RawTrapFrame {
            pc: 0x4010_0000,
            reason: ExceptionCause::LoadStoreError as u32,
            ..Default::default()
        };
        s.on_exception(frame);
        assert!(s.connection().output().starts_with(b"$T0b#"));
        assert_eq!(s.frame().stop_reason(), StopReason::Exception(3));
    }

    #[test]
    fn watchdog_is_fed_while_waiting() {
        let mut ram = [0u32; 4];
        let mut s = session(&mut ram, b"$c#63");
        s.connection_mut().stall = 5;
        s.on_debug_trap(debug_frame(0, DebugCause::BREAK));
        assert_eq!(s.target().feeds, 5);
    }

    #[test]
    fn lost_connection_resumes() {
        let mut ram = [0u32; 4];
        let mut s = session(&mut ram, b"$g#67");
        let out = s.on_debug_trap(debug_frame(0x4010_0000, DebugCause::BREAK));
        assert_eq!(out.pc, 0x4010_0000);
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.target().events.last(), Some(&"unmask"));
    }

    #[test]
    fn nested_trap_replaces_previous_stop() {
        let mut ram = [0u32; 4];
        let mut s = session(&mut ram, b"$c#63");
        s.frame.pc = 0x4010_0000;
        s.state = SessionState::Serving;
        let out = s.on_debug_trap(debug_frame(0x4020_0000, DebugCause::IBREAK));
        assert_eq!(out.pc, 0x4020_0000);
        assert_eq!(s.frame().pc, 0x4020_0000);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.connection().output().starts_with(b"$T05#"));
    }

    #[test]
    fn emulation_can_be_disabled() {
        // l32i.n a3, a4, 4 at the trap pc
        let mut ram = [0x1438, 0, 0, 0];
        let mut s = session(&mut ram, b"$c#63");
        s.cfg.emulate_watchpoint_access = false;
        let out = s.on_debug_trap(debug_frame(0x3ffe_8000, DebugCause::DBREAK));
        assert_eq!(out.pc, 0x3ffe_8000);
    }

    #[test]
    fn redirected_resume_skips_emulation() {
        let mut ram = [0x1438, 0, 0, 0];
        let mut s = session(&mut ram, b"$c3ffe8008#97");
        let out = s.on_debug_trap(debug_frame(0x3ffe_8000, DebugCause::DBREAK));
        assert_eq!(out.pc, 0x3ffe_8008);
    }
}
