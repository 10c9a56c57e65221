//! Host simulator for trying the stub with a real GDB.
//!
//! A tiny lx106 core that only understands word loads and stores runs a canned
//! program out of simulated DRAM and raises the same traps the firmware would.
//! Connect with `xtensa-lx106-elf-gdb -ex "target remote localhost:2345"`.

use std::{error::Error, fmt::Write, net::TcpListener};

use esp_gdbstub::{
    console::ConsoleRedirect,
    connection::Connection,
    target::{Target, TrapHandler},
    DebugSession, SessionToken, StubConfig,
};
use xtensa_lx106::{
    breakpoint::{BreakpointManager, DebugHardware, WatchKind},
    emulator::{emulate_load_store, Access, LoadStore},
    memory::{MemoryWindow, RamBus, TargetMemory},
    DebugCause, RawTrapFrame,
};

const RAM_BASE: u32 = 0x3ffe_8000;
const RAM_WORDS: usize = 0x400;
const DATA_BASE: u32 = RAM_BASE + 0x100;

const PROGRAM: &[u8] = &[
    0x38, 0x14, // l32i.n a3, a4, 4
    0x39, 0x24, // s32i.n a3, a4, 8
    0x52, 0x24, 0x03, // l32i a5, a4, 12
    0x52, 0x64, 0x04, // s32i a5, a4, 16
];

fn main() {
    struct Logger {}
    impl log::Log for Logger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            println!("[{:<5}] {}", record.level(), record.args());
        }

        fn flush(&self) {}
    }
    _ = log::set_logger(&Logger {});
    log::set_max_level(log::LevelFilter::Trace);

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "localhost:2345".into());
    let listener = TcpListener::bind(&addr).expect("failed to bind listen address");
    log::info!("waiting for gdb on {}", addr);
    let (connection, peer) = listener.accept().expect("failed to accept debugger");
    log::info!("debugger connected from {}", peer);
    _ = connection.set_nodelay(true);
    let console = ConsoleRedirect::new(connection.try_clone().expect("failed to clone socket"));

    let mut ram = vec![0u32; RAM_WORDS];
    let mut memory = TargetMemory::new(RamBus::new(RAM_BASE, &mut ram), MemoryWindow::ESP8266);
    for (i, byte) in PROGRAM.iter().enumerate() {
        memory.write_byte(RAM_BASE + i as u32, *byte);
    }
    for i in 0..8 {
        memory.write_word(DATA_BASE + i * 4, 0x1111_1111 * i);
    }

    let token = SessionToken::take().expect("only one session per process");
    let session = DebugSession::new(
        token,
        connection,
        SimTarget::default(),
        memory,
        BreakpointManager::new(SimHardware::default()),
        StubConfig::default(),
    );

    let mut sim = Simulator {
        session,
        console,
        passes: 0,
    };
    if let Err(err) = sim.run() {
        log::info!("simulator stopped: {}", err);
    }
}

#[derive(Default)]
struct SimTarget {
    step_armed: bool,
}

impl Target for SimTarget {
    fn mask_interrupts(&mut self) {
        log::trace!("interrupts masked");
    }

    fn unmask_interrupts(&mut self) {
        log::trace!("interrupts unmasked");
    }

    fn disable_watchdog(&mut self) {}

    fn enable_watchdog(&mut self) {}

    fn feed_watchdog(&mut self) {
        std::thread::yield_now();
    }

    fn arm_single_step(&mut self) {
        self.step_armed = true;
    }

    // the simulated core starts out on a BREAK trap already
    fn request_break() {}
}

/// One IBREAK and one DBREAK comparator, like the real core.
#[derive(Default)]
struct SimHardware {
    ibreak: Option<u32>,
    dbreak: Option<(u32, u32, WatchKind)>,
}

impl SimHardware {
    fn watch_hit(&self, addr: u32, access: Access) -> bool {
        let Some((watched, mask, kind)) = self.dbreak else {
            return false;
        };
        let ignored = 0x3f & !mask;
        let bit = match access {
            Access::Load => WatchKind::Read.hardware_bits(),
            Access::Store => WatchKind::Write.hardware_bits(),
        };
        (addr | ignored) == (watched | ignored) && kind.hardware_bits() & bit != 0
    }
}

impl DebugHardware for SimHardware {
    fn claim_breakpoint(&mut self, addr: u32, _len: u32) -> bool {
        if self.ibreak.is_some() {
            return false;
        }
        self.ibreak = Some(addr);
        true
    }

    fn claim_watchpoint(&mut self, addr: u32, mask: u32, kind: WatchKind) -> bool {
        if self.dbreak.is_some() {
            return false;
        }
        self.dbreak = Some((addr, mask, kind));
        true
    }

    fn release_breakpoint(&mut self, addr: u32) -> bool {
        self.ibreak.take_if(|a| *a == addr).is_some()
    }

    fn release_watchpoint(&mut self, addr: u32) -> bool {
        self.dbreak.take_if(|w| w.0 == addr).is_some()
    }
}

struct Simulator<'a, C: Connection> {
    session: DebugSession<C, SimTarget, RamBus<'a>, SimHardware>,
    console: ConsoleRedirect<C>,
    passes: u32,
}

impl<C: Connection> Simulator<'_, C> {
    fn run(&mut self) -> Result<(), Box<dyn Error>> {
        let mut frame = self.restart();
        frame.reason = DebugCause::BREAK.bits();
        loop {
            frame = self.session.on_debug_trap(frame);
            frame = self.execute(frame)?;
        }
    }

    fn restart(&self) -> RawTrapFrame {
        let mut frame = RawTrapFrame {
            pc: RAM_BASE,
            ..Default::default()
        };
        frame.set_areg(1, RAM_BASE + (RAM_WORDS as u32) * 4);
        frame.set_areg(4, DATA_BASE);
        frame
    }

    /// Runs until something traps and returns the frame the trap saw.
    fn execute(&mut self, mut frame: RawTrapFrame) -> Result<RawTrapFrame, Box<dyn Error>> {
        let stepping = core::mem::take(&mut self.session.target_mut().step_armed);
        let mut first = true;
        loop {
            if !first && self.session.breakpoints().hardware().ibreak == Some(frame.pc) {
                frame.reason = DebugCause::IBREAK.bits();
                return Ok(frame);
            }

            let memory = self.session.memory_mut();
            let pc = frame.pc;
            let bytes = [
                memory.read_byte(pc),
                memory.read_byte(pc + 1),
                memory.read_byte(pc + 2),
            ];
            let Some(insn) = LoadStore::decode(bytes) else {
                self.passes += 1;
                writeln!(self.console, "pass {} done, a5 = {:#x}", self.passes, frame.areg(5))?;
                let mut frame = self.restart();
                frame.reason = DebugCause::BREAK.bits();
                return Ok(frame);
            };

            let addr = insn.effective_address(&frame);
            if self.session.breakpoints().hardware().watch_hit(addr, insn.access) {
                frame.reason = DebugCause::DBREAK.bits();
                return Ok(frame);
            }
            emulate_load_store(&mut frame, self.session.memory_mut())?;

            first = false;
            if stepping {
                frame.reason = DebugCause::ICOUNT.bits();
                return Ok(frame);
            }
        }
    }
}
