use std::collections::VecDeque;

use esp_gdbstub::{
    connection::Connection,
    target::{Target, TrapHandler},
    DebugSession, SessionState, SessionToken, StubConfig,
};
use xtensa_lx106::{
    breakpoint::{BreakpointManager, DebugHardware, WatchKind},
    memory::{MemoryWindow, RamBus, TargetMemory},
    registers::GDB_REGISTER_COUNT,
    DebugCause, RawTrapFrame,
};

const RAM_BASE: u32 = 0x3ffe_8000;

#[derive(Debug)]
struct Exhausted;

struct ScriptedConnection {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl Connection for ScriptedConnection {
    type Error = Exhausted;

    fn try_read(&mut self) -> Result<Option<u8>, Self::Error> {
        self.input.pop_front().map(Some).ok_or(Exhausted)
    }

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTarget {
    masked: bool,
    watchdog_off: bool,
    steps: usize,
}

impl Target for RecordingTarget {
    fn mask_interrupts(&mut self) {
        self.masked = true;
    }
    fn unmask_interrupts(&mut self) {
        self.masked = false;
    }
    fn disable_watchdog(&mut self) {
        self.watchdog_off = true;
    }
    fn enable_watchdog(&mut self) {
        self.watchdog_off = false;
    }
    fn feed_watchdog(&mut self) {}
    fn arm_single_step(&mut self) {
        self.steps += 1;
    }
    fn request_break() {}
}

struct FakeDebugHardware {
    pool: usize,
    claimed: Vec<(u32, Option<WatchKind>)>,
}

impl FakeDebugHardware {
    fn with_pool(pool: usize) -> Self {
        Self {
            pool,
            claimed: Vec::new(),
        }
    }

    fn claim(&mut self, addr: u32, kind: Option<WatchKind>) -> bool {
        if self.claimed.len() == self.pool {
            return false;
        }
        self.claimed.push((addr, kind));
        true
    }

    fn release(&mut self, addr: u32) -> bool {
        let before = self.claimed.len();
        self.claimed.retain(|c| c.0 != addr);
        self.claimed.len() != before
    }
}

impl DebugHardware for FakeDebugHardware {
    fn claim_breakpoint(&mut self, addr: u32, _len: u32) -> bool {
        self.claim(addr, None)
    }
    fn claim_watchpoint(&mut self, addr: u32, _mask: u32, kind: WatchKind) -> bool {
        self.claim(addr, Some(kind))
    }
    fn release_breakpoint(&mut self, addr: u32) -> bool {
        self.release(addr)
    }
    fn release_watchpoint(&mut self, addr: u32) -> bool {
        self.release(addr)
    }
}

type Session<'a> = DebugSession<ScriptedConnection, RecordingTarget, RamBus<'a>, FakeDebugHardware>;

fn packet(payload: &str) -> Vec<u8> {
    let sum = payload.bytes().fold(0u8, |a, b| a.wrapping_add(b));
    format!("${}#{:02x}", payload, sum).into_bytes()
}

fn script(payloads: &[&str]) -> Vec<u8> {
    payloads.iter().flat_map(|p| packet(p)).collect()
}

fn session<'a>(ram: &'a mut [u32], input: Vec<u8>) -> Session<'a> {
    DebugSession::new(
        unsafe { SessionToken::steal() },
        ScriptedConnection {
            input: input.into(),
            output: Vec::new(),
        },
        RecordingTarget::default(),
        TargetMemory::new(RamBus::new(RAM_BASE, ram), MemoryWindow::ESP8266),
        BreakpointManager::new(FakeDebugHardware::with_pool(1)),
        StubConfig::default(),
    )
}

/// Splits the stub output into acks and packet payloads, checking every checksum.
fn replies(out: &[u8]) -> Vec<String> {
    let mut res = Vec::new();
    let mut i = 0;
    while i < out.len() {
        match out[i] {
            b'+' | b'-' => {
                res.push((out[i] as char).to_string());
                i += 1;
            }
            b'$' => {
                let end = i + out[i..].iter().position(|b| *b == b'#').unwrap();
                let body = &out[i + 1..end];
                let sum = body.iter().fold(0u8, |a, b| a.wrapping_add(*b));
                let sent = std::str::from_utf8(&out[end + 1..end + 3]).unwrap();
                assert_eq!(u8::from_str_radix(sent, 16).unwrap(), sum);
                res.push(String::from_utf8(body.to_vec()).unwrap());
                i = end + 3;
            }
            other => panic!("unexpected byte {:#04x} in output", other),
        }
    }
    res
}

fn debug_trap(pc: u32, cause: DebugCause) -> RawTrapFrame {
    RawTrapFrame {
        pc,
        reason: cause.bits(),
        ..Default::default()
    }
}

#[test]
fn exception_stop_reports_segv() {
    let mut ram = [0u32; 16];
    let mut s = session(&mut ram, b"$?#3f$c#63".to_vec());
    let frame = RawTrapFrame {
        pc: 0x4010_0000,
        reason: 2,
        ..Default::default()
    };
    s.on_exception(frame);
    assert_eq!(replies(&s.connection().output), ["T0b", "+", "T0b", "+"]);
    assert_eq!(s.state(), SessionState::Idle);
    assert!(!s.target().masked);
    assert!(!s.target().watchdog_off);
}

#[test]
fn debug_trap_reports_sigtrap() {
    let mut ram = [0u32; 16];
    let mut s = session(&mut ram, script(&["?", "c"]));
    s.on_debug_trap(debug_trap(0x4010_0000, DebugCause::IBREAK));
    assert_eq!(replies(&s.connection().output), ["T05", "+", "T05", "+"]);
}

#[test]
fn corrupted_packet_is_nacked_and_not_dispatched() {
    let mut ram = [0u32; 16];
    let mut input = b"$m3ffe8000,4#00".to_vec();
    input.extend(packet("c"));
    let mut s = session(&mut ram, input);
    s.on_debug_trap(debug_trap(0x4010_0000, DebugCause::BREAK));
    assert_eq!(replies(&s.connection().output), ["T05", "-", "+"]);
}

#[test]
fn register_write_then_read() {
    let values: Vec<u32> = (0..GDB_REGISTER_COUNT as u32)
        .map(|i| if i == 20 { 0 } else { 0x0100_0000 * (i + 1) + i })
        .collect();
    let blob: String = values.iter().map(|v| format!("{:08x}", v)).collect();

    let mut ram = [0u32; 16];
    let g = format!("G{}", blob);
    let mut s = session(&mut ram, script(&[g.as_str(), "g", "c"]));
    let out = s.on_debug_trap(debug_trap(0x4010_0000, DebugCause::BREAK));

    assert_eq!(replies(&s.connection().output), ["T05", "+", "OK", "+", blob.as_str(), "+"]);
    // wire values are byte swapped, so a0 = 0x00000001 arrives as 01000000
    assert_eq!(out.a0, 0x0000_0001);
    assert_eq!(out.pc, values[16].swap_bytes());
    assert_eq!(out.ps, values[21].swap_bytes());
}

#[test]
fn memory_write_then_read() {
    let mut ram = [0u32; 16];
    let mut s = session(&mut ram, script(&["M3ffe8006,3:a1b2c3", "m3ffe8004,6", "c"]));
    s.on_debug_trap(debug_trap(0x4010_0000, DebugCause::BREAK));
    assert_eq!(
        replies(&s.connection().output),
        ["T05", "+", "OK", "+", "0000a1b2c300", "+"]
    );
    assert_eq!(s.memory_mut().read_word(RAM_BASE + 4), 0xb2a1_0000);
    assert_eq!(s.memory_mut().read_word(RAM_BASE + 8), 0x0000_00c3);
}

#[test]
fn read_outside_the_window_is_ff() {
    let mut ram = [0u32; 16];
    let mut s = session(&mut ram, script(&["m60000000,4", "M10000000,1:00", "c"]));
    s.on_debug_trap(debug_trap(0x4010_0000, DebugCause::BREAK));
    assert_eq!(
        replies(&s.connection().output),
        ["T05", "+", "ffffffff", "+", "OK", "+"]
    );
}

#[test]
fn watchpoint_lifecycle() {
    let mut ram = [0u32; 16];
    let mut s = session(
        &mut ram,
        script(&[
            "Z2,3ffe8010,3",
            "Z2,3ffe8010,4",
            "z2,3ffe8010,4",
            "z2,3ffe8010,4",
            "c",
        ]),
    );
    s.on_debug_trap(debug_trap(0x4010_0000, DebugCause::BREAK));
    assert_eq!(
        replies(&s.connection().output),
        ["T05", "+", "E01", "+", "OK", "+", "OK", "+", "E01", "+"]
    );
    assert!(s.breakpoints().hardware().claimed.is_empty());
    assert_eq!(s.breakpoints().watchpoints().count(), 0);
}

#[test]
fn watchpoint_stop_emulates_narrow_load_once() {
    // l32i.n a3, a4, 4 at RAM_BASE, a4 points at RAM_BASE + 0x10
    let mut ram = [0u32; 16];
    ram[0] = 0x1438;
    ram[5] = 0xcafe_f00d;
    let mut s = session(&mut ram, script(&["c"]));
    let mut frame = debug_trap(RAM_BASE, DebugCause::DBREAK);
    frame.set_areg(4, RAM_BASE + 0x10);
    let out = s.on_debug_trap(frame);
    assert_eq!(out.pc, RAM_BASE + 2);
    assert_eq!(out.areg(3), 0xcafe_f00d);
}

#[test]
fn watchpoint_stop_emulates_wide_store_once() {
    // s32i a3, a4, 8 at RAM_BASE
    let mut ram = [0u32; 16];
    ram[0] = 0x02_6432;
    let mut s = session(&mut ram, script(&["c"]));
    let mut frame = debug_trap(RAM_BASE, DebugCause::DBREAK);
    frame.set_areg(3, 0x1234_5678);
    frame.set_areg(4, RAM_BASE + 0x20);
    let out = s.on_debug_trap(frame);
    assert_eq!(out.pc, RAM_BASE + 3);
    assert_eq!(s.memory_mut().read_word(RAM_BASE + 0x28), 0x1234_5678);
}

#[test]
fn step_after_watchpoint_arms_icount() {
    let mut ram = [0u32; 16];
    ram[0] = 0x1438;
    let mut s = session(&mut ram, script(&["vCont;s:1"]));
    let out = s.on_debug_trap(debug_trap(RAM_BASE, DebugCause::DBREAK));
    assert_eq!(out.pc, RAM_BASE + 2);
    assert_eq!(s.target().steps, 1);
}

#[test]
fn capabilities_and_unknown_packets() {
    let mut ram = [0u32; 16];
    let mut s = session(
        &mut ram,
        script(&["qSupported:multiprocess+;swbreak+", "vMustReplyEmpty", "qC", "D"]),
    );
    s.on_debug_trap(debug_trap(0x4010_0000, DebugCause::BREAK));
    assert_eq!(
        replies(&s.connection().output),
        [
            "T05",
            "+",
            "swbreak+;hwbreak+;PacketSize=100",
            "+",
            "",
            "+",
            "",
            "+",
            "OK"
        ]
    );
}
