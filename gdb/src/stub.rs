use xtensa_lx106::{
    breakpoint::{BreakpointError, BreakpointManager, DebugHardware},
    memory::{TargetMemory, WordBus},
    registers::GdbRegister,
    RawTrapFrame, StopReason,
};

use crate::{
    connection::Connection,
    packets::{
        hex::{HexCursor, HexError},
        incoming::{BreakpointSpec, Command, CommandParseError, ZType},
        response::ResponseWriter,
    },
    signal::Signal,
};

pub const SUPPORTED_FEATURES: &str = "swbreak+;hwbreak+;PacketSize=100";
pub const VCONT_ACTIONS: &str = "vCont;c;s";

#[derive(Debug, thiserror::Error)]
pub enum GdbError<E> {
    #[error("failed to read from the debugger: {0:?}")]
    ConnectionRead(E),
    #[error("failed to write to the debugger: {0:?}")]
    ConnectionWrite(E),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Failures of a single command. None of them end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command")]
    UnknownCommand,
    #[error("unsupported query")]
    UnknownQuery,
    #[error("software breakpoints are left to the debugger")]
    SoftwareBreakpoint,
    #[error("malformed command: {0}")]
    Malformed(#[from] CommandParseError),
    #[error(transparent)]
    Breakpoint(#[from] BreakpointError),
    #[error("no register number {0}")]
    InvalidRegister(u32),
}

impl CommandError {
    /// Whether GDB gets `E01` rather than the empty "not supported" reply.
    pub fn is_error_reply(&self) -> bool {
        matches!(self, CommandError::Breakpoint(_) | CommandError::InvalidRegister(_))
    }
}

/// What the session does after a packet was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stay,
    Continue,
    Step,
}

/// Everything a command may look at or modify while the program is stopped.
pub struct Stub<'s, B: WordBus, H: DebugHardware, const BREAK: usize, const WATCH: usize> {
    pub frame: &'s mut RawTrapFrame,
    pub memory: &'s mut TargetMemory<B>,
    pub breakpoints: &'s mut BreakpointManager<H, BREAK, WATCH>,
    pub stop: StopReason,
}

pub fn write_stop_reply<C: Connection>(conn: &mut C, stop: StopReason) -> Result<(), C::Error> {
    let mut res = ResponseWriter::new(conn);
    res.write(b'T')?;
    res.write_hex(Signal::from_stop_reason(stop).as_protocol_u8())?;
    res.flush()
}

impl<B: WordBus, H: DebugHardware, const BREAK: usize, const WATCH: usize>
    Stub<'_, B, H, BREAK, WATCH>
{
    /// Handles one checked packet payload and sends its reply.
    pub fn handle_packet<C: Connection>(
        &mut self,
        conn: &mut C,
        payload: &[u8],
    ) -> Result<Action, GdbError<C::Error>> {
        let mut res = ResponseWriter::new(conn);
        let result = match Command::from_buf(payload) {
            Ok(command) => {
                log::debug!("<-- {:?}", command);
                self.handle_command(command, &mut res)
            }
            Err(err) => Err(CommandError::Malformed(err).into()),
        };

        match result {
            Ok(Action::Stay) => {
                res.flush().map_err(GdbError::ConnectionWrite)?;
                Ok(Action::Stay)
            }
            Ok(action) => {
                if res.is_started() {
                    res.flush().map_err(GdbError::ConnectionWrite)?;
                }
                Ok(action)
            }
            Err(GdbError::Command(err)) => {
                log::debug!("command rejected: {}", err);
                if err.is_error_reply() {
                    res.write_str("E01").map_err(GdbError::ConnectionWrite)?;
                }
                res.flush().map_err(GdbError::ConnectionWrite)?;
                Ok(Action::Stay)
            }
            Err(err) => Err(err),
        }
    }

    fn handle_command<C: Connection>(
        &mut self,
        command: Command<'_>,
        res: &mut ResponseWriter<C>,
    ) -> Result<Action, GdbError<C::Error>> {
        match command {
            Command::ExceptionReason => {
                res.write(b'T').map_err(GdbError::ConnectionWrite)?;
                res.write_hex(Signal::from_stop_reason(self.stop).as_protocol_u8())
                    .map_err(GdbError::ConnectionWrite)?;
            }

            Command::ReadRegisters => {
                for value in self.frame.wire_registers() {
                    res.write_hex_bits(value, 32)
                        .map_err(GdbError::ConnectionWrite)?;
                }
            }
            Command::WriteRegisters(values) => {
                self.frame.set_wire_registers(&values);
                res.write_str("OK").map_err(GdbError::ConnectionWrite)?;
            }
            Command::ReadRegister(n) => {
                let reg = GdbRegister::from_index(n as usize).ok_or(CommandError::InvalidRegister(n))?;
                res.write_hex_bits(self.frame.gdb_register(reg).swap_bytes(), 32)
                    .map_err(GdbError::ConnectionWrite)?;
            }
            Command::WriteRegister(n, value) => {
                let reg = GdbRegister::from_index(n as usize).ok_or(CommandError::InvalidRegister(n))?;
                self.frame.set_gdb_register(reg, value.swap_bytes());
                res.write_str("OK").map_err(GdbError::ConnectionWrite)?;
            }

            Command::ReadMemory(addr, len) => {
                for i in 0..len {
                    let byte = self.memory.read_byte(addr.wrapping_add(i));
                    res.write_hex(byte).map_err(GdbError::ConnectionWrite)?;
                }
            }
            Command::WriteMemory { addr, data } => {
                let mut cur = HexCursor::new(data);
                let mut offset = 0u32;
                while !cur.is_empty() {
                    let byte = cur.fixed(8).map_err(malformed)?;
                    self.memory.write_byte(addr.wrapping_add(offset), byte as u8);
                    offset += 1;
                }
                res.write_str("OK").map_err(GdbError::ConnectionWrite)?;
            }

            Command::ContinueAt(addr) => {
                self.resume_at(addr);
                return Ok(Action::Continue);
            }
            Command::StepAt(addr) => {
                self.resume_at(addr);
                return Ok(Action::Step);
            }
            Command::vContSupported => {
                res.write_str(VCONT_ACTIONS).map_err(GdbError::ConnectionWrite)?;
            }
            Command::Detach => {
                log::info!("debugger detached");
                res.write_str("OK").map_err(GdbError::ConnectionWrite)?;
                return Ok(Action::Continue);
            }

            Command::qSupported => {
                res.write_str(SUPPORTED_FEATURES)
                    .map_err(GdbError::ConnectionWrite)?;
            }
            Command::Query(query) => {
                log::debug!("unsupported query {:?}", core::str::from_utf8(query));
                return Err(CommandError::UnknownQuery.into());
            }

            Command::InsertBreakpoint(spec) => {
                self.insert(spec)?;
                res.write_str("OK").map_err(GdbError::ConnectionWrite)?;
            }
            Command::RemoveBreakpoint(spec) => {
                self.remove(spec)?;
                res.write_str("OK").map_err(GdbError::ConnectionWrite)?;
            }

            Command::Unknown(payload) => {
                log::debug!("unknown command {:?}", core::str::from_utf8(payload));
                return Err(CommandError::UnknownCommand.into());
            }
        }
        Ok(Action::Stay)
    }

    fn resume_at(&mut self, addr: Option<u32>) {
        if let Some(addr) = addr {
            self.frame.pc = addr;
        }
    }

    /// Software breakpoints are refused, GDB then places them itself.
    fn insert(&mut self, spec: BreakpointSpec) -> Result<(), CommandError> {
        match spec.z_type {
            ZType::Software => return Err(CommandError::SoftwareBreakpoint),
            ZType::Hardware => self.breakpoints.set_breakpoint(spec.addr, spec.kind)?,
            ZType::Watch(kind) => self.breakpoints.set_watchpoint(spec.addr, spec.kind, kind)?,
        }
        Ok(())
    }

    fn remove(&mut self, spec: BreakpointSpec) -> Result<(), CommandError> {
        match spec.z_type {
            ZType::Software => return Err(CommandError::SoftwareBreakpoint),
            ZType::Hardware => self.breakpoints.del_breakpoint(spec.addr)?,
            ZType::Watch(_) => self.breakpoints.del_watchpoint(spec.addr)?,
        }
        Ok(())
    }
}

fn malformed(err: HexError) -> CommandError {
    CommandError::Malformed(CommandParseError::Hex(err))
}
