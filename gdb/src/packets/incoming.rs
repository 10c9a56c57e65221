use xtensa_lx106::breakpoint::WatchKind;
use xtensa_lx106::registers::GDB_REGISTER_COUNT;

use super::hex::{nibble, HexCursor, HexError};

/// Type field of a `Z`/`z` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZType {
    Software,
    Hardware,
    Watch(WatchKind),
}

impl ZType {
    fn from_field(z_type: u32) -> Option<Self> {
        match z_type {
            0 => Some(ZType::Software),
            1 => Some(ZType::Hardware),
            2..=4 => WatchKind::from_z_type(z_type as u8).map(ZType::Watch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub z_type: ZType,
    pub addr: u32,
    /// Length in bytes for watchpoints, instruction size for breakpoints.
    pub kind: u32,
}

#[derive(Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Command<'a> {
    ContinueAt(Option<u32>),
    StepAt(Option<u32>),
    vContSupported,
    Detach,

    ReadRegisters,
    /// Values as they appeared on the wire, still byte swapped.
    WriteRegisters([u32; GDB_REGISTER_COUNT]),
    ReadRegister(u32),
    WriteRegister(u32, u32),

    ReadMemory(u32, u32),
    /// `data` holds `2 * len` hex digits, already checked.
    WriteMemory { addr: u32, data: &'a [u8] },

    ExceptionReason,

    qSupported,
    Query(&'a [u8]),

    InsertBreakpoint(BreakpointSpec),
    RemoveBreakpoint(BreakpointSpec),

    Unknown(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error(transparent)]
    Hex(#[from] HexError),
    #[error("unexpected bytes after the last argument")]
    TrailingData,
    #[error("data length does not match the declared length")]
    LengthMismatch,
    #[error("unsupported breakpoint type {0}")]
    UnsupportedType(u32),
}

fn finish(cur: &HexCursor<'_>) -> Result<(), CommandParseError> {
    if cur.is_empty() {
        Ok(())
    } else {
        Err(CommandParseError::TrailingData)
    }
}

fn optional_addr(args: &[u8]) -> Result<Option<u32>, CommandParseError> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut cur = HexCursor::new(args);
    let addr = cur.variable()?;
    finish(&cur)?;
    Ok(Some(addr))
}

fn addr_len(cur: &mut HexCursor<'_>) -> Result<(u32, u32), CommandParseError> {
    let addr = cur.variable()?;
    cur.expect(b',')?;
    let len = cur.variable()?;
    Ok((addr, len))
}

fn breakpoint(args: &[u8]) -> Result<BreakpointSpec, CommandParseError> {
    let mut cur = HexCursor::new(args);
    let z_type = cur.variable()?;
    let z_type = ZType::from_field(z_type).ok_or(CommandParseError::UnsupportedType(z_type))?;
    cur.expect(b',')?;
    let (addr, kind) = addr_len(&mut cur)?;
    // anything after the kind is a condition list, which is not evaluated
    Ok(BreakpointSpec { z_type, addr, kind })
}

/// First action of a `vCont;` packet, thread ids are ignored.
fn vcont(args: &[u8]) -> Command<'_> {
    match args.first() {
        Some(b'c') | Some(b'C') => Command::ContinueAt(None),
        Some(b's') | Some(b'S') => Command::StepAt(None),
        _ => Command::Unknown(args),
    }
}

impl<'a> Command<'a> {
    pub fn from_buf(buf: &'a [u8]) -> Result<Self, CommandParseError> {
        macro_rules! create_command {
            ($command:ident) => {
                Command::Unknown($command)
            };
            ($command:ident $s:literal => $b:expr, $($tt:tt)*) => {
                if $command == $s {
                    $b
                } else {
                    create_command!($command $($tt)*)
                }
            };
            ($command:ident $s:literal = $a:ident => $b:expr, $($tt:tt)*) => {
                if let Some($a) = $command.strip_prefix($s) {
                    $b
                } else {
                    create_command!($command $($tt)*)
                }
            };
        }

        let command = buf;

        Ok(create_command!(command
            b"?" => Command::ExceptionReason,

            b"g" => Command::ReadRegisters,
            b"G" = args => {
                if args.len() != GDB_REGISTER_COUNT * 8 {
                    return Err(CommandParseError::LengthMismatch);
                }
                let mut cur = HexCursor::new(args);
                let mut values = [0u32; GDB_REGISTER_COUNT];
                for value in values.iter_mut() {
                    *value = cur.fixed(32)?;
                }
                Command::WriteRegisters(values)
            },
            b"p" = args => {
                let mut cur = HexCursor::new(args);
                let reg = cur.variable()?;
                finish(&cur)?;
                Command::ReadRegister(reg)
            },
            b"P" = args => {
                let mut cur = HexCursor::new(args);
                let reg = cur.variable()?;
                cur.expect(b'=')?;
                let value = cur.fixed(32)?;
                finish(&cur)?;
                Command::WriteRegister(reg, value)
            },

            b"m" = args => {
                let mut cur = HexCursor::new(args);
                let (addr, len) = addr_len(&mut cur)?;
                finish(&cur)?;
                Command::ReadMemory(addr, len)
            },
            b"M" = args => {
                let mut cur = HexCursor::new(args);
                let (addr, len) = addr_len(&mut cur)?;
                cur.expect(b':')?;
                let data = cur.remaining();
                if data.len() != len as usize * 2 {
                    return Err(CommandParseError::LengthMismatch);
                }
                if let Some(&bad) = data.iter().find(|c| nibble(**c).is_none()) {
                    return Err(HexError::MalformedHex(bad).into());
                }
                Command::WriteMemory { addr, data }
            },

            b"c" = args => Command::ContinueAt(optional_addr(args)?),
            b"s" = args => Command::StepAt(optional_addr(args)?),
            b"vCont?" => Command::vContSupported,
            b"vCont;" = args => vcont(args),
            b"D" = _args => Command::Detach,

            b"Z" = args => Command::InsertBreakpoint(breakpoint(args)?),
            b"z" = args => Command::RemoveBreakpoint(breakpoint(args)?),

            b"qSupported" = _args => Command::qSupported,
            b"q" = _args => Command::Query(command),
        ))
    }
}
