use super::hex::{nibble, unescape, ESCAPE};
use super::PACKET_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet does not fit the receive buffer")]
    PacketTooLong,
    #[error("checksum mismatch: computed {computed:#04x}, received {received:?}")]
    ChecksumMismatch { computed: u8, received: Option<u8> },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A byte seen outside of any packet, e.g. an ack or a ctrl-c.
    OutOfBand(u8),
    /// Unescaped payload of a packet whose checksum matched.
    Packet(&'a [u8]),
    Rejected(PacketError),
}

/// Receive side packet framing, fed one wire byte at a time.
pub struct PacketStateMachine {
    buf: [u8; PACKET_SIZE],
    len: usize,
    checksum: u8,
    received: u8,
    state: PacketStateMachineStates,
}

impl Default for PacketStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketStateMachine {
    pub const fn new() -> Self {
        Self {
            buf: [0; PACKET_SIZE],
            len: 0,
            checksum: 0,
            received: 0,
            state: PacketStateMachineStates::Ready,
        }
    }

    pub fn reset(&mut self) {
        self.restart();
        self.state = PacketStateMachineStates::Ready;
    }

    fn restart(&mut self) {
        self.len = 0;
        self.checksum = 0;
    }

    fn push(&mut self, byte: u8) {
        if self.len == PACKET_SIZE {
            self.state = PacketStateMachineStates::Overflow;
        } else {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    pub fn incomming_data(&mut self, data: u8) -> Option<Frame<'_>> {
        use PacketStateMachineStates as State;
        match self.state {
            State::Ready => {
                if data != b'$' {
                    return Some(Frame::OutOfBand(data));
                }
                self.restart();
                self.state = State::Body;
            }
            State::Body => match data {
                b'#' => self.state = State::CheckSum1 { overflowed: false },
                b'$' => {
                    log::debug!("<-- packet restarted after {} bytes", self.len);
                    self.restart();
                }
                ESCAPE => {
                    self.checksum = self.checksum.wrapping_add(data);
                    self.state = State::Escape;
                }
                _ => {
                    self.checksum = self.checksum.wrapping_add(data);
                    self.push(data);
                }
            },
            State::Escape => {
                self.checksum = self.checksum.wrapping_add(data);
                self.state = State::Body;
                self.push(unescape(data));
            }
            State::Overflow => {
                if data == b'#' {
                    self.state = State::CheckSum1 { overflowed: true };
                }
            }
            State::CheckSum1 { overflowed } => {
                self.received = data;
                self.state = State::CheckSum2 { overflowed };
            }
            State::CheckSum2 { overflowed } => {
                self.state = State::Ready;
                if overflowed {
                    return Some(Frame::Rejected(PacketError::PacketTooLong));
                }
                let received = nibble(self.received)
                    .zip(nibble(data))
                    .map(|(hi, lo)| hi << 4 | lo);
                if received != Some(self.checksum) {
                    return Some(Frame::Rejected(PacketError::ChecksumMismatch {
                        computed: self.checksum,
                        received,
                    }));
                }
                let payload = &self.buf[..self.len];
                match core::str::from_utf8(payload) {
                    Ok(str) => log::trace!("<-- ${}", str),
                    Err(_) => log::trace!("<-- ${:02x?}", payload),
                }
                return Some(Frame::Packet(payload));
            }
        }
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PacketStateMachineStates {
    Ready,
    Body,
    Escape,
    Overflow,
    CheckSum1 { overflowed: bool },
    CheckSum2 { overflowed: bool },
}
