//! Hex digits and byte stuffing as used inside RSP packets.

pub const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Prefix of an escaped byte.
pub const ESCAPE: u8 = b'}';
const ESCAPE_XOR: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("expected a hex digit, found {0:#04x}")]
    MalformedHex(u8),
    #[error("packet ended in the middle of a hex value")]
    UnexpectedEnd,
}

pub fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// `bits / 4` lowercase hex digits of `value`, most significant first.
pub fn hex_digits(value: u32, bits: u32) -> impl Iterator<Item = u8> {
    (0..bits / 4)
        .rev()
        .map(move |i| HEX_CHARS[((value >> (i * 4)) & 0xf) as usize])
}

pub fn needs_escape(byte: u8) -> bool {
    matches!(byte, b'#' | b'$' | b'}' | b'*')
}

/// The byte that follows [`ESCAPE`] on the wire.
pub fn escape(byte: u8) -> u8 {
    byte ^ ESCAPE_XOR
}

pub fn unescape(byte: u8) -> u8 {
    byte ^ ESCAPE_XOR
}

/// Reads hex values out of a packet payload. The end of the slice is the
/// end of the packet.
pub struct HexCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> HexCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Exactly `bits / 4` digits.
    pub fn fixed(&mut self, bits: u32) -> Result<u32, HexError> {
        let mut value = 0u32;
        for _ in 0..bits / 4 {
            let c = self.peek().ok_or(HexError::UnexpectedEnd)?;
            let digit = nibble(c).ok_or(HexError::MalformedHex(c))?;
            value = (value << 4) | digit as u32;
            self.pos += 1;
        }
        Ok(value)
    }

    /// As many digits as there are, stopping before the first non hex byte.
    pub fn variable(&mut self) -> Result<u32, HexError> {
        let mut value = 0u32;
        let mut count = 0;
        while let Some(digit) = self.peek().and_then(nibble) {
            if count == 8 {
                return Err(HexError::MalformedHex(self.buf[self.pos]));
            }
            value = (value << 4) | digit as u32;
            count += 1;
            self.pos += 1;
        }
        match (count, self.peek()) {
            (0, Some(c)) => Err(HexError::MalformedHex(c)),
            (0, None) => Err(HexError::UnexpectedEnd),
            _ => Ok(value),
        }
    }

    /// Consumes `sep` or fails.
    pub fn expect(&mut self, sep: u8) -> Result<(), HexError> {
        match self.peek() {
            Some(c) if c == sep => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(HexError::MalformedHex(c)),
            None => Err(HexError::UnexpectedEnd),
        }
    }
}
