use crate::connection::Connection;

use super::hex::{escape, hex_digits, needs_escape, ESCAPE};

/// Streams one reply packet to the connection.
///
/// Nothing is sent until the first byte is written, so a writer that is
/// dropped without [`ResponseWriter::flush`] leaves the wire untouched.
pub struct ResponseWriter<'a, C: Connection> {
    conn: &'a mut C,

    started: bool,
    check_sum: u8,
}

impl<'a, C: Connection> ResponseWriter<'a, C> {
    pub fn new(conn: &'a mut C) -> Self {
        Self {
            conn,
            started: false,
            check_sum: 0,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn start(&mut self) -> Result<(), C::Error> {
        if !self.started {
            self.started = true;
            self.conn.write(b'$')?;
        }
        Ok(())
    }

    fn raw(&mut self, byte: u8) -> Result<(), C::Error> {
        self.check_sum = self.check_sum.wrapping_add(byte);
        self.conn.write(byte)
    }

    pub fn write(&mut self, byte: u8) -> Result<(), C::Error> {
        self.start()?;
        if needs_escape(byte) {
            self.raw(ESCAPE)?;
            self.raw(escape(byte))
        } else {
            self.raw(byte)
        }
    }

    pub fn write_str(&mut self, str: &str) -> Result<(), C::Error> {
        for &b in str.as_bytes().iter() {
            self.write(b)?
        }
        Ok(())
    }

    pub fn write_hex(&mut self, byte: u8) -> Result<(), C::Error> {
        self.write_hex_bits(byte as u32, 8)
    }

    pub fn write_hex_bits(&mut self, value: u32, bits: u32) -> Result<(), C::Error> {
        for c in hex_digits(value, bits) {
            self.write(c)?;
        }
        Ok(())
    }

    pub fn write_hex_buff(&mut self, data: &[u8]) -> Result<(), C::Error> {
        for &b in data {
            self.write_hex(b)?;
        }
        Ok(())
    }

    /// Terminates the packet. An untouched writer sends the empty packet `$#00`.
    pub fn flush(mut self) -> Result<(), C::Error> {
        self.start()?;
        let checksum = self.check_sum;
        self.conn.write(b'#')?;
        for c in hex_digits(checksum as u32, 8) {
            self.conn.write(c)?;
        }
        self.conn.flush()?;
        log::trace!("--> #{:02x}", checksum);
        Ok(())
    }
}
