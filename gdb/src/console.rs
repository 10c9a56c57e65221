//! Program output forwarded to the debugger console as `O` packets.

use core::fmt;

use crate::connection::Connection;
use crate::packets::response::ResponseWriter;

pub const CONSOLE_BUFFER: usize = 32;

/// Line buffered console that hands its output to GDB instead of the raw UART.
///
/// Output is flushed on every newline and whenever the buffer fills up.
pub struct ConsoleRedirect<C: Connection> {
    conn: C,
    buf: [u8; CONSOLE_BUFFER],
    len: usize,
}

impl<C: Connection> ConsoleRedirect<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            buf: [0; CONSOLE_BUFFER],
            len: 0,
        }
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    pub fn putchar(&mut self, c: u8) -> Result<(), C::Error> {
        self.buf[self.len] = c;
        self.len += 1;
        if c == b'\n' || self.len == CONSOLE_BUFFER {
            self.flush()?;
        }
        Ok(())
    }

    /// Sends whatever is buffered. The buffer is emptied even when sending
    /// fails, that output is lost.
    pub fn flush(&mut self) -> Result<(), C::Error> {
        let len = core::mem::take(&mut self.len);
        if len == 0 {
            return Ok(());
        }
        let mut res = ResponseWriter::new(&mut self.conn);
        res.write(b'O')?;
        res.write_hex_buff(&self.buf[..len])?;
        res.flush()
    }
}

impl<C: Connection> fmt::Write for ConsoleRedirect<C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.putchar(b).map_err(|e| {
                log::error!("console output lost: {:?}", e);
                fmt::Error
            })?;
        }
        Ok(())
    }
}
