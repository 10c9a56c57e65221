/// Byte transport to the debugger, normally the UART the firmware logs to.
pub trait Connection {
    type Error: core::fmt::Debug;

    /// Returns immediately with `None` when no byte is pending.
    fn try_read(&mut self) -> Result<Option<u8>, Self::Error>;

    fn read(&mut self) -> Result<u8, Self::Error> {
        loop {
            if let Some(byte) = self.try_read()? {
                return Ok(byte);
            }
            core::hint::spin_loop();
        }
    }

    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        for b in buf {
            self.write(*b)?;
        }
        Ok(())
    }
    fn flush(&mut self) -> Result<(), Self::Error>;
}

#[cfg(feature = "std")]
impl Connection for std::net::TcpStream {
    type Error = std::io::Error;

    fn try_read(&mut self) -> Result<Option<u8>, Self::Error> {
        self.set_nonblocking(true)?;

        let mut buf = [0u8];
        match std::io::Read::read(self, &mut buf) {
            Ok(0) => Err(std::io::ErrorKind::UnexpectedEof.into()),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read(&mut self) -> Result<u8, Self::Error> {
        self.set_nonblocking(false)?;

        let mut buf = [0u8];
        std::io::Read::read_exact(self, &mut buf)?;
        Ok(buf[0])
    }

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.set_nonblocking(false)?;
        std::io::Write::write_all(self, &[byte])
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.set_nonblocking(false)?;
        std::io::Write::write_all(self, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(self)
    }
}
