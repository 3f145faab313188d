//! Byte transport abstraction
//!
//! The connection writes commands on one handle and runs its reader loop on a
//! clone of it. Anything that can be read, written and cloned that way can
//! stand in for the serial port.

use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Abstraction over the link to the device
pub trait Transport: Read + Write + Send {
    /// Number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard any bytes waiting in the input buffer
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Open a second handle on the same link, for the reader loop
    fn try_clone(&self) -> io::Result<Box<dyn Transport>>;
}

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Wrap an opened serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        let port = self.port.try_clone().map_err(io::Error::other)?;
        Ok(Box::new(SerialTransport::new(port)))
    }
}
