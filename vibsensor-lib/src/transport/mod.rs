//! Byte-stream transport driven by the protocol layer.

#[cfg(test)]
pub mod mock;

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::debug;
use serialport::SerialPort;

/// Duplex byte stream with a configurable read timeout.
///
/// Responses are delimited only by their expected length, so a transport
/// must never be shared by two exchanges at once. The stream is closed when
/// the value is dropped.
pub trait Transport: Send {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Reads up to `count` bytes, returning fewer if the timeout elapses
    /// first. Never blocks past the configured timeout.
    fn read(&mut self, count: usize) -> io::Result<Vec<u8>>;

    /// Number of received bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    fn timeout(&self) -> Duration;
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn new(mut port: Box<dyn SerialPort>, timeout: Duration) -> io::Result<Self> {
        port.set_timeout(timeout)?;
        Ok(Self { port, timeout })
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        let mut filled = 0;
        let deadline = Instant::now() + self.timeout;

        while filled < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port.set_timeout(remaining)?;

            match self.port.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled < count {
            debug!("read timed out: {}/{} bytes", filled, count);
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
