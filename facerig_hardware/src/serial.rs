//! Serial transport to the servo controller board.

use std::io::{Read, Write};
use std::time::Duration;

use facerig_traits::Link;
use serialport::{ClearBuffer, SerialPort};

use crate::error::{LinkError, Result};
use crate::util::{take_line, wait_for_line};

/// Per-read blocking budget; kept short so `read_line` honours its own window.
const READ_SLICE: Duration = Duration::from_millis(10);

pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
    buf: Vec<u8>,
}

impl SerialLink {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| LinkError::Open(format!("{path}: {e}")))?;
        tracing::info!(port = path, baud, "serial link opened");
        Ok(Self {
            port,
            name: path.to_string(),
            buf: Vec::with_capacity(256),
        })
    }

    fn poll_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = take_line(&mut self.buf) {
            return Ok(Some(line));
        }
        let mut chunk = [0u8; 256];
        match self.port.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(LinkError::Io(e)),
        }
        Ok(take_line(&mut self.buf))
    }
}

impl Link for SerialLink {
    fn write(&mut self, frame: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.port.write_all(frame).map_err(LinkError::Io)?;
        self.port.flush().map_err(LinkError::Io)?;
        Ok(())
    }

    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        match wait_for_line(|| self.poll_line(), timeout, Duration::ZERO) {
            Ok(line) => {
                tracing::trace!(line = %line, "serial rx");
                Ok(Some(line))
            }
            Err(LinkError::Timeout) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    fn drain(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.buf.clear();
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| LinkError::Serial(e.to_string()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Names of serial ports visible to the OS.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| LinkError::Serial(e.to_string()))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
