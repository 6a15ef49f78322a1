pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

/// Ordered, newline-delimited byte stream to the servo controller.
///
/// Implementations are expected to be lossy-tolerant: a read that sees no
/// complete line before `timeout` returns `Ok(None)`, never blocks forever.
pub trait Link {
    /// Write one complete wire frame (including its trailing newline).
    fn write(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Read one line (without the line terminator), waiting at most `timeout`.
    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;

    /// Discard any bytes already buffered on the input side.
    fn drain(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Human-readable identifier (port name, "sim", ...).
    fn describe(&self) -> String {
        "link".to_string()
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn write(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write(frame)
    }

    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_line(timeout)
    }

    fn drain(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).drain()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
