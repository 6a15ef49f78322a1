//! Test and helper doubles for facerig_core.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use facerig_traits::{Clock, Link};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Write(String),
    /// A read that returned a line (`Some`) or came back empty (`None`).
    Read(Option<String>),
    Drain,
}

/// Wraps a link and timestamps every call against `clock`.
///
/// Clones share the event log, so a test can keep one handle while the rig
/// owns the other.
#[derive(Clone)]
pub struct RecordingLink<L, C> {
    inner: L,
    clock: C,
    events: Arc<Mutex<Vec<(Instant, LinkEvent)>>>,
}

impl<L: Link, C: Clock> RecordingLink<L, C> {
    pub fn new(inner: L, clock: C) -> Self {
        Self {
            inner,
            clock,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<(Instant, LinkEvent)> {
        self.events.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Written frames with their timestamps.
    pub fn writes(&self) -> Vec<(Instant, String)> {
        self.events()
            .into_iter()
            .filter_map(|(t, e)| match e {
                LinkEvent::Write(f) => Some((t, f)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut v) = self.events.lock() {
            v.clear();
        }
    }

    fn record(&self, e: LinkEvent) {
        if let Ok(mut v) = self.events.lock() {
            v.push((self.clock.now(), e));
        }
    }
}

impl<L: Link, C: Clock> Link for RecordingLink<L, C> {
    fn write(&mut self, frame: &[u8]) -> Result<(), BoxError> {
        let text = String::from_utf8_lossy(frame).trim_end().to_string();
        self.record(LinkEvent::Write(text));
        self.inner.write(frame)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, BoxError> {
        let line = self.inner.read_line(timeout)?;
        self.record(LinkEvent::Read(line.clone()));
        Ok(line)
    }

    fn drain(&mut self) -> Result<(), BoxError> {
        self.record(LinkEvent::Drain);
        self.inner.drain()
    }

    fn describe(&self) -> String {
        format!("recording({})", self.inner.describe())
    }
}

/// A link whose writes always fail; useful for exercising connection loss.
pub struct DeadLink;

impl Link for DeadLink {
    fn write(&mut self, _frame: &[u8]) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "dead link")))
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>, BoxError> {
        Ok(None)
    }
}
