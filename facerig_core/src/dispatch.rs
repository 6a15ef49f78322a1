//! Single writer for the link: sends frames, reads acknowledgments and
//! applies the group-to-singles fallback.
//!
//! Reply classification inside an acknowledgment window:
//! - a line starting with `ERROR` rejects the command;
//! - a line starting with `OK` confirms it;
//! - other lines are board chatter, logged and skipped;
//! - no line before the window closes is a soft timeout (`Delivery::Unconfirmed`).
//!
//! A write failure detaches the link so later sends fail fast with
//! `RigError::TransportUnavailable` until a new link is attached.

use std::sync::Arc;
use std::time::Duration;

use facerig_traits::{Clock, Link};

use crate::command::Command;
use crate::error::RigError;
use crate::hw_error::map_link_error;

/// How far a single frame got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written; no acknowledgment requested.
    Sent,
    /// Device answered `OK`.
    Confirmed,
    /// Acknowledgment requested but none arrived in the window.
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendReport {
    Delivered(Delivery),
    /// The group form was rejected; every equivalent single went through.
    Fallback {
        reason: RigError,
        singles: Vec<Delivery>,
    },
    /// Some of the fallback singles were rejected by the device.
    Partial {
        reason: RigError,
        failed: Vec<(u8, RigError)>,
    },
}

impl SendReport {
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }
}

pub struct Dispatcher {
    link: Option<Box<dyn Link + Send>>,
    ack_timeout: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("link", &self.link.as_ref().map(|l| l.describe()))
            .field("ack_timeout", &self.ack_timeout)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(ack_timeout: Duration, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            link: None,
            ack_timeout,
            clock,
        }
    }

    pub fn attach(&mut self, link: Box<dyn Link + Send>) {
        tracing::info!(link = %link.describe(), "link attached");
        self.link = Some(link);
    }

    pub fn is_attached(&self) -> bool {
        self.link.is_some()
    }

    pub fn describe(&self) -> Option<String> {
        self.link.as_ref().map(|l| l.describe())
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    fn link(&mut self) -> Result<&mut Box<dyn Link + Send>, RigError> {
        self.link.as_mut().ok_or(RigError::TransportUnavailable)
    }

    fn lose_link(&mut self, err: RigError) -> RigError {
        if err.is_link_loss() {
            tracing::error!(error = %err, "link lost, detaching");
            self.link = None;
        }
        err
    }

    /// Discard whatever the board has already sent.
    pub fn drain(&mut self) -> Result<(), RigError> {
        let res = self.link()?.drain();
        res.map_err(|e| {
            let err = map_link_error("drain", e.as_ref());
            self.lose_link(err)
        })
    }

    fn write(&mut self, frame: &str, bytes: &[u8]) -> Result<(), RigError> {
        let res = self.link()?.write(bytes);
        match res {
            Ok(()) => {
                tracing::debug!(frame, "tx");
                Ok(())
            }
            Err(e) => {
                let err = match map_link_error(frame, e.as_ref()) {
                    RigError::AckTimeout(_) => RigError::ConnectionLost(format!("write of {frame} timed out")),
                    other => other,
                };
                Err(self.lose_link(err))
            }
        }
    }

    fn read_line(&mut self, frame: &str, window: Duration) -> Result<Option<String>, RigError> {
        let res = self.link()?.read_line(window);
        match res {
            Ok(line) => Ok(line),
            Err(e) => match map_link_error(frame, e.as_ref()) {
                RigError::AckTimeout(_) => Ok(None),
                other => Err(self.lose_link(other)),
            },
        }
    }

    fn await_ack(&mut self, frame: &str, window: Duration) -> Result<Delivery, RigError> {
        let deadline = self.clock.now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                break;
            }
            match self.read_line(frame, remaining)? {
                Some(line) if line.starts_with("ERROR") => {
                    tracing::warn!(frame, reply = %line, "device rejected command");
                    return Err(RigError::DeviceRejected {
                        frame: frame.to_string(),
                        reply: line,
                    });
                }
                Some(line) if line.starts_with("OK") => {
                    tracing::trace!(frame, reply = %line, "ack");
                    return Ok(Delivery::Confirmed);
                }
                Some(line) => tracing::debug!(frame, reply = %line, "device chatter"),
                None => break,
            }
        }
        tracing::debug!(frame, window_ms = window.as_millis(), "no acknowledgment in window");
        Ok(Delivery::Unconfirmed)
    }

    /// Write one command. With `confirm`, wait up to that long for the reply.
    ///
    /// Confirmed sends drain stale input first so replies to earlier
    /// unconfirmed frames are not mistaken for this one's.
    pub fn send(&mut self, cmd: &Command, confirm: Option<Duration>) -> Result<Delivery, RigError> {
        let frame = cmd.to_string();
        if confirm.is_some() {
            self.drain()?;
        }
        self.write(&frame, &cmd.encode())?;
        match confirm {
            Some(window) => self.await_ack(&frame, window),
            None => Ok(Delivery::Sent),
        }
    }

    /// Send a group command, falling back to `singles` (in order) when the
    /// device rejects the group form.
    ///
    /// The group command always gets an acknowledgment window; fallback
    /// singles wait only when `confirm_singles` is set.
    pub fn send_group(
        &mut self,
        group: &Command,
        singles: &[(u8, u8)],
        confirm_singles: Option<Duration>,
    ) -> Result<SendReport, RigError> {
        let reason = match self.send(group, Some(self.ack_timeout)) {
            Ok(d) => return Ok(SendReport::Delivered(d)),
            Err(RigError::DeviceRejected { reply, .. }) => RigError::ProtocolMismatch(reply),
            Err(e) => return Err(e),
        };
        tracing::warn!(frame = %group, "group form rejected, sending singles");

        let mut delivered = Vec::with_capacity(singles.len());
        let mut failed = Vec::new();
        for &(channel, angle) in singles {
            match self.send(&Command::Single { channel, angle }, confirm_singles) {
                Ok(d) => delivered.push(d),
                Err(e @ RigError::DeviceRejected { .. }) => failed.push((channel, e)),
                Err(e) => return Err(e),
            }
        }
        if failed.is_empty() {
            Ok(SendReport::Fallback {
                reason,
                singles: delivered,
            })
        } else {
            Ok(SendReport::Partial { reason, failed })
        }
    }

    /// Write `cmd` and collect every reply line that arrives within `window`.
    pub fn query(&mut self, cmd: &Command, window: Duration) -> Result<Vec<String>, RigError> {
        let frame = cmd.to_string();
        self.drain()?;
        self.write(&frame, &cmd.encode())?;
        let deadline = self.clock.now() + window;
        let mut lines = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                break;
            }
            match self.read_line(&frame, remaining)? {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        Ok(lines)
    }
}
