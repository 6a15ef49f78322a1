pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod util;

#[cfg(feature = "hardware")]
pub use serial::{SerialLink, list_ports};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use facerig_traits::Link;

use crate::error::LinkError;

const CHANNELS: usize = 16;

/// Shared record of every frame written to a [`SimulatedLink`], newline stripped.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<String>>>);

impl Transcript {
    pub fn frames(&self) -> Vec<String> {
        self.0.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut v) = self.0.lock() {
            v.clear();
        }
    }

    fn push(&self, frame: String) {
        if let Ok(mut v) = self.0.lock() {
            v.push(frame);
        }
    }
}

#[derive(Debug)]
struct SimState {
    angles: [u8; CHANNELS],
    mids: [u8; CHANNELS],
    batch_supported: bool,
    sync_supported: bool,
    silent: bool,
    closed: bool,
    replies: VecDeque<String>,
}

/// In-process stand-in for the servo controller board.
///
/// Understands the same line protocol as the firmware and answers with
/// `OK ...` / `ERROR ...` lines. Clones share state, so a test can keep a
/// handle to flip capabilities or inspect angles while the rig owns the link.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    state: Arc<Mutex<SimState>>,
    transcript: Transcript,
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLink {
    pub fn new() -> Self {
        SimulatedLink {
            state: Arc::new(Mutex::new(SimState {
                angles: [90; CHANNELS],
                mids: [90; CHANNELS],
                batch_supported: true,
                sync_supported: true,
                silent: false,
                closed: false,
                replies: VecDeque::new(),
            })),
            transcript: Transcript::default(),
        }
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Firmware builds without the `;` batch form answer batches with `ERROR`.
    pub fn set_batch_supported(&self, yes: bool) {
        self.with_state(|s| s.batch_supported = yes);
    }

    pub fn set_sync_supported(&self, yes: bool) {
        self.with_state(|s| s.sync_supported = yes);
    }

    /// Accept frames but never answer, as a board with a dead TX line would.
    pub fn set_silent(&self, yes: bool) {
        self.with_state(|s| s.silent = yes);
    }

    /// Simulate the cable being pulled: every later write fails.
    pub fn close(&self) {
        self.with_state(|s| s.closed = true);
    }

    /// Angles the board drives to on `RESET`.
    pub fn set_mids(&self, mids: [u8; CHANNELS]) {
        self.with_state(|s| s.mids = mids);
    }

    pub fn angles(&self) -> [u8; CHANNELS] {
        self.lock().map(|s| s.angles).unwrap_or([0; CHANNELS])
    }

    fn lock(&self) -> Option<MutexGuard<'_, SimState>> {
        self.state.lock().ok()
    }

    fn with_state(&self, f: impl FnOnce(&mut SimState)) {
        if let Some(mut s) = self.lock() {
            f(&mut s);
        }
    }
}

fn parse_pair(s: &str) -> Option<(usize, u8)> {
    let (id, angle) = s.split_once(',')?;
    let id: usize = id.trim().parse().ok()?;
    let angle: u8 = angle.trim().parse().ok()?;
    (id < CHANNELS && angle <= 180).then_some((id, angle))
}

impl SimState {
    fn respond(&mut self, frame: &str) -> Vec<String> {
        match frame {
            "RESET" => {
                self.angles = self.mids;
                return vec!["OK RESET".to_string()];
            }
            "STATUS" => {
                let joined = self
                    .angles
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                return vec![format!("STATUS {joined}")];
            }
            "HELP" => {
                return vec![
                    "COMMANDS:".to_string(),
                    "  S<id>,<angle>".to_string(),
                    "  S<id>,<angle>;<id>,<angle>...".to_string(),
                    "  JS<angle>".to_string(),
                    "  RESET | STATUS | HELP".to_string(),
                ];
            }
            _ => {}
        }

        if let Some(rest) = frame.strip_prefix("JS") {
            if !self.sync_supported {
                return vec!["ERROR unknown command".to_string()];
            }
            return match rest.trim().parse::<u8>() {
                Ok(a) if a <= 180 => {
                    self.angles[0] = a;
                    self.angles[1] = 180 - a;
                    vec![format!("OK JS{a}")]
                }
                _ => vec!["ERROR bad angle".to_string()],
            };
        }

        if let Some(body) = frame.strip_prefix('S') {
            if body.contains(';') {
                if !self.batch_supported {
                    return vec!["ERROR batch not supported".to_string()];
                }
                let pairs: Option<Vec<_>> = body.split(';').map(parse_pair).collect();
                return match pairs {
                    Some(pairs) => {
                        for (id, a) in &pairs {
                            self.angles[*id] = *a;
                        }
                        vec![format!("OK batch {}", pairs.len())]
                    }
                    None => vec!["ERROR bad args".to_string()],
                };
            }
            return match parse_pair(body) {
                Some((id, a)) => {
                    self.angles[id] = a;
                    vec![format!("OK S{id},{a}")]
                }
                None => vec!["ERROR bad args".to_string()],
            };
        }

        vec!["ERROR unknown command".to_string()]
    }
}

impl Link for SimulatedLink {
    fn write(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let text = String::from_utf8_lossy(frame).trim().to_string();
        let mut state = self.lock().ok_or(LinkError::Closed)?;
        if state.closed {
            return Err(Box::new(LinkError::Closed));
        }
        self.transcript.push(text.clone());
        tracing::debug!(frame = %text, "sim tx");
        let replies = state.respond(&text);
        if !state.silent {
            state.replies.extend(replies);
        }
        Ok(())
    }

    fn read_line(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.lock().ok_or(LinkError::Closed)?;
        Ok(state.replies.pop_front())
    }

    fn drain(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(mut s) = self.lock() {
            s.replies.clear();
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "sim".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(link: &mut SimulatedLink, frame: &str) -> Vec<String> {
        link.write(format!("{frame}\n").as_bytes()).unwrap();
        let mut out = Vec::new();
        while let Some(line) = link.read_line(Duration::from_millis(1)).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn single_and_sync_update_angles() {
        let mut link = SimulatedLink::new();
        assert_eq!(send(&mut link, "S4,30"), vec!["OK S4,30"]);
        assert_eq!(send(&mut link, "JS120"), vec!["OK JS120"]);
        let a = link.angles();
        assert_eq!((a[0], a[1], a[4]), (120, 60, 30));
    }

    #[test]
    fn batch_rejected_when_unsupported() {
        let mut link = SimulatedLink::new();
        link.set_batch_supported(false);
        let r = send(&mut link, "S2,10;3,170");
        assert!(r[0].starts_with("ERROR"));
        assert_eq!(link.angles()[2], 90);
    }

    #[test]
    fn reset_returns_to_mids_and_status_reports() {
        let mut link = SimulatedLink::new();
        let mut mids = [90; CHANNELS];
        mids[5] = 80;
        link.set_mids(mids);
        send(&mut link, "S5,10");
        send(&mut link, "RESET");
        let status = send(&mut link, "STATUS");
        assert!(status[0].starts_with("STATUS 90,90,90,90,90,80,"));
    }

    #[test]
    fn closed_link_fails_writes() {
        let mut link = SimulatedLink::new();
        link.close();
        assert!(link.write(b"HELP\n").is_err());
        assert!(link.transcript().is_empty());
    }

    #[test]
    fn silent_link_records_but_never_answers() {
        let mut link = SimulatedLink::new();
        link.set_silent(true);
        assert!(send(&mut link, "S0,10").is_empty());
        assert_eq!(link.transcript().frames(), vec!["S0,10"]);
    }
}
