//! The rig: channel registry plus the single dispatcher that talks to the board.
//!
//! Every coupling resolution and send happens through `&mut Rig`, so sharing
//! it as [`crate::SharedRig`] gives one writer on the link at a time.

use std::sync::Arc;
use std::time::Duration;

use facerig_traits::{Clock, Link, MonotonicClock};

use crate::calibration::CalibrationSink;
use crate::command::Command;
use crate::config::{LinkCfg, SafetyCfg};
use crate::coupling::{CouplingKind, JAW, group_of, resolve_jaw, resolve_pair};
use crate::dispatch::{Delivery, Dispatcher, SendReport};
use crate::error::{BuildError, Result, RigError};
use crate::registry::{CHANNEL_COUNT, ChannelRegistry, EditOutcome, Field};

/// Pause between HELP probe attempts during connect.
const PROBE_RETRY_PAUSE: Duration = Duration::from_secs(1);
/// Pause after each frame of the post-connect angle replay.
const REPLAY_PAUSE: Duration = Duration::from_millis(100);

/// Who is asking for a move; decides jaw margin and acknowledgment policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMode {
    /// Operator input through the debounced path. Jaw is inset by the safety
    /// margin; singles are fire-and-forget.
    Interactive,
    /// Script lines. Independent singles wait for their acknowledgment.
    Scripted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Channel angles actually commanded, in send order.
    pub targets: Vec<(u8, u8)>,
    pub report: SendReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReport {
    pub link: String,
    pub probe_replies: Vec<String>,
    /// Frames replayed from the stored current angles.
    pub replayed: usize,
}

impl ConnectReport {
    pub fn responsive(&self) -> bool {
        !self.probe_replies.is_empty()
    }
}

pub struct Rig {
    registry: ChannelRegistry,
    dispatcher: Dispatcher,
    link_cfg: LinkCfg,
    safety: SafetyCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    sink: Option<Box<dyn CalibrationSink + Send>>,
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig")
            .field("dispatcher", &self.dispatcher)
            .field("currents", &self.registry.currents())
            .field("persists", &self.sink.is_some())
            .finish()
    }
}

impl Rig {
    pub fn builder() -> RigBuilder {
        RigBuilder::default()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_attached()
    }

    pub fn link_name(&self) -> Option<String> {
        self.dispatcher.describe()
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// Record an operator preview angle without sending anything.
    ///
    /// Coupled partners are resolved the same way an interactive move would
    /// resolve them, so the stored pair stays consistent. Returns the angle
    /// stored for `id`.
    pub fn preview(&mut self, id: u8, angle: i32) -> std::result::Result<u8, RigError> {
        if usize::from(id) >= CHANNEL_COUNT {
            return Err(RigError::UnknownChannel(id));
        }
        let targets = match group_of(id) {
            Some(g) if g.kind == CouplingKind::InverseMirror => {
                let (a, b) = resolve_jaw(&self.registry, angle, Some(self.safety.jaw_margin_deg));
                vec![(JAW.pair.0, a), (JAW.pair.1, b)]
            }
            Some(g) => resolve_pair(&self.registry, g, id, angle).to_vec(),
            None => vec![(id, self.registry.clamp(id, angle)?)],
        };
        for &(ch, a) in &targets {
            self.registry.set_current(ch, a)?;
        }
        targets
            .iter()
            .find(|(ch, _)| *ch == id)
            .map(|&(_, a)| a)
            .ok_or(RigError::UnknownChannel(id))
    }

    /// Resolve coupling for channel `id` and send the result.
    pub fn move_channel(&mut self, id: u8, angle: i32, mode: MoveMode) -> std::result::Result<MoveOutcome, RigError> {
        if usize::from(id) >= CHANNEL_COUNT {
            return Err(RigError::UnknownChannel(id));
        }
        let ack = self.dispatcher.ack_timeout();
        let (targets, report) = match group_of(id) {
            Some(g) if g.kind == CouplingKind::InverseMirror => {
                let margin = (mode == MoveMode::Interactive).then_some(self.safety.jaw_margin_deg);
                let (a, b) = resolve_jaw(&self.registry, angle, margin);
                let targets = vec![(JAW.pair.0, a), (JAW.pair.1, b)];
                // The board mirrors JS itself, so it carries the resolved primary.
                let report = self
                    .dispatcher
                    .send_group(&Command::JawSync(a), &targets, None)?;
                (targets, report)
            }
            Some(g) => {
                let pair = resolve_pair(&self.registry, g, id, angle);
                let confirm = g.confirm_fallback.then_some(ack);
                let report = self
                    .dispatcher
                    .send_group(&Command::Batch(pair.to_vec()), &pair, confirm)?;
                (pair.to_vec(), report)
            }
            None => {
                let a = self.registry.clamp(id, angle)?;
                let confirm = (mode == MoveMode::Scripted).then_some(ack);
                let d = self.dispatcher.send(&Command::Single { channel: id, angle: a }, confirm)?;
                (vec![(id, a)], SendReport::Delivered(d))
            }
        };

        let failed: Vec<u8> = match &report {
            SendReport::Partial { failed, .. } => failed.iter().map(|(c, _)| *c).collect(),
            _ => Vec::new(),
        };
        for &(ch, a) in &targets {
            if !failed.contains(&ch) {
                self.registry.set_current(ch, a)?;
            }
        }
        tracing::debug!(channel = id, angle, ?mode, ?targets, "move");
        if let SendReport::Fallback { reason, .. } | SendReport::Partial { reason, .. } = &report {
            tracing::info!(channel = id, %reason, partial = report.is_partial(), "sent as singles");
        }
        Ok(MoveOutcome { targets, report })
    }

    /// Send `RESET` and mark every channel as resting at its mid.
    ///
    /// The registry is updated even when the send fails so the stored state
    /// matches what the board will do on its next reset.
    pub fn reset_to_neutral(&mut self) -> std::result::Result<Delivery, RigError> {
        for id in (0u8..).take(CHANNEL_COUNT) {
            let mid = self.registry.neutral(id)?;
            self.registry.set_current(id, mid)?;
        }
        let res = self.dispatcher.send(&Command::Reset, None);
        match &res {
            Ok(_) => tracing::info!("all channels to neutral"),
            Err(e) => tracing::warn!(error = %e, "neutral reset not sent"),
        }
        res
    }

    /// Attach `link`, wait for the board to boot, probe it with `HELP` and
    /// optionally replay the stored current angles.
    pub fn connect(&mut self, link: Box<dyn Link + Send>, replay: bool) -> std::result::Result<ConnectReport, RigError> {
        let name = link.describe();
        self.dispatcher.attach(link);
        self.clock.sleep(self.link_cfg.settle_after_open);
        self.dispatcher.drain()?;

        let mut probe_replies = Vec::new();
        for attempt in 1..=self.link_cfg.probe_attempts {
            probe_replies = self.dispatcher.query(&Command::Help, self.link_cfg.probe_timeout)?;
            if !probe_replies.is_empty() {
                for line in &probe_replies {
                    tracing::info!(link = %name, reply = %line, "board");
                }
                break;
            }
            tracing::warn!(attempt, of = self.link_cfg.probe_attempts, "no reply to HELP");
            if attempt < self.link_cfg.probe_attempts {
                self.clock.sleep(PROBE_RETRY_PAUSE);
            }
        }
        if probe_replies.is_empty() {
            tracing::warn!(link = %name, "board did not answer; check power, baud rate and firmware");
        }

        let replayed = if replay { self.replay_currents()? } else { 0 };
        Ok(ConnectReport {
            link: name,
            probe_replies,
            replayed,
        })
    }

    /// Send the stored current angles: the jaw pair first, then channels 2..=15
    /// one by one.
    pub fn replay_currents(&mut self) -> std::result::Result<usize, RigError> {
        let jaw = self.registry.current(JAW.pair.0)?;
        self.move_channel(JAW.pair.0, i32::from(jaw), MoveMode::Scripted)?;
        self.clock.sleep(REPLAY_PAUSE * 2);
        let ack = self.dispatcher.ack_timeout();
        let mut sent = 1;
        for id in 2u8..16 {
            let a = self.registry.current(id)?;
            match self.dispatcher.send(&Command::Single { channel: id, angle: a }, Some(ack)) {
                Ok(_) => sent += 1,
                Err(e @ RigError::DeviceRejected { .. }) => tracing::warn!(channel = id, error = %e, "replay rejected"),
                Err(e) => return Err(e),
            }
            self.clock.sleep(REPLAY_PAUSE);
        }
        tracing::info!(frames = sent, "current angles replayed");
        Ok(sent)
    }

    pub fn status(&mut self) -> std::result::Result<Vec<String>, RigError> {
        self.dispatcher.query(&Command::Status, self.link_cfg.probe_timeout)
    }

    pub fn help(&mut self) -> std::result::Result<Vec<String>, RigError> {
        self.dispatcher.query(&Command::Help, self.link_cfg.probe_timeout)
    }

    // ── Calibration ──────────────────────────────────────────────────────────

    pub fn edit_calibration(&mut self, id: u8, field: Field, value: i32) -> Result<EditOutcome> {
        let outcome = self.registry.set(id, field, value)?;
        if outcome != EditOutcome::Ignored {
            self.save_calibration()?;
        }
        Ok(outcome)
    }

    /// Open the window of `id` to `0..=180`. Jaw members reset together.
    pub fn reset_window(&mut self, id: u8) -> Result<()> {
        if JAW.pair.0 == id || JAW.pair.1 == id {
            self.registry.reset_window(JAW.pair.0)?;
            self.registry.reset_window(JAW.pair.1)?;
        } else {
            self.registry.reset_window(id)?;
        }
        self.save_calibration()
    }

    pub fn reset_all_windows(&mut self) -> Result<()> {
        self.registry.reset_all_windows();
        self.save_calibration()
    }

    pub fn import_calibration(&mut self, rows: &[(u8, i32, i32, i32)]) -> Result<Vec<(u8, EditOutcome)>> {
        let out = self.registry.set_all(rows)?;
        self.save_calibration()?;
        Ok(out)
    }

    pub fn save_calibration(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.persist(&self.registry.snapshot())?;
            tracing::debug!("calibration saved");
        }
        Ok(())
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RigBuilder {
    registry: Option<ChannelRegistry>,
    link_cfg: Option<LinkCfg>,
    safety: Option<SafetyCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    sink: Option<Box<dyn CalibrationSink + Send>>,
}

impl RigBuilder {
    pub fn with_registry(mut self, registry: ChannelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
    pub fn with_link_cfg(mut self, cfg: LinkCfg) -> Self {
        self.link_cfg = Some(cfg);
        self
    }
    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.safety = Some(safety);
        self
    }
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    pub fn with_sink(mut self, sink: impl CalibrationSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn try_build(self) -> Result<Rig> {
        let link_cfg = self.link_cfg.unwrap_or_default();
        let safety = self.safety.unwrap_or_default();
        if link_cfg.ack_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig("ack_timeout must be > 0")));
        }
        if link_cfg.probe_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig("probe_timeout must be > 0")));
        }
        if link_cfg.probe_attempts == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig("probe_attempts must be >= 1")));
        }
        if safety.jaw_margin_deg > 45 {
            return Err(eyre::Report::new(BuildError::InvalidConfig("jaw_margin_deg must be <= 45")));
        }
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Ok(Rig {
            registry: self.registry.unwrap_or_default(),
            dispatcher: Dispatcher::new(link_cfg.ack_timeout, Arc::clone(&clock)),
            link_cfg,
            safety,
            clock,
            sink: self.sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::MemorySink;
    use crate::registry::Calibration;
    use facerig_hardware::SimulatedLink;
    use facerig_traits::ManualClock;

    fn rig_on(link: &SimulatedLink) -> Rig {
        let mut rig = Rig::builder()
            .with_clock(Arc::new(ManualClock::new()))
            .try_build()
            .unwrap();
        rig.connect(Box::new(link.clone()), false).unwrap();
        link.transcript().clear();
        rig
    }

    #[test]
    fn jaw_interactive_move_uses_js_and_margin() {
        let link = SimulatedLink::new();
        let mut rig = rig_on(&link);
        let out = rig.move_channel(1, 0, MoveMode::Interactive).unwrap();
        assert_eq!(link.transcript().frames(), vec!["JS2"]);
        assert_eq!(out.targets, vec![(0, 2), (1, 178)]);
        assert_eq!(rig.registry().current(0).unwrap(), 2);
    }

    #[test]
    fn jaw_sync_frame_carries_calibrated_angle() {
        let link = SimulatedLink::new();
        let mut rig = rig_on(&link);
        rig.edit_calibration(0, Field::Min, 30).unwrap();
        rig.edit_calibration(0, Field::Max, 150).unwrap();
        let out = rig.move_channel(0, 0, MoveMode::Interactive).unwrap();
        let primary = out.targets[0].1;
        assert_eq!(primary, 32);
        assert_eq!(link.transcript().frames(), vec![format!("JS{primary}")]);
        assert_eq!(link.angles()[0], primary);
    }

    #[test]
    fn preview_keeps_coupled_pairs_consistent() {
        let mut rig = Rig::builder().try_build().unwrap();
        assert_eq!(rig.preview(1, 70).unwrap(), 110);
        assert_eq!(rig.registry().current(0).unwrap(), 70);
        assert_eq!(rig.registry().current(1).unwrap(), 110);
        assert_eq!(rig.preview(4, 135).unwrap(), 135);
        assert_eq!(rig.registry().current(5).unwrap(), 45);
        assert_eq!(rig.preview(16, 10), Err(RigError::UnknownChannel(16)));
    }

    #[test]
    fn jaw_without_sync_falls_back_to_singles() {
        let link = SimulatedLink::new();
        link.set_sync_supported(false);
        let mut rig = rig_on(&link);
        let out = rig.move_channel(0, 30, MoveMode::Scripted).unwrap();
        assert!(matches!(out.report, SendReport::Fallback { .. }));
        assert_eq!(link.transcript().frames(), vec!["JS30", "S0,30", "S1,150"]);
    }

    #[test]
    fn independent_channel_clamped_to_window() {
        let link = SimulatedLink::new();
        let mut rig = rig_on(&link);
        rig.edit_calibration(11, Field::Max, 120).unwrap();
        rig.move_channel(11, 170, MoveMode::Interactive).unwrap();
        assert_eq!(link.transcript().frames(), vec!["S11,120"]);
    }

    #[test]
    fn unknown_channel_rejected_before_sending() {
        let link = SimulatedLink::new();
        let mut rig = rig_on(&link);
        assert_eq!(rig.move_channel(16, 90, MoveMode::Scripted), Err(RigError::UnknownChannel(16)));
        assert!(link.transcript().is_empty());
    }

    #[test]
    fn connect_probes_and_replays() {
        let link = SimulatedLink::new();
        let mut rig = Rig::builder()
            .with_clock(Arc::new(ManualClock::new()))
            .try_build()
            .unwrap();
        let report = rig.connect(Box::new(link.clone()), true).unwrap();
        assert!(report.responsive());
        assert_eq!(report.replayed, 15);
        let frames = link.transcript().frames();
        assert_eq!(frames[0], "HELP");
        assert_eq!(frames[1], "JS90");
        assert_eq!(frames.last().map(String::as_str), Some("S15,90"));
    }

    #[test]
    fn silent_board_probed_every_attempt() {
        let link = SimulatedLink::new();
        link.set_silent(true);
        let mut rig = Rig::builder()
            .with_clock(Arc::new(ManualClock::new()))
            .try_build()
            .unwrap();
        let report = rig.connect(Box::new(link.clone()), false).unwrap();
        assert!(!report.responsive());
        assert_eq!(link.transcript().frames(), vec!["HELP", "HELP", "HELP"]);
    }

    #[test]
    fn reset_window_on_jaw_member_resets_pair_and_persists() {
        let sink = MemorySink::default();
        let mut reg = ChannelRegistry::new();
        reg.set(0, Field::Min, 30).unwrap();
        reg.set(1, Field::Max, 150).unwrap();
        let mut rig = Rig::builder()
            .with_registry(reg)
            .with_sink(sink.clone())
            .try_build()
            .unwrap();
        rig.reset_window(1).unwrap();
        assert_eq!(rig.registry().get(0).unwrap(), Calibration::default());
        assert_eq!(rig.registry().get(1).unwrap(), Calibration::default());
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn ignored_edit_does_not_persist() {
        let sink = MemorySink::default();
        let mut rig = Rig::builder().with_sink(sink.clone()).try_build().unwrap();
        assert_eq!(rig.edit_calibration(3, Field::Mid, 200).unwrap(), EditOutcome::Ignored);
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn neutral_reset_updates_registry_even_offline() {
        let mut reg = ChannelRegistry::new();
        reg.set_current(5, 10).unwrap();
        let mut rig = Rig::builder().with_registry(reg).try_build().unwrap();
        assert_eq!(rig.reset_to_neutral(), Err(RigError::TransportUnavailable));
        assert_eq!(rig.registry().current(5).unwrap(), 90);
    }

    #[test]
    fn zero_ack_timeout_rejected() {
        let cfg = LinkCfg {
            ack_timeout: Duration::ZERO,
            ..LinkCfg::default()
        };
        let err = Rig::builder().with_link_cfg(cfg).try_build().unwrap_err();
        assert!(err.downcast_ref::<BuildError>().is_some());
    }
}
