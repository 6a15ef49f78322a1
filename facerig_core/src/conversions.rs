//! `From` implementations bridging `facerig_config` types to `facerig_core` types.

use std::time::Duration;

use crate::config::{DebounceCfg, LinkCfg, SafetyCfg, ScriptCfg};
use crate::registry::{CHANNEL_COUNT, ChannelRegistry};
use crate::script::Markers;

// ── LinkCfg ──────────────────────────────────────────────────────────────────

impl From<&facerig_config::LinkCfg> for LinkCfg {
    fn from(c: &facerig_config::LinkCfg) -> Self {
        Self {
            ack_timeout: Duration::from_millis(c.ack_timeout_ms),
            probe_timeout: Duration::from_millis(c.probe_timeout_ms),
            probe_attempts: c.probe_attempts,
            settle_after_open: Duration::from_millis(c.settle_after_open_ms),
        }
    }
}

// ── SafetyCfg ────────────────────────────────────────────────────────────────

impl From<&facerig_config::Safety> for SafetyCfg {
    fn from(c: &facerig_config::Safety) -> Self {
        Self {
            jaw_margin_deg: c.jaw_margin_deg,
        }
    }
}

// ── DebounceCfg ──────────────────────────────────────────────────────────────

impl From<&facerig_config::DebounceCfg> for DebounceCfg {
    fn from(c: &facerig_config::DebounceCfg) -> Self {
        Self {
            channel: Duration::from_millis(c.channel_ms),
            jaw: Duration::from_millis(c.jaw_ms),
        }
    }
}

// ── ScriptCfg ────────────────────────────────────────────────────────────────

impl From<&facerig_config::ScriptCfg> for ScriptCfg {
    fn from(c: &facerig_config::ScriptCfg) -> Self {
        Self {
            settle: Duration::from_millis(c.settle_ms),
            slice: Duration::from_millis(c.slice_ms),
            neutral_settle: Duration::from_millis(c.neutral_settle_ms),
            markers: Markers::new(&c.servo_marker, &c.delay_marker),
            halt_on_link_loss: c.halt_on_link_loss,
        }
    }
}

// ── Calibration store ────────────────────────────────────────────────────────

impl From<&facerig_config::CalibrationStore> for ChannelRegistry {
    fn from(store: &facerig_config::CalibrationStore) -> Self {
        let entries: Vec<(i32, i32, i32)> = store
            .channels()
            .iter()
            .map(|e| (e.min, e.max, e.mid))
            .collect();
        let initial: Vec<Option<i32>> = (0u8..)
            .take(CHANNEL_COUNT)
            .map(|id| store.initial_angle(id))
            .collect();
        Self::from_entries(&entries, &initial)
    }
}
