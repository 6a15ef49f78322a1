//! Runtime configuration for the rig.
//!
//! These are separate from the TOML-deserialized config in `facerig_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

use crate::script::Markers;

/// Link timing used by the dispatcher and the connect handshake.
#[derive(Debug, Clone)]
pub struct LinkCfg {
    /// Default acknowledgment window for confirmed sends.
    pub ack_timeout: Duration,
    /// Window for collecting replies to HELP/STATUS queries.
    pub probe_timeout: Duration,
    pub probe_attempts: u32,
    /// Wait after opening the port before the first frame.
    pub settle_after_open: Duration,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(800),
            probe_attempts: 3,
            settle_after_open: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyCfg {
    /// Inset from the jaw pair's calibrated extremes on interactive moves.
    pub jaw_margin_deg: u8,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self { jaw_margin_deg: 2 }
    }
}

/// Trailing-debounce delays for the interactive path.
#[derive(Debug, Clone)]
pub struct DebounceCfg {
    pub channel: Duration,
    pub jaw: Duration,
}

impl Default for DebounceCfg {
    fn default() -> Self {
        Self {
            channel: Duration::from_millis(40),
            jaw: Duration::from_millis(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptCfg {
    /// Pause after every motion line.
    pub settle: Duration,
    /// Cancellation is checked between slices of this length.
    pub slice: Duration,
    /// Wait after the neutral pass.
    pub neutral_settle: Duration,
    pub markers: Markers,
    /// Stop the run on link loss instead of logging and continuing.
    pub halt_on_link_loss: bool,
}

impl Default for ScriptCfg {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            slice: Duration::from_millis(100),
            neutral_settle: Duration::from_millis(1500),
            markers: Markers::default(),
            halt_on_link_loss: false,
        }
    }
}
