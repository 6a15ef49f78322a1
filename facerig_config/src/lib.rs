#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration storage for the servo rig.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - `store::CalibrationStore` reads and writes the flat JSON calibration file
//!   shared with older tooling (legacy keys, unknown keys preserved).
//! - The CSV loader enforces exact headers for bulk calibration imports.
use serde::Deserialize;

pub mod atomic;
pub mod library;
pub mod store;

pub use library::ScriptLibrary;
pub use store::{CalibrationStore, ChannelEntry};

/// Number of addressable channels on the controller board.
pub const CHANNEL_COUNT: u8 = 16;

/// Bulk calibration CSV schema.
///
/// Expected headers:
/// channel,min,max,mid
///
/// Example:
/// channel,min,max,mid
/// 0,20,160,90
/// 6,45,135,90
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRow {
    pub channel: u8,
    pub min: i32,
    pub max: i32,
    pub mid: i32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkCfg {
    /// Serial port to open; falls back to the calibration file's `saved_port`.
    pub port: Option<String>,
    pub baud: u32,
    /// Acknowledgment window for confirmed sends (ms)
    pub ack_timeout_ms: u64,
    /// Window for each HELP probe reply after connect (ms)
    pub probe_timeout_ms: u64,
    pub probe_attempts: u32,
    /// Boards reset on open; wait this long before talking to them (ms)
    pub settle_after_open_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            ack_timeout_ms: 200,
            probe_timeout_ms: 800,
            probe_attempts: 3,
            settle_after_open_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DebounceCfg {
    pub channel_ms: u64,
    pub jaw_ms: u64,
}

impl Default for DebounceCfg {
    fn default() -> Self {
        Self {
            channel_ms: 40,
            jaw_ms: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScriptCfg {
    /// Pause after every motion line (ms)
    pub settle_ms: u64,
    /// Granularity of cancellable delays (ms)
    pub slice_ms: u64,
    /// Wait after RESET for all channels to reach neutral (ms)
    pub neutral_settle_ms: u64,
    pub servo_marker: String,
    pub delay_marker: String,
    /// Abort the run when the link drops instead of continuing best-effort
    pub halt_on_link_loss: bool,
    /// Named-script library file (JSON object name -> script text)
    pub library: Option<String>,
}

impl Default for ScriptCfg {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            slice_ms: 100,
            neutral_settle_ms: 1500,
            servo_marker: "舵机".to_string(),
            delay_marker: "延时".to_string(),
            halt_on_link_loss: false,
            library: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Safety {
    /// Inset applied to the jaw pair's calibrated extremes on interactive moves
    pub jaw_margin_deg: u8,
}

impl Default for Safety {
    fn default() -> Self {
        Self { jaw_margin_deg: 2 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Flat JSON calibration file
    pub path: String,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            path: "servo_config.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub link: LinkCfg,
    pub debounce: DebounceCfg,
    pub script: ScriptCfg,
    pub safety: Safety,
    pub logging: Logging,
    pub calibration: CalibrationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Vec<CalibrationRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["channel", "min", "max", "mid"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'channel,min,max,mid', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<CalibrationRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if row.channel >= CHANNEL_COUNT {
            eyre::bail!(
                "invalid CSV row {}: channel {} out of range 0..{}",
                idx + 2,
                row.channel,
                CHANNEL_COUNT
            );
        }
        if rows.iter().any(|r| r.channel == row.channel) {
            eyre::bail!("invalid CSV row {}: duplicate channel {}", idx + 2, row.channel);
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("calibration CSV {:?} has no rows", path);
    }

    Ok(rows)
}

fn check_marker(name: &str, marker: &str) -> eyre::Result<()> {
    if marker.is_empty() {
        eyre::bail!("script.{name} must not be empty");
    }
    if marker.chars().any(char::is_whitespace) {
        eyre::bail!("script.{name} must not contain whitespace");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Link
        if self.link.baud == 0 {
            eyre::bail!("link.baud must be > 0");
        }
        if self.link.ack_timeout_ms == 0 || self.link.ack_timeout_ms > 10_000 {
            eyre::bail!("link.ack_timeout_ms must be in [1, 10000]");
        }
        if self.link.probe_timeout_ms == 0 {
            eyre::bail!("link.probe_timeout_ms must be >= 1");
        }
        if self.link.probe_attempts == 0 {
            eyre::bail!("link.probe_attempts must be >= 1");
        }
        if self.link.settle_after_open_ms > 60_000 {
            eyre::bail!("link.settle_after_open_ms is unreasonably large (>60s)");
        }

        // Debounce
        if self.debounce.channel_ms > 10_000 || self.debounce.jaw_ms > 10_000 {
            eyre::bail!("debounce delays must be <= 10000 ms");
        }

        // Script
        if self.script.slice_ms == 0 {
            eyre::bail!("script.slice_ms must be >= 1");
        }
        if self.script.settle_ms > 60_000 {
            eyre::bail!("script.settle_ms is unreasonably large (>60s)");
        }
        if self.script.neutral_settle_ms > 60_000 {
            eyre::bail!("script.neutral_settle_ms is unreasonably large (>60s)");
        }
        check_marker("servo_marker", &self.script.servo_marker)?;
        check_marker("delay_marker", &self.script.delay_marker)?;
        if self.script.servo_marker == self.script.delay_marker {
            eyre::bail!("script.servo_marker and script.delay_marker must differ");
        }

        // Safety
        if self.safety.jaw_margin_deg > 45 {
            eyre::bail!("safety.jaw_margin_deg must be in [0, 45]");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot}");
        }

        if self.calibration.path.trim().is_empty() {
            eyre::bail!("calibration.path must not be empty");
        }

        Ok(())
    }
}
