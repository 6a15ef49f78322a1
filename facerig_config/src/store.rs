//! Flat JSON calibration file.
//!
//! Layout, one key per value:
//!
//! ```json
//! { "servo_0_min": 20, "servo_0_max": 160, "servo_0_mid": 90,
//!   "auto_send_angles": true, "saved_port": "/dev/ttyUSB0" }
//! ```
//!
//! Older files used `servo_{i}_init` / `servo_{i}_end` for the window bounds;
//! those are read when the new keys are absent. Keys this module does not
//! understand are carried through a load/save cycle untouched.
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::CHANNEL_COUNT;
use crate::atomic::write_atomic;

/// Raw calibration triple as stored on disk. Not validated: the core registry
/// sanitizes these on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEntry {
    pub min: i32,
    pub max: i32,
    pub mid: i32,
}

impl Default for ChannelEntry {
    fn default() -> Self {
        Self {
            min: 0,
            max: 180,
            mid: 90,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
    map: Map<String, Value>,
}

fn key(id: u8, field: &str) -> String {
    format!("servo_{id}_{field}")
}

fn as_angle(v: &Value) -> Option<i32> {
    if let Some(i) = v.as_i64() {
        return i32::try_from(i).ok();
    }
    #[allow(clippy::cast_possible_truncation)]
    v.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i32)
}

impl CalibrationStore {
    /// Load `path`; a missing file yields an empty store that will be
    /// created on the first save.
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => eyre::bail!("calibration file {:?} must hold a JSON object", path),
                Err(e) => eyre::bail!("parse calibration file {:?}: {}", path, e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no calibration file yet, using defaults");
                Map::new()
            }
            Err(e) => eyre::bail!("read calibration file {:?}: {}", path, e),
        };
        Ok(Self { path, map })
    }

    fn angle(&self, id: u8, field: &str) -> Option<i32> {
        self.map.get(&key(id, field)).and_then(as_angle)
    }

    /// Calibration for `id`, falling back to the legacy keys and then to the
    /// full `0..=180` window centred on 90.
    pub fn channel(&self, id: u8) -> ChannelEntry {
        let d = ChannelEntry::default();
        ChannelEntry {
            min: self
                .angle(id, "min")
                .or_else(|| self.angle(id, "init"))
                .unwrap_or(d.min),
            max: self
                .angle(id, "max")
                .or_else(|| self.angle(id, "end"))
                .unwrap_or(d.max),
            mid: self.angle(id, "mid").unwrap_or(d.mid),
        }
    }

    pub fn channels(&self) -> Vec<ChannelEntry> {
        (0..CHANNEL_COUNT).map(|id| self.channel(id)).collect()
    }

    /// Angle a channel is assumed to sit at on startup: the legacy `init`
    /// key when present, otherwise the stored mid.
    pub fn initial_angle(&self, id: u8) -> Option<i32> {
        self.angle(id, "init").or_else(|| self.angle(id, "mid"))
    }

    pub fn set_channel(&mut self, id: u8, entry: ChannelEntry) {
        self.map.insert(key(id, "min"), Value::from(entry.min));
        self.map.insert(key(id, "max"), Value::from(entry.max));
        self.map.insert(key(id, "mid"), Value::from(entry.mid));
    }

    pub fn auto_send_angles(&self) -> bool {
        self.map
            .get("auto_send_angles")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_auto_send_angles(&mut self, on: bool) {
        self.map.insert("auto_send_angles".into(), Value::Bool(on));
    }

    pub fn saved_port(&self) -> Option<&str> {
        self.map
            .get("saved_port")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn set_saved_port(&mut self, port: &str) {
        self.map.insert("saved_port".into(), Value::from(port));
    }

    pub fn last_script(&self) -> Option<&str> {
        self.map
            .get("last_script")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn set_last_script(&mut self, name: &str) {
        self.map.insert("last_script".into(), Value::from(name));
    }

    pub fn save(&self) -> eyre::Result<()> {
        let text = serde_json::to_string_pretty(&Value::Object(self.map.clone()))?;
        write_atomic(&self.path, text.as_bytes())
            .map_err(|e| eyre::eyre!("write calibration file {:?}: {}", self.path, e))?;
        tracing::debug!(path = %self.path.display(), "calibration saved");
        Ok(())
    }
}
