//! Persistence seam for calibration edits.

use facerig_config::{CalibrationStore, ChannelEntry};

use crate::registry::{CHANNEL_COUNT, Calibration};

/// Where the rig writes calibration after an edit or on shutdown.
pub trait CalibrationSink {
    fn persist(&mut self, snapshot: &[Calibration; CHANNEL_COUNT]) -> eyre::Result<()>;
}

impl CalibrationSink for CalibrationStore {
    fn persist(&mut self, snapshot: &[Calibration; CHANNEL_COUNT]) -> eyre::Result<()> {
        for (id, cal) in (0u8..).zip(snapshot.iter()) {
            self.set_channel(
                id,
                ChannelEntry {
                    min: i32::from(cal.min()),
                    max: i32::from(cal.max()),
                    mid: i32::from(cal.mid()),
                },
            );
        }
        self.save()
    }
}

/// Sink that keeps the last snapshot in memory; used by tests and `--sim` runs
/// that must not touch the user's calibration file.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub saved: std::sync::Arc<std::sync::Mutex<Vec<[Calibration; CHANNEL_COUNT]>>>,
}

impl CalibrationSink for MemorySink {
    fn persist(&mut self, snapshot: &[Calibration; CHANNEL_COUNT]) -> eyre::Result<()> {
        self.saved
            .lock()
            .map_err(|_| eyre::eyre!("calibration sink poisoned"))?
            .push(*snapshot);
        Ok(())
    }
}
