//! Operator input path: every update is recorded at once and sent after a
//! short quiet period, so dragging a control produces one frame per pause
//! instead of one per pixel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::SharedRig;
use crate::config::DebounceCfg;
use crate::coupling::JAW;
use crate::debounce::Debouncer;
use crate::error::RigError;
use crate::registry::{CHANNEL_COUNT, clamp_angle};
use crate::rig::MoveMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebounceKey {
    Channel(u8),
    /// Both jaw channels share one key so either slider supersedes the other.
    Jaw,
}

impl DebounceKey {
    pub fn for_channel(id: u8) -> Self {
        if id == JAW.pair.0 || id == JAW.pair.1 {
            Self::Jaw
        } else {
            Self::Channel(id)
        }
    }
}

pub struct InteractiveControl {
    rig: SharedRig,
    debouncer: Debouncer<DebounceKey, (u8, u8)>,
    cfg: DebounceCfg,
    suppressed: Arc<AtomicUsize>,
}

impl InteractiveControl {
    pub fn new(rig: SharedRig, cfg: DebounceCfg) -> Self {
        let target = rig.clone();
        let debouncer = Debouncer::spawn(move |key: DebounceKey, (id, angle): (u8, u8)| {
            let Ok(mut rig) = target.lock() else {
                tracing::error!(?key, "rig lock poisoned; debounced send dropped");
                return;
            };
            match rig.move_channel(id, i32::from(angle), MoveMode::Interactive) {
                Ok(out) => tracing::debug!(?key, targets = ?out.targets, "debounced send"),
                Err(e) => tracing::warn!(?key, error = %e, "debounced send failed"),
            }
        });
        Self {
            rig,
            debouncer,
            cfg,
            suppressed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record `angle` for channel `id` and schedule its transmission.
    ///
    /// While a [`SuppressGuard`] is alive only the stored angle changes.
    pub fn update(&self, id: u8, angle: i32) -> Result<(), RigError> {
        if usize::from(id) >= CHANNEL_COUNT {
            return Err(RigError::UnknownChannel(id));
        }
        {
            let mut rig = self
                .rig
                .lock()
                .map_err(|_| RigError::State("rig lock poisoned".into()))?;
            rig.preview(id, angle)?;
        }
        if self.is_suppressed() {
            tracing::trace!(channel = id, angle, "suppressed");
            return Ok(());
        }
        let key = DebounceKey::for_channel(id);
        let delay = match key {
            DebounceKey::Jaw => self.cfg.jaw,
            DebounceKey::Channel(_) => self.cfg.channel,
        };
        self.debouncer.schedule(key, (id, clamp_angle(angle)), delay);
        Ok(())
    }

    /// Stop scheduling sends until the guard drops; pending sends are cancelled.
    pub fn suppress(&self) -> SuppressGuard {
        self.suppressed.fetch_add(1, Ordering::SeqCst);
        self.debouncer.cancel_all();
        SuppressGuard {
            count: Arc::clone(&self.suppressed),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst) > 0
    }

    pub fn rig(&self) -> &SharedRig {
        &self.rig
    }
}

#[must_use = "suppression ends when the guard is dropped"]
pub struct SuppressGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}
