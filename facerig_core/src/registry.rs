//! Per-channel calibration windows and last-commanded angles.
//!
//! Every channel carries a `(min, mid, max)` triple with
//! `0 <= min <= mid <= max <= 180`. Calibration edits never leave the triple
//! invalid: out-of-range values are ignored, inverted windows are repaired
//! around the channel's current angle, and `mid` is clamped back inside.

use std::str::FromStr;

use crate::error::RigError;

pub const CHANNEL_COUNT: usize = 16;
pub const MAX_ANGLE: u8 = 180;
/// Half-width of the window rebuilt around the current angle when an edit
/// leaves `min >= max`.
pub const REPAIR_HALF_WIDTH: i32 = 45;

/// Bound any integer to the wire range `0..=180`.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_angle(angle: i32) -> u8 {
    angle.clamp(0, i32::from(MAX_ANGLE)) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    min: u8,
    max: u8,
    mid: u8,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            min: 0,
            max: MAX_ANGLE,
            mid: 90,
        }
    }
}

impl Calibration {
    /// Build a triple, returning `None` unless `min <= mid <= max <= 180`.
    pub fn new(min: u8, max: u8, mid: u8) -> Option<Self> {
        (min <= mid && mid <= max && max <= MAX_ANGLE).then_some(Self { min, max, mid })
    }

    /// Coerce arbitrary stored values into a valid triple: clamp to `0..=180`,
    /// swap an inverted window, pull `mid` inside.
    pub fn sanitized(min: i32, max: i32, mid: i32) -> Self {
        let (mut lo, mut hi) = (clamp_angle(min), clamp_angle(max));
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        Self {
            min: lo,
            max: hi,
            mid: clamp_angle(mid).clamp(lo, hi),
        }
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn mid(&self) -> u8 {
        self.mid
    }

    pub fn span(&self) -> i32 {
        i32::from(self.max) - i32::from(self.min)
    }

    pub fn clamp(&self, angle: i32) -> u8 {
        clamp_angle(angle).clamp(self.min, self.max)
    }

    pub fn contains(&self, angle: i32) -> bool {
        (i32::from(self.min)..=i32::from(self.max)).contains(&angle)
    }
}

/// Which value of a calibration triple an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Min,
    Max,
    Mid,
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min" | "init" => Ok(Self::Min),
            "max" | "end" => Ok(Self::Max),
            "mid" => Ok(Self::Mid),
            other => Err(format!("unknown calibration field '{other}' (min|max|mid)")),
        }
    }
}

/// Result of a calibration edit. `Repaired` means the window was rebuilt and
/// the caller should persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Repaired { min: u8, max: u8 },
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Channel {
    cal: Calibration,
    current: u8,
}

impl Default for Channel {
    fn default() -> Self {
        let cal = Calibration::default();
        Self {
            cal,
            current: cal.mid,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: [Channel; CHANNEL_COUNT],
}

impl ChannelRegistry {
    /// All channels at the full window, resting at 90.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from externally stored values. Entries beyond the channel count
    /// are ignored; missing entries keep the defaults. `initial` supplies the
    /// startup angle per channel (clamped into the window, mid when absent).
    pub fn from_entries(entries: &[(i32, i32, i32)], initial: &[Option<i32>]) -> Self {
        let mut reg = Self::new();
        for (id, &(min, max, mid)) in entries.iter().enumerate().take(CHANNEL_COUNT) {
            let cal = Calibration::sanitized(min, max, mid);
            let raw_ok = (i32::from(cal.min), i32::from(cal.max), i32::from(cal.mid)) == (min, max, mid);
            if !raw_ok {
                tracing::warn!(
                    channel = id,
                    min,
                    max,
                    mid,
                    fixed_min = cal.min,
                    fixed_max = cal.max,
                    fixed_mid = cal.mid,
                    "stored calibration sanitized"
                );
            }
            let current = initial
                .get(id)
                .copied()
                .flatten()
                .map_or(cal.mid, |a| cal.clamp(a));
            reg.channels[id] = Channel { cal, current };
        }
        reg
    }

    fn slot(&self, id: u8) -> Result<&Channel, RigError> {
        self.channels
            .get(usize::from(id))
            .ok_or(RigError::UnknownChannel(id))
    }

    fn slot_mut(&mut self, id: u8) -> Result<&mut Channel, RigError> {
        self.channels
            .get_mut(usize::from(id))
            .ok_or(RigError::UnknownChannel(id))
    }

    pub fn get(&self, id: u8) -> Result<Calibration, RigError> {
        self.slot(id).map(|c| c.cal)
    }

    /// Bound `angle` to channel `id`'s window.
    pub fn clamp(&self, id: u8, angle: i32) -> Result<u8, RigError> {
        self.slot(id).map(|c| c.cal.clamp(angle))
    }

    pub fn neutral(&self, id: u8) -> Result<u8, RigError> {
        self.slot(id).map(|c| c.cal.mid)
    }

    pub fn current(&self, id: u8) -> Result<u8, RigError> {
        self.slot(id).map(|c| c.current)
    }

    pub fn set_current(&mut self, id: u8, angle: u8) -> Result<(), RigError> {
        self.slot_mut(id)?.current = angle.min(MAX_ANGLE);
        Ok(())
    }

    pub fn currents(&self) -> [u8; CHANNEL_COUNT] {
        self.channels.map(|c| c.current)
    }

    /// Edit one value of a channel's triple.
    pub fn set(&mut self, id: u8, field: Field, value: i32) -> Result<EditOutcome, RigError> {
        let ch = self.slot_mut(id)?;
        if !(0..=i32::from(MAX_ANGLE)).contains(&value) {
            tracing::warn!(channel = id, ?field, value, "calibration edit out of range, ignored");
            return Ok(EditOutcome::Ignored);
        }
        let v = clamp_angle(value);
        let (mut min, mut max, mut mid) = (ch.cal.min, ch.cal.max, ch.cal.mid);
        match field {
            Field::Min => min = v,
            Field::Max => max = v,
            Field::Mid => mid = v,
        }

        let mut outcome = EditOutcome::Applied;
        if min >= max {
            let cur = i32::from(ch.current);
            min = clamp_angle(cur - REPAIR_HALF_WIDTH);
            max = clamp_angle(cur + REPAIR_HALF_WIDTH);
            tracing::warn!(channel = id, min, max, "inverted window repaired around current angle");
            outcome = EditOutcome::Repaired { min, max };
        }
        mid = mid.clamp(min, max);
        ch.cal = Calibration { min, max, mid };
        ch.current = ch.cal.clamp(i32::from(ch.current));
        Ok(outcome)
    }

    /// Open channel `id` to the full `0..=180` window for re-calibration.
    pub fn reset_window(&mut self, id: u8) -> Result<(), RigError> {
        let ch = self.slot_mut(id)?;
        ch.cal.min = 0;
        ch.cal.max = MAX_ANGLE;
        Ok(())
    }

    pub fn reset_all_windows(&mut self) {
        for ch in &mut self.channels {
            ch.cal.min = 0;
            ch.cal.max = MAX_ANGLE;
        }
    }

    /// Bulk replace calibration rows `(id, min, max, mid)`. The whole batch is
    /// rejected if any value is outside `0..=180`; inverted windows are
    /// repaired per channel as with [`ChannelRegistry::set`].
    pub fn set_all(&mut self, rows: &[(u8, i32, i32, i32)]) -> Result<Vec<(u8, EditOutcome)>, RigError> {
        let range = 0..=i32::from(MAX_ANGLE);
        for &(id, min, max, mid) in rows {
            self.slot(id)?;
            if ![min, max, mid].iter().all(|v| range.contains(v)) {
                return Err(RigError::InvalidCalibration(format!(
                    "channel {id}: angles must be within 0..=180 (got {min}/{max}/{mid})"
                )));
            }
        }
        let mut out = Vec::with_capacity(rows.len());
        for &(id, min, max, mid) in rows {
            let ch = self.slot_mut(id)?;
            let (mut lo, mut hi) = (clamp_angle(min), clamp_angle(max));
            let mut outcome = EditOutcome::Applied;
            if lo >= hi {
                let cur = i32::from(ch.current);
                lo = clamp_angle(cur - REPAIR_HALF_WIDTH);
                hi = clamp_angle(cur + REPAIR_HALF_WIDTH);
                outcome = EditOutcome::Repaired { min: lo, max: hi };
            }
            ch.cal = Calibration {
                min: lo,
                max: hi,
                mid: clamp_angle(mid).clamp(lo, hi),
            };
            ch.current = ch.cal.clamp(i32::from(ch.current));
            out.push((id, outcome));
        }
        Ok(out)
    }

    /// Calibration of every channel, in id order, for persistence.
    pub fn snapshot(&self) -> [Calibration; CHANNEL_COUNT] {
        self.channels.map(|c| c.cal)
    }
}
