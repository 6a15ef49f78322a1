//! Generated demo script walking through a set of facial expressions.
//!
//! Each pose assigns a position ratio in `[0, 1]` to three channel classes
//! (jaw, face, eye area); brows stay at their calibrated mid. A ratio maps to
//! `min + (max - min) * ratio`, truncated, so the output always respects the
//! calibration it was generated from.
//!
//! Only one line is emitted per coupled pair: the partner is derived by the
//! coupling rules when the script runs.

use std::fmt::Write as _;

use crate::coupling::GROUPS;
use crate::registry::{Calibration, ChannelRegistry};
use crate::script::Markers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Jaw,
    Face,
    EyeArea,
    Other,
}

fn class_of(id: u8) -> Class {
    match id {
        0..=1 => Class::Jaw,
        2..=7 => Class::Face,
        8..=11 => Class::EyeArea,
        _ => Class::Other,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pose {
    pub name: &'static str,
    /// Ratios for jaw, face and eye area. `None` rests the whole pose at mid.
    ratios: Option<[f64; 3]>,
    pub hold_ms: u64,
}

pub const POSES: [Pose; 7] = [
    Pose { name: "neutral", ratios: None, hold_ms: 1000 },
    Pose { name: "smile", ratios: Some([0.45, 0.75, 0.40]), hold_ms: 1500 },
    Pose { name: "surprise", ratios: Some([0.90, 0.60, 0.95]), hold_ms: 1500 },
    Pose { name: "anger", ratios: Some([0.30, 0.20, 0.35]), hold_ms: 1500 },
    Pose { name: "sadness", ratios: Some([0.40, 0.30, 0.25]), hold_ms: 1500 },
    Pose { name: "thinking", ratios: Some([0.50, 0.45, 0.70]), hold_ms: 1500 },
    Pose { name: "neutral", ratios: None, hold_ms: 1000 },
];

/// Angle for `cal` at `ratio` of its window, truncated toward the minimum.
pub fn angle_at(cal: &Calibration, ratio: f64) -> u8 {
    let r = ratio.clamp(0.0, 1.0);
    let span = f64::from(cal.max()) - f64::from(cal.min());
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let off = (span * r).trunc() as u8;
    cal.min().saturating_add(off).min(cal.max())
}

impl Pose {
    pub fn angle(&self, id: u8, cal: &Calibration) -> u8 {
        let ratio = match (self.ratios, class_of(id)) {
            (None, _) | (_, Class::Other) => return cal.mid(),
            (Some(r), Class::Jaw) => r[0],
            (Some(r), Class::Face) => r[1],
            (Some(r), Class::EyeArea) => r[2],
        };
        angle_at(cal, ratio)
    }
}

/// Channels that get their own script line: independent channels and the
/// first member of every coupled pair.
fn driven_channels() -> impl Iterator<Item = u8> {
    (0u8..16).filter(|id| !GROUPS.iter().any(|g| g.pair.1 == *id))
}

/// Render the expression walkthrough for the given calibration.
pub fn expression_script(registry: &ChannelRegistry, markers: &Markers) -> String {
    let snapshot = registry.snapshot();
    let mut out = String::new();
    let _ = writeln!(out, "# expression walkthrough");
    for (id, cal) in snapshot.iter().enumerate() {
        let _ = writeln!(out, "# channel {id:>2}: {}..{} mid {}", cal.min(), cal.max(), cal.mid());
    }
    for pose in &POSES {
        let _ = writeln!(out);
        let _ = writeln!(out, "# {}", pose.name);
        for id in driven_channels() {
            let angle = pose.angle(id, &snapshot[usize::from(id)]);
            let _ = writeln!(out, "{}{id} {angle}", markers.servo);
        }
        let _ = writeln!(out, "{} {}", markers.delay, pose.hold_ms);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Field;
    use crate::script::{Instruction, Script};

    #[test]
    fn angle_at_truncates_into_window() {
        let cal = Calibration::new(56, 98, 79).unwrap();
        assert_eq!(angle_at(&cal, 0.0), 56);
        assert_eq!(angle_at(&cal, 1.0), 98);
        // 56 + 42 * 0.75 = 87.5
        assert_eq!(angle_at(&cal, 0.75), 87);
    }

    #[test]
    fn generated_script_parses_cleanly_and_stays_in_windows() {
        let mut reg = ChannelRegistry::new();
        reg.set(4, Field::Min, 100).unwrap();
        reg.set(4, Field::Max, 120).unwrap();
        let text = expression_script(&reg, &Markers::default());
        let script = Script::parse(&text, &Markers::default());
        assert!(script.check().is_empty());
        assert_eq!(script.motion_count(), POSES.len() * 9);
        for line in script.lines() {
            if let Instruction::Move { channel, angle } = line.instruction {
                assert!(reg.get(channel).unwrap().contains(i32::from(angle)), "{}", line.text);
                assert_ne!(channel, 1);
            }
        }
    }
}
