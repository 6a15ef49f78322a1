//! Coupled channel pairs and the two algorithms that derive the partner angle.
//!
//! - Inverse mirror (jaw): both halves sum to 180 so one logical angle opens
//!   or closes the mouth symmetrically.
//! - Proportional mirror (lips, eyelids, eyebrows): the partner mirrors the
//!   addressed channel's offset from its mid, scaled by the ratio of spans.

use crate::registry::{Calibration, ChannelRegistry, MAX_ANGLE, clamp_angle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingKind {
    InverseMirror,
    ProportionalMirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoupledGroup {
    pub name: &'static str,
    pub pair: (u8, u8),
    pub kind: CouplingKind,
    /// Fallback singles wait for acknowledgment between the two commands.
    pub confirm_fallback: bool,
}

impl CoupledGroup {
    /// The other member of the pair, given one of them.
    pub fn partner(&self, id: u8) -> u8 {
        if id == self.pair.0 { self.pair.1 } else { self.pair.0 }
    }
}

pub const JAW: CoupledGroup = CoupledGroup {
    name: "jaw",
    pair: (0, 1),
    kind: CouplingKind::InverseMirror,
    confirm_fallback: false,
};

pub const GROUPS: [CoupledGroup; 7] = [
    JAW,
    CoupledGroup {
        name: "upper-lip",
        pair: (2, 3),
        kind: CouplingKind::ProportionalMirror,
        confirm_fallback: false,
    },
    CoupledGroup {
        name: "lower-lip",
        pair: (4, 5),
        kind: CouplingKind::ProportionalMirror,
        confirm_fallback: false,
    },
    CoupledGroup {
        name: "upper-eyelid",
        pair: (6, 7),
        kind: CouplingKind::ProportionalMirror,
        confirm_fallback: true,
    },
    CoupledGroup {
        name: "lower-eyelid",
        pair: (8, 9),
        kind: CouplingKind::ProportionalMirror,
        confirm_fallback: true,
    },
    CoupledGroup {
        name: "eyebrow-tip",
        pair: (12, 14),
        kind: CouplingKind::ProportionalMirror,
        confirm_fallback: false,
    },
    CoupledGroup {
        name: "eyebrow-root",
        pair: (13, 15),
        kind: CouplingKind::ProportionalMirror,
        confirm_fallback: false,
    },
];

/// The group channel `id` belongs to; `None` for independent channels.
pub fn group_of(id: u8) -> Option<&'static CoupledGroup> {
    GROUPS.iter().find(|g| g.pair.0 == id || g.pair.1 == id)
}

const SUM: i32 = MAX_ANGLE as i32;

/// Shrink a window by `margin` on both sides; collapses to the centre when the
/// window is narrower than twice the margin.
fn inset(cal: &Calibration, margin: u8, angle: u8) -> u8 {
    let (lo, hi) = (
        i32::from(cal.min()) + i32::from(margin),
        i32::from(cal.max()) - i32::from(margin),
    );
    if lo > hi {
        return clamp_angle((i32::from(cal.min()) + i32::from(cal.max())) / 2);
    }
    clamp_angle(i32::from(angle).clamp(lo, hi))
}

/// Resolve the jaw pair for a logical angle.
///
/// Returns `(a, b)` for channels 0 and 1, each inside its window, with
/// `|a + b - 180| <= 1` whenever the windows admit such a pair. With a
/// `margin` (interactive moves) both results are further inset from their
/// calibrated extremes.
pub fn resolve_inverse(a_cal: &Calibration, b_cal: &Calibration, angle: i32, margin: Option<u8>) -> (u8, u8) {
    let x = i32::from(clamp_angle(angle));
    let mut a = i32::from(a_cal.clamp(x));
    let mut b = SUM - a;

    if !b_cal.contains(b) {
        b = i32::from(b_cal.clamp(b));
        a = i32::from(a_cal.clamp(SUM - b));
    }
    if (a + b - SUM).abs() > 1 {
        b = i32::from(b_cal.clamp(SUM - a));
        a = i32::from(a_cal.clamp(SUM - b));
    }

    let (a, b) = (a_cal.clamp(a), b_cal.clamp(b));
    match margin {
        Some(m) => (inset(a_cal, m, a), inset(b_cal, m, b)),
        None => (a, b),
    }
}

/// [`resolve_inverse`] against the registry's jaw calibration.
pub fn resolve_jaw(reg: &ChannelRegistry, angle: i32, margin: Option<u8>) -> (u8, u8) {
    let (a_cal, b_cal) = (
        reg.get(JAW.pair.0).unwrap_or_default(),
        reg.get(JAW.pair.1).unwrap_or_default(),
    );
    resolve_inverse(&a_cal, &b_cal, angle, margin)
}

/// Mirror `angle` on the primary channel onto the secondary.
///
/// Returns `(primary, secondary)`. The primary is only clamped to its own
/// window; the secondary sits at `mid_s - offset * span_s` where `offset` is
/// the primary's fractional offset from its mid, clamped to the secondary
/// window and truncated toward zero.
pub fn resolve_proportional(p_cal: &Calibration, s_cal: &Calibration, angle: i32) -> (u8, u8) {
    let p = p_cal.clamp(angle);
    let span_p = p_cal.span();
    let offset = if span_p == 0 {
        0.0
    } else {
        f64::from(i32::from(p) - i32::from(p_cal.mid())) / f64::from(span_p)
    };
    let raw = f64::from(s_cal.mid()) - offset * f64::from(s_cal.span());
    let bounded = raw.clamp(f64::from(s_cal.min()), f64::from(s_cal.max()));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let s = bounded.trunc() as u8;
    (p, s)
}

/// Resolve a proportional pair addressed through channel `id`, returning
/// angles in the group's declared `(first, second)` order.
pub fn resolve_pair(reg: &ChannelRegistry, group: &CoupledGroup, id: u8, angle: i32) -> [(u8, u8); 2] {
    let other = group.partner(id);
    let (p_cal, s_cal) = (reg.get(id).unwrap_or_default(), reg.get(other).unwrap_or_default());
    let (p, s) = resolve_proportional(&p_cal, &s_cal, angle);
    if id == group.pair.0 {
        [(id, p), (other, s)]
    } else {
        [(other, s), (id, p)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cal(min: u8, max: u8, mid: u8) -> Calibration {
        Calibration::new(min, max, mid).unwrap()
    }

    #[test]
    fn every_coupled_channel_has_one_group() {
        for id in 0..16u8 {
            let n = GROUPS.iter().filter(|g| g.pair.0 == id || g.pair.1 == id).count();
            let expected = usize::from(!matches!(id, 10 | 11));
            assert_eq!(n, expected, "channel {id}");
        }
        assert_eq!(group_of(14).map(|g| g.name), Some("eyebrow-tip"));
        assert!(group_of(11).is_none());
    }

    #[rstest]
    #[case(90, (90, 90))]
    #[case(30, (30, 150))]
    #[case(-20, (0, 180))]
    #[case(400, (180, 0))]
    fn inverse_full_windows(#[case] angle: i32, #[case] expected: (u8, u8)) {
        let full = Calibration::default();
        assert_eq!(resolve_inverse(&full, &full, angle, None), expected);
    }

    #[test]
    fn inverse_snaps_partner_into_its_window() {
        // b = 180 - 40 = 140 is above B's max; snap b to 120 and recompute a.
        let (a, b) = resolve_inverse(&cal(20, 160, 90), &cal(30, 120, 90), 40, None);
        assert_eq!((a, b), (60, 120));
    }

    #[test]
    fn inverse_margin_insets_both_channels() {
        let (a, b) = resolve_inverse(&cal(20, 160, 90), &cal(20, 160, 90), 10, Some(2));
        assert_eq!((a, b), (22, 158));
    }

    #[test]
    fn margin_collapses_narrow_window_to_centre() {
        let (a, _) = resolve_inverse(&cal(89, 92, 90), &Calibration::default(), 0, Some(2));
        assert_eq!(a, 90);
    }

    #[test]
    fn proportional_mid_maps_to_mid() {
        let (p, s) = resolve_proportional(&cal(56, 98, 79), &cal(38, 75, 55), 79);
        assert_eq!((p, s), (79, 55));
    }

    #[test]
    fn proportional_mirrors_and_truncates() {
        // offset = (98-79)/42 = 0.452..; s = 55 - 0.452*37 = 38.26 -> 38
        let (p, s) = resolve_proportional(&cal(56, 98, 79), &cal(38, 75, 55), 98);
        assert_eq!((p, s), (98, 38));
    }

    #[test]
    fn proportional_zero_span_holds_secondary_at_mid() {
        let (p, s) = resolve_proportional(&cal(90, 90, 90), &cal(10, 170, 100), 20);
        assert_eq!((p, s), (90, 100));
    }

    #[test]
    fn pair_order_follows_group_declaration() {
        let reg = ChannelRegistry::new();
        let g = group_of(14).unwrap();
        let [(first, _), (second, a14)] = resolve_pair(&reg, g, 14, 120);
        assert_eq!((first, second, a14), (12, 14, 120));
    }
}
