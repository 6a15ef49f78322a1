//! Motion script parsing.
//!
//! A script is line oriented:
//!
//! ```text
//! # comment
//! 舵机0 45        move channel 0 to 45 degrees
//! 延时 500        pause 500 ms
//! ```
//!
//! Tokens after the second are ignored, so trailing `# notes` are allowed.
//! Parsing never fails; lines that cannot be executed carry a [`Warning`]
//! and are skipped by the runner.

use std::fmt;

use crate::registry::{CHANNEL_COUNT, MAX_ANGLE};

/// Leading tokens for motion and delay lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub servo: String,
    pub delay: String,
}

impl Markers {
    pub fn new(servo: &str, delay: &str) -> Self {
        Self {
            servo: servo.to_string(),
            delay: delay.to_string(),
        }
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self::new("舵机", "延时")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Motion line without a parsable channel and angle.
    MalformedMove,
    /// Channel beyond the rig or angle beyond 0..=180.
    OutOfRange { channel: i64, angle: i64 },
    MalformedDelay,
    UnknownCommand,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMove => f.write_str("malformed motion line"),
            Self::OutOfRange { channel, angle } => {
                write!(f, "channel {channel} / angle {angle} out of range")
            }
            Self::MalformedDelay => f.write_str("malformed delay"),
            Self::UnknownCommand => f.write_str("unknown command"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Move { channel: u8, angle: u8 },
    DelayMs(u64),
    Comment,
    Blank,
    Skip(Warning),
}

impl Instruction {
    pub fn is_motion(&self) -> bool {
        matches!(self, Self::Move { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based.
    pub number: usize,
    pub text: String,
    pub instruction: Instruction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    lines: Vec<Line>,
}

impl Script {
    pub fn parse(text: &str, markers: &Markers) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, raw)| Line {
                number: i + 1,
                text: raw.trim().to_string(),
                instruction: parse_line(raw, markers),
            })
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// No motion or delay lines at all.
    pub fn is_empty(&self) -> bool {
        !self
            .lines
            .iter()
            .any(|l| matches!(l.instruction, Instruction::Move { .. } | Instruction::DelayMs(_)))
    }

    pub fn motion_count(&self) -> usize {
        self.lines.iter().filter(|l| l.instruction.is_motion()).count()
    }

    /// Total explicit delay, ignoring settle pauses.
    pub fn total_delay_ms(&self) -> u64 {
        self.lines
            .iter()
            .filter_map(|l| match l.instruction {
                Instruction::DelayMs(ms) => Some(ms),
                _ => None,
            })
            .fold(0u64, u64::saturating_add)
    }

    /// Every line the runner would skip, with its warning.
    pub fn check(&self) -> Vec<(&Line, &Warning)> {
        self.lines
            .iter()
            .filter_map(|l| match &l.instruction {
                Instruction::Skip(w) => Some((l, w)),
                _ => None,
            })
            .collect()
    }
}

fn parse_line(raw: &str, markers: &Markers) -> Instruction {
    let line = raw.trim();
    if line.is_empty() {
        return Instruction::Blank;
    }
    if line.starts_with('#') {
        return Instruction::Comment;
    }
    if let Some(rest) = line.strip_prefix(markers.servo.as_str()) {
        return parse_move(rest);
    }
    if let Some(rest) = line.strip_prefix(markers.delay.as_str()) {
        return parse_delay(rest);
    }
    Instruction::Skip(Warning::UnknownCommand)
}

fn parse_move(rest: &str) -> Instruction {
    // `rest` is "<id> <angle> ..."; the id is glued to the marker.
    let mut parts = rest.split_whitespace();
    let (Some(id), Some(angle)) = (parts.next(), parts.next()) else {
        return Instruction::Skip(Warning::MalformedMove);
    };
    if rest.starts_with(char::is_whitespace) {
        return Instruction::Skip(Warning::MalformedMove);
    }
    let (Ok(channel), Ok(angle)) = (id.parse::<i64>(), angle.parse::<i64>()) else {
        return Instruction::Skip(Warning::MalformedMove);
    };
    match (u8::try_from(channel), u8::try_from(angle)) {
        (Ok(c), Ok(a)) if usize::from(c) < CHANNEL_COUNT && a <= MAX_ANGLE => {
            Instruction::Move { channel: c, angle: a }
        }
        _ => Instruction::Skip(Warning::OutOfRange { channel, angle }),
    }
}

fn parse_delay(rest: &str) -> Instruction {
    // The duration is a separate token: `延时 500`, never `延时500`.
    if !rest.starts_with(char::is_whitespace) {
        return Instruction::Skip(Warning::MalformedDelay);
    }
    match rest.split_whitespace().next().map(str::parse::<u64>) {
        Some(Ok(ms)) => Instruction::DelayMs(ms),
        _ => Instruction::Skip(Warning::MalformedDelay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn one(line: &str) -> Instruction {
        parse_line(line, &Markers::default())
    }

    #[rstest]
    #[case("舵机0 45", Instruction::Move { channel: 0, angle: 45 })]
    #[case("  舵机15 180  ", Instruction::Move { channel: 15, angle: 180 })]
    #[case("舵机3 60  # 左上唇", Instruction::Move { channel: 3, angle: 60 })]
    #[case("延时 500", Instruction::DelayMs(500))]
    #[case("延时 0", Instruction::DelayMs(0))]
    #[case("", Instruction::Blank)]
    #[case("   ", Instruction::Blank)]
    #[case("# 舵机0 45", Instruction::Comment)]
    fn accepted_lines(#[case] line: &str, #[case] expected: Instruction) {
        assert_eq!(one(line), expected);
    }

    #[rstest]
    #[case("舵机16 90", Warning::OutOfRange { channel: 16, angle: 90 })]
    #[case("舵机2 181", Warning::OutOfRange { channel: 2, angle: 181 })]
    #[case("舵机2 -5", Warning::OutOfRange { channel: 2, angle: -5 })]
    #[case("舵机2", Warning::MalformedMove)]
    #[case("舵机 2 90", Warning::MalformedMove)]
    #[case("舵机x 90", Warning::MalformedMove)]
    #[case("延时", Warning::MalformedDelay)]
    #[case("延时 soon", Warning::MalformedDelay)]
    #[case("延时500", Warning::MalformedDelay)]
    #[case("延时 -100", Warning::MalformedDelay)]
    #[case("servo0 90", Warning::UnknownCommand)]
    fn skipped_lines(#[case] line: &str, #[case] warning: Warning) {
        assert_eq!(one(line), Instruction::Skip(warning));
    }

    #[test]
    fn custom_markers() {
        let m = Markers::new("servo", "wait");
        let s = Script::parse("servo4 30\nwait 250\n舵机4 30", &m);
        assert_eq!(s.motion_count(), 1);
        assert_eq!(s.total_delay_ms(), 250);
        assert_eq!(s.check().len(), 1);
        assert_eq!(s.check()[0].0.number, 3);
    }

    #[test]
    fn comments_only_script_is_empty() {
        let s = Script::parse("# nothing\n\n   \n", &Markers::default());
        assert!(s.is_empty());
        assert!(s.check().is_empty());
        assert_eq!(s.lines().len(), 3);
    }
}
