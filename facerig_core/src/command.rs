//! Wire commands understood by the servo controller board.
//!
//! Frames are newline-terminated ASCII:
//!
//! | command            | frame                         |
//! |--------------------|-------------------------------|
//! | single channel     | `S<id>,<angle>`               |
//! | batch              | `S<id>,<angle>;<id>,<angle>`  |
//! | jaw sync           | `JS<angle>`                   |
//! | neutral all        | `RESET`                       |
//! | diagnostics        | `STATUS`, `HELP`              |

use std::fmt;

use crate::registry::MAX_ANGLE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Single { channel: u8, angle: u8 },
    Batch(Vec<(u8, u8)>),
    /// Board-side mirrored move of the jaw pair to a logical angle.
    JawSync(u8),
    Reset,
    Status,
    Help,
}

impl Command {
    /// Frame bytes including the trailing newline.
    pub fn encode(&self) -> Vec<u8> {
        let mut s = self.to_string();
        s.push('\n');
        s.into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single { channel, angle } => write!(f, "S{channel},{}", (*angle).min(MAX_ANGLE)),
            Self::Batch(pairs) => {
                f.write_str("S")?;
                for (i, (ch, a)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{ch},{}", (*a).min(MAX_ANGLE))?;
                }
                Ok(())
            }
            Self::JawSync(a) => write!(f, "JS{}", (*a).min(MAX_ANGLE)),
            Self::Reset => f.write_str("RESET"),
            Self::Status => f.write_str("STATUS"),
            Self::Help => f.write_str("HELP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Command::Single { channel: 3, angle: 45 }, "S3,45\n")]
    #[case(Command::Batch(vec![(2, 79), (3, 55)]), "S2,79;3,55\n")]
    #[case(Command::Batch(vec![(12, 200), (14, 0)]), "S12,180;14,0\n")]
    #[case(Command::JawSync(120), "JS120\n")]
    #[case(Command::Reset, "RESET\n")]
    #[case(Command::Status, "STATUS\n")]
    #[case(Command::Help, "HELP\n")]
    fn encodes_wire_frames(#[case] cmd: Command, #[case] expected: &str) {
        assert_eq!(String::from_utf8(cmd.encode()).unwrap(), expected);
    }
}
