//! Maps `Box<dyn Error>` from the `Link` boundary to typed `RigError`.
//!
//! `facerig_traits::Link` returns `Box<dyn Error + Send + Sync>` so any
//! transport can plug in; this module converts those to our typed enum, with
//! an optional feature-gated path for `facerig_hardware::LinkError`.

use crate::error::RigError;

/// Map a link-boundary error raised while handling `frame`.
///
/// Attempts to downcast known link error types first, then falls back
/// to string-based heuristics.
pub fn map_link_error(frame: &str, e: &(dyn std::error::Error + 'static)) -> RigError {
    #[cfg(feature = "hardware-errors")]
    {
        use facerig_hardware::error::LinkError;
        if let Some(le) = e.downcast_ref::<LinkError>() {
            return match le {
                LinkError::Timeout => RigError::AckTimeout(frame.to_string()),
                LinkError::Closed => RigError::ConnectionLost("link closed".into()),
                other => RigError::ConnectionLost(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        RigError::AckTimeout(frame.to_string())
    } else {
        RigError::ConnectionLost(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeouts() {
        let e = std::io::Error::other("read timeout on port");
        assert_eq!(
            map_link_error("STATUS", &e),
            RigError::AckTimeout("STATUS".into())
        );
        let e = std::io::Error::other("broken pipe");
        assert!(matches!(
            map_link_error("S1,90", &e),
            RigError::ConnectionLost(_)
        ));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_link_error() {
        let e = facerig_hardware::error::LinkError::Closed;
        assert_eq!(
            map_link_error("JS90", &e),
            RigError::ConnectionLost("link closed".into())
        );
    }
}
