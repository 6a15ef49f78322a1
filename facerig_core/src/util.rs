//! Cancellation token and sliced sleeping shared by the runner and the rig.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use facerig_traits::Clock;

/// Cooperative stop flag checked between lines and sleep slices.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sleep `total` in chunks of at most `slice`, checking `cancel` before each.
///
/// Returns `false` if the sleep was cut short. A zero `slice` is treated as
/// one millisecond.
pub fn sleep_sliced(clock: &dyn Clock, total: Duration, slice: Duration, cancel: &CancelToken) -> bool {
    let slice = slice.max(Duration::from_millis(1));
    let mut left = total;
    while !left.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let step = left.min(slice);
        clock.sleep(step);
        left -= step;
    }
    !cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use facerig_traits::ManualClock;

    #[test]
    fn full_sleep_includes_remainder() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert!(sleep_sliced(&clock, Duration::from_millis(250), Duration::from_millis(100), &CancelToken::new()));
        assert_eq!(clock.ms_since(t0), 250);
    }

    #[test]
    fn cancelled_token_stops_before_sleeping() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let token = CancelToken::new();
        token.cancel();
        assert!(!sleep_sliced(&clock, Duration::from_secs(5), Duration::from_millis(100), &token));
        assert_eq!(clock.ms_since(t0), 0);
    }
}
