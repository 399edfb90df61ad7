use std::time::{Duration, Instant};

/// Controller state carried between ticks: the last *applied* target and
/// when it was applied. Restart-safe by re-derivation, not persistence —
/// on process restart this simply starts at `(0, None)` and the first
/// tick re-establishes a target from a fresh snapshot.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub previous_target: u64,
    pub last_adjust: Option<Instant>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self {
            previous_target: 0,
            last_adjust: None,
        }
    }

    /// The anti-oscillation gate. Compares the *new* target
    /// against the last *applied* target, not the last observed one —
    /// the property that prevents ratchet drift, since `previous_target`
    /// is only ever updated when an adjustment is actually applied.
    pub fn should_debounce(
        &self,
        target: u64,
        debounce_threshold: i64,
        min_interval: Duration,
        now: Instant,
    ) -> bool {
        let delta = target as i64 - self.previous_target as i64;
        if delta.unsigned_abs() as i64 <= debounce_threshold {
            return true;
        }
        if let Some(last_adjust) = self.last_adjust {
            if now.duration_since(last_adjust) < min_interval {
                return true;
            }
        }
        false
    }

    pub fn record_adjustment(&mut self, target: u64, now: Instant) {
        self.previous_target = target;
        self.last_adjust = Some(now);
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}
