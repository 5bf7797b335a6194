//! Result locking and display hold.

use std::time::{Duration, Instant};

use super::pipeline::ScanResult;

/// Consecutive empty frames before a locked result is dropped.
pub const DEFAULT_LOCK_MISSES: u32 = 2;

/// How long a result stays displayed once it is no longer found.
pub const DEFAULT_RESULT_HOLD: Duration = Duration::from_millis(1500);

/// Follows results across frames.
///
/// The locked result is what the pipeline tries to confirm first on the next
/// frame. The displayed result is what the user sees; it outlives the lock
/// until nothing has been found for the hold period.
#[derive(Debug, Clone)]
pub struct ResultTracker {
    lock_misses: u32,
    result_hold: Duration,
    locked: Option<ScanResult>,
    displayed: Option<ScanResult>,
    misses: u32,
    last_found: Option<Instant>,
}

impl Default for ResultTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_MISSES, DEFAULT_RESULT_HOLD)
    }
}

impl ResultTracker {
    pub fn new(lock_misses: u32, result_hold: Duration) -> Self {
        Self {
            lock_misses: lock_misses.max(1),
            result_hold,
            locked: None,
            displayed: None,
            misses: 0,
            last_found: None,
        }
    }

    pub fn locked(&self) -> Option<&ScanResult> {
        self.locked.as_ref()
    }

    pub fn displayed(&self) -> Option<&ScanResult> {
        self.displayed.as_ref()
    }

    /// Record what a frame showed. Returns `true` if the displayed result changed.
    pub fn observe(&mut self, found: Option<ScanResult>, now: Instant) -> bool {
        match found {
            Some(result) => {
                self.last_found = Some(now);
                self.misses = 0;
                if self.locked.as_ref() != Some(&result) {
                    log::debug!("Locked on {}", result);
                    self.locked = Some(result.clone());
                }
                if self.displayed.as_ref() == Some(&result) {
                    return false;
                }
                self.displayed = Some(result);
                true
            }
            None => {
                if self.locked.is_some() {
                    self.misses += 1;
                    if self.misses >= self.lock_misses {
                        log::debug!("Lock lost after {} misses", self.misses);
                        self.locked = None;
                        self.misses = 0;
                    }
                }
                self.expire(now)
            }
        }
    }

    /// Clear the displayed result if nothing was found for the hold period.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.last_found {
            Some(found_at) if now.saturating_duration_since(found_at) > self.result_hold => {
                self.last_found = None;
                self.displayed.take().is_some()
            }
            _ => false,
        }
    }

    /// Forget everything, e.g. when the camera stops.
    pub fn reset(&mut self) {
        self.locked = None;
        self.displayed = None;
        self.misses = 0;
        self.last_found = None;
    }
}
