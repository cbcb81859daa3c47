//! [`DropoutGuard`] – pose-stream outage detector.
//!
//! Transform lookups are allowed to fail: the loop skips the tick and tries
//! again.  A long run of failures is still worth one warning, though, so an
//! operator can tell "frames not published yet" from "robot driving fine".
//!
//! # Algorithm
//!
//! The guard counts consecutive ticks without a usable pose sample.
//! [`DropoutGuard::record`] returns [`DropoutEvent::OutageStarted`] exactly
//! once, on the tick the streak reaches `threshold`, and
//! [`DropoutEvent::Recovered`] on the first good tick after an outage.
//!
//! # Example
//!
//! ```rust
//! use robomech_runtime::dropout::{DropoutEvent, DropoutGuard};
//!
//! let mut guard = DropoutGuard::new(2);
//!
//! assert_eq!(guard.record(false), DropoutEvent::None);
//! assert_eq!(guard.record(false), DropoutEvent::OutageStarted { missed: 2 });
//! assert_eq!(guard.record(false), DropoutEvent::None); // already reported
//! assert_eq!(guard.record(true), DropoutEvent::Recovered { missed: 3 });
//! ```

/// What the caller should report after a [`DropoutGuard::record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropoutEvent {
    /// Nothing new to report.
    None,
    /// The failure streak just reached the threshold.
    OutageStarted { missed: u64 },
    /// A sample arrived after a reported outage.
    Recovered { missed: u64 },
}

/// Tracks consecutive missed pose samples.
#[derive(Debug, Clone)]
pub struct DropoutGuard {
    /// Streak length that counts as an outage.  `0` disables reporting.
    threshold: u64,
    missed: u64,
    total_missed: u64,
}

impl DropoutGuard {
    /// Create a guard reporting after `threshold` consecutive misses.
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            missed: 0,
            total_missed: 0,
        }
    }

    /// Record whether this tick produced a pose sample.
    pub fn record(&mut self, sample_ok: bool) -> DropoutEvent {
        if sample_ok {
            let missed = std::mem::take(&mut self.missed);
            if self.threshold > 0 && missed >= self.threshold {
                return DropoutEvent::Recovered { missed };
            }
            return DropoutEvent::None;
        }

        self.missed += 1;
        self.total_missed += 1;
        if self.threshold > 0 && self.missed == self.threshold {
            DropoutEvent::OutageStarted {
                missed: self.missed,
            }
        } else {
            DropoutEvent::None
        }
    }

    /// Current streak of missed ticks.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Missed ticks over the guard's lifetime.
    pub fn total_missed(&self) -> u64 {
        self.total_missed
    }

    /// `true` while the current streak is at or past the threshold.
    pub fn in_outage(&self) -> bool {
        self.threshold > 0 && self.missed >= self.threshold
    }
}
