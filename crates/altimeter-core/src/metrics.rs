//! Acquisition counters
//!
//! Lets consumers see how the loop is doing without touching the readings
//! themselves: how many samples were published, how many of those were
//! forced by the data-ready timeout, and how many cycles were skipped
//! because the bus failed.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::reading::SampleSource;

/// Point-in-time copy of [`AcquisitionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Readings published since start
    pub samples: u32,
    /// Published readings that were taken after a data-ready timeout
    pub timeout_samples: u32,
    /// Cycles skipped because the sample read failed
    pub failures: u32,
    /// Failures since the last successful publish
    pub consecutive_failures: u32,
}

impl StatsSnapshot {
    /// True once at least one reading has been published.
    pub const fn has_sample(&self) -> bool {
        self.samples > 0
    }
}

/// Counters written by the acquisition loop, readable from anywhere.
pub struct AcquisitionStats {
    samples: AtomicU32,
    timeout_samples: AtomicU32,
    failures: AtomicU32,
    consecutive_failures: AtomicU32,
}

impl AcquisitionStats {
    pub const fn new() -> Self {
        Self {
            samples: AtomicU32::new(0),
            timeout_samples: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub(crate) fn record_sample(&self, source: SampleSource) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        if source == SampleSource::Timeout {
            self.timeout_samples.fetch_add(1, Ordering::Relaxed);
        }
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the number of failures in a row, including this one.
    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples: self.samples.load(Ordering::Relaxed),
            timeout_samples: self.timeout_samples.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for AcquisitionStats {
    fn default() -> Self {
        Self::new()
    }
}
