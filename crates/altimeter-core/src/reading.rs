//! Last-known reading shared between the acquisition loop and its consumers

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::{Deserialize, Serialize};

use crate::conversion::{self, RawSample};

/// What caused a reading to be taken.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleSource {
    /// Nothing has been sampled yet
    #[default]
    Unsampled,
    /// The sensor raised its data-ready line
    DataReady,
    /// No edge arrived within the timeout and the registers were read anyway
    Timeout,
}

/// One consistent set of values from a single physical sample.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// Pressure altitude in feet
    pub altitude_ft: i32,
    /// Pressure in hPa
    pub pressure_hpa: f64,
    /// Die temperature in Celsius (precise, but reads warm from board heat)
    pub temperature_c: f64,
    pub source: SampleSource,
}

impl Reading {
    /// Value held before the first sample. All fields read as zero.
    pub const UNSAMPLED: Self = Self {
        altitude_ft: 0,
        pressure_hpa: 0.0,
        temperature_c: 0.0,
        source: SampleSource::Unsampled,
    };

    pub fn from_raw(raw: RawSample, source: SampleSource) -> Self {
        let (altitude_ft, pressure_hpa, temperature_c) = conversion::convert(raw);
        Self {
            altitude_ft,
            pressure_hpa,
            temperature_c,
            source,
        }
    }
}

/// Single-writer, many-reader cell holding the latest [`Reading`].
///
/// Every publish replaces the whole reading under the lock and every read
/// copies the whole reading out under the lock, so readers never observe
/// fields from two different samples.
pub struct ReadingCache {
    latest: Mutex<CriticalSectionRawMutex, Cell<Reading>>,
}

impl ReadingCache {
    pub const fn new() -> Self {
        Self {
            latest: Mutex::new(Cell::new(Reading::UNSAMPLED)),
        }
    }

    pub(crate) fn publish(&self, reading: Reading) {
        self.latest.lock(|latest| latest.set(reading));
    }

    pub fn latest(&self) -> Reading {
        self.latest.lock(|latest| latest.get())
    }

    pub fn altitude_ft(&self) -> i32 {
        self.latest().altitude_ft
    }

    pub fn pressure_hpa(&self) -> f64 {
        self.latest().pressure_hpa
    }

    pub fn temperature_c(&self) -> f64 {
        self.latest().temperature_c
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new()
    }
}
