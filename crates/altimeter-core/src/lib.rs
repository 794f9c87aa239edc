//! Hardware-independent core library for altimeter-rs
//!
//! This crate contains the platform-agnostic pressure-altitude driver for an
//! LPS22HB barometer on SPI: register protocol, raw sample conversion, the
//! data-ready driven acquisition loop and the shared last-known reading that
//! other parts of an avionics aggregator consume.
//!
//! It is `#![no_std]` and allocation free so it compiles on both embedded
//! targets and desktop hosts (for the simulator and tests).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod altimeter;
pub mod config;
pub mod conversion;
pub mod metrics;
pub mod reading;
pub mod sensors;

#[cfg(test)]
pub(crate) mod testing;

pub use altimeter::{Altimeter, Readings, Shutdown, Tracker};
pub use config::AltimeterConfig;
pub use metrics::StatsSnapshot;
pub use reading::{Reading, SampleSource};
pub use sensors::{Lps22hb, SensorError};
