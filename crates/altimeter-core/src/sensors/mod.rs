mod lps22hb;

use embedded_hal::{digital, spi};
use thiserror_no_std::Error;

pub use lps22hb::*;

/// Failures surfaced by sensor drivers.
///
/// Concrete bus and pin errors are logged where they happen and reduced to
/// their `embedded-hal` kind here, so the error stays `Copy` and independent
/// of the HAL in use.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed: {kind}")]
    TransferFailed {
        sensor: &'static str,
        operation: &'static str,
        kind: spi::ErrorKind,
    },
    #[error("{sensor}: data-ready pin failed while {operation}: {kind}")]
    DataReadyFailed {
        sensor: &'static str,
        operation: &'static str,
        kind: digital::ErrorKind,
    },
}
