//! Raw register decoding and conversion to physical units
//!
//! Altitude is ICAO standard *pressure altitude*: it assumes a sea-level
//! pressure of 1013.25 hPa and 15 C, which is what avionics traffic reports
//! carry. It is not height above ground or above local mean sea level.

/// Pressure output counts per hPa.
pub const PRESSURE_COUNTS_PER_HPA: f64 = 4096.0;

/// Temperature output counts per degree Celsius.
pub const TEMPERATURE_COUNTS_PER_DEGREE: f64 = 100.0;

/// International Standard Atmosphere sea-level pressure.
pub const ISA_SEA_LEVEL_HPA: f64 = 1013.25;

// ref https://www.weather.gov/media/epz/wxcalc/pressureAltitude.pdf
const PRESSURE_ALTITUDE_SCALE_FT: f64 = 145_366.45;
const PRESSURE_ALTITUDE_EXPONENT: f64 = 0.190_284;

/// Little-endian signed 24-bit integer, sign-extended.
///
/// # Panics
/// If `bytes` is shorter than three bytes.
pub fn le_i24(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8
}

/// Little-endian signed 16-bit integer.
///
/// # Panics
/// If `bytes` is shorter than two bytes.
pub fn le_i16(bytes: &[u8]) -> i16 {
    i16::from_le_bytes([bytes[0], bytes[1]])
}

/// Pressure and temperature exactly as the result registers hold them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    /// Pressure in 1/4096 hPa
    pub pressure: i32,
    /// Temperature in 1/100 C
    pub temperature: i16,
}

impl RawSample {
    /// Decode a six-byte burst frame. Byte 0 is clocked out during the address
    /// byte and carries no data.
    pub fn from_frame(frame: &[u8; 6]) -> Self {
        Self {
            pressure: le_i24(&frame[1..4]),
            temperature: le_i16(&frame[4..6]),
        }
    }

    pub fn pressure_hpa(&self) -> f64 {
        self.pressure as f64 / PRESSURE_COUNTS_PER_HPA
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature as f64 / TEMPERATURE_COUNTS_PER_DEGREE
    }
}

/// Pressure altitude in feet, truncated toward zero.
///
/// Non-physical (negative) pressures produce NaN internally and come out as 0.
pub fn pressure_altitude_ft(pressure_hpa: f64) -> i32 {
    let ratio = pressure_hpa / ISA_SEA_LEVEL_HPA;
    let altitude =
        PRESSURE_ALTITUDE_SCALE_FT * (1.0 - libm::pow(ratio, PRESSURE_ALTITUDE_EXPONENT));
    altitude as i32
}

/// Convert raw register values into `(altitude_ft, pressure_hpa, temperature_c)`.
pub fn convert(raw: RawSample) -> (i32, f64, f64) {
    let pressure_hpa = raw.pressure_hpa();
    (
        pressure_altitude_ft(pressure_hpa),
        pressure_hpa,
        raw.temperature_c(),
    )
}
