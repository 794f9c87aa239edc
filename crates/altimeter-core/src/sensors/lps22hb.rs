//! LPS22HB register protocol over SPI
//!
//! Places the sensor in continuous 25 Hz acquisition with block data update,
//! auto-incrementing burst reads and the data-ready interrupt routed to the
//! INT_DRDY pin, then reads pressure and temperature in one five-byte burst.

use embedded_hal::spi::Error as _;
use embedded_hal_async::spi::SpiDevice;
use log::{error, info};

use crate::conversion::RawSample;
use crate::sensors::SensorError;

const SENSOR: &str = "LPS22HB";

/// Set in the address byte to read instead of write.
const READ: u8 = 0x80;

/// Register addresses
mod reg {
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL_REG1: u8 = 0x10;
    pub const CTRL_REG2: u8 = 0x11;
    pub const CTRL_REG3: u8 = 0x12;
    /// First of PRESS_OUT_XL, _L, _H, TEMP_OUT_L, _H
    pub const PRESS_OUT_XL: u8 = 0x28;
}

/// Expected WHO_AM_I reply.
pub const WHO_AM_I_VALUE: u8 = 0xB1;

// CTRL_REG1: ODR[6:4] | EN_LPFP | LPFP_CFG | BDU | SIM
const ODR_25_HZ: u8 = 0b011 << 4;
const EN_LPFP: u8 = 1 << 3;
const BDU: u8 = 1 << 1;

// CTRL_REG2: BOOT | FIFO_EN | STOP_ON_FTH | IF_ADD_INC | I2C_DIS | SWRESET | - | ONE_SHOT
const IF_ADD_INC: u8 = 1 << 4;
const I2C_DIS: u8 = 1 << 3;

// CTRL_REG3: INT_H_L | PP_OD | F_FSS5 | F_FTH | F_OVR | DRDY | INT_S[1:0]
const DRDY: u8 = 1 << 2;

/// 25 Hz, low-pass filter at ODR/9, block data update, 4-wire SPI.
pub const CTRL_REG1_VALUE: u8 = ODR_25_HZ | EN_LPFP | BDU;
/// FIFO off, register auto-increment on, I2C interface off.
pub const CTRL_REG2_VALUE: u8 = IF_ADD_INC | I2C_DIS;
/// Active-high push-pull interrupt carrying data-ready.
pub const CTRL_REG3_VALUE: u8 = DRDY;

/// Address byte plus three pressure and two temperature bytes.
pub const SAMPLE_FRAME_LEN: usize = 6;

/// Control register writes issued by [`Lps22hb::configure`], in order.
pub const CONFIGURATION: [[u8; 2]; 3] = [
    [reg::CTRL_REG1, CTRL_REG1_VALUE],
    [reg::CTRL_REG2, CTRL_REG2_VALUE],
    [reg::CTRL_REG3, CTRL_REG3_VALUE],
];

const fn sample_frame() -> [u8; SAMPLE_FRAME_LEN] {
    [READ | reg::PRESS_OUT_XL, 0, 0, 0, 0, 0]
}

/// Whether an identity read frame carries the LPS22HB WHO_AM_I value.
///
/// Byte 0 is clocked out while the address goes in, so the reply is byte 1.
pub fn identity_matches(frame: &[u8]) -> bool {
    frame.get(1) == Some(&WHO_AM_I_VALUE)
}

/// Handle binding an SPI device (and therefore its chip select) to the sensor.
pub struct Lps22hb<SPI> {
    spi: SPI,
}

impl<SPI> Lps22hb<SPI> {
    pub const fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Give back the SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> Lps22hb<SPI> {
    /// Write the control registers for continuous, interrupt-driven sampling.
    pub async fn configure(&mut self) -> Result<(), SensorError> {
        for write in CONFIGURATION.iter() {
            self.spi.write(write).await.map_err(|e| {
                error!(
                    "{} write of 0x{:02X} to register 0x{:02X} failed: {:?}",
                    SENSOR, write[1], write[0], e
                );
                SensorError::TransferFailed {
                    sensor: SENSOR,
                    operation: "write control register",
                    kind: e.kind(),
                }
            })?;
        }

        info!(
            "{}: configured (CTRL1=0x{:02X} CTRL2=0x{:02X} CTRL3=0x{:02X})",
            SENSOR, CTRL_REG1_VALUE, CTRL_REG2_VALUE, CTRL_REG3_VALUE
        );
        Ok(())
    }

    /// Clock zeros through the five result registers.
    ///
    /// This drains whatever sample is latched from power-on and releases the
    /// data-ready line, so the next rising edge marks a fresh sample.
    pub async fn clear_result(&mut self) -> Result<(), SensorError> {
        let mut frame = sample_frame();
        self.exchange(&mut frame, "clear result registers").await
    }

    /// Burst read pressure and temperature from the result registers.
    pub async fn read_sample(&mut self) -> Result<RawSample, SensorError> {
        let mut frame = sample_frame();
        self.exchange(&mut frame, "read result registers").await?;
        Ok(RawSample::from_frame(&frame))
    }

    /// Read WHO_AM_I and compare it to the expected identity.
    ///
    /// Has no side effects and does not require [`Self::configure`] first.
    pub async fn self_test(&mut self) -> bool {
        let mut frame = [READ | reg::WHO_AM_I, 0x00];
        match self.exchange(&mut frame, "read identity register").await {
            Ok(()) => identity_matches(&frame),
            Err(_) => false,
        }
    }

    async fn exchange(
        &mut self,
        frame: &mut [u8],
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.spi.transfer_in_place(frame).await.map_err(|e| {
            error!("{} {} failed: {:?}", SENSOR, operation, e);
            SensorError::TransferFailed {
                sensor: SENSOR,
                operation,
                kind: e.kind(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSpi, block_on};
    use embedded_hal::spi::ErrorKind;
    use std::vec;

    #[test]
    fn test_control_register_values() {
        assert_eq!(CTRL_REG1_VALUE, 0x3A);
        assert_eq!(CTRL_REG2_VALUE, 0x18);
        assert_eq!(CTRL_REG3_VALUE, 0x04);
    }

    #[test]
    fn test_configure_writes_control_registers_in_order() {
        let mut sensor = Lps22hb::new(FakeSpi::new());
        block_on(sensor.configure()).unwrap();

        let spi = sensor.release();
        assert_eq!(
            spi.frames(),
            vec![vec![0x10, 0x3A], vec![0x11, 0x18], vec![0x12, 0x04]]
        );
    }

    #[test]
    fn test_configure_ignores_sensor_responses() {
        let mut spi = FakeSpi::new();
        spi.respond(0x10, &[0xFF, 0xFF]);
        spi.respond(0x11, &[0xEE, 0xEE]);
        let mut sensor = Lps22hb::new(spi);

        block_on(sensor.configure()).unwrap();
        assert_eq!(sensor.release().frames().len(), 3);
    }

    #[test]
    fn test_configure_stops_at_first_failure() {
        let mut spi = FakeSpi::new();
        spi.fail_after(1);
        let mut sensor = Lps22hb::new(spi);

        let err = block_on(sensor.configure()).unwrap_err();
        assert_eq!(
            err,
            SensorError::TransferFailed {
                sensor: "LPS22HB",
                operation: "write control register",
                kind: ErrorKind::Other,
            }
        );
        assert_eq!(sensor.release().frames(), vec![vec![0x10, 0x3A]]);
    }

    #[test]
    fn test_clear_result_clocks_five_zero_bytes() {
        let mut sensor = Lps22hb::new(FakeSpi::new());
        block_on(sensor.clear_result()).unwrap();

        assert_eq!(
            sensor.release().frames(),
            vec![vec![0xA8, 0x00, 0x00, 0x00, 0x00, 0x00]]
        );
    }

    #[test]
    fn test_read_sample_decodes_burst() {
        let mut spi = FakeSpi::new();
        // 1013.25 hPa, 21.50 C
        spi.respond(0xA8, &[0x00, 0x00, 0x54, 0x3F, 0x66, 0x08]);
        let mut sensor = Lps22hb::new(spi);

        let raw = block_on(sensor.read_sample()).unwrap();
        assert_eq!(raw.pressure, 4_150_272);
        assert_eq!(raw.temperature, 2150);
    }

    #[test]
    fn test_read_sample_reports_transfer_failure() {
        let mut spi = FakeSpi::new();
        spi.fail_after(0);
        let mut sensor = Lps22hb::new(spi);

        let err = block_on(sensor.read_sample()).unwrap_err();
        assert!(matches!(
            err,
            SensorError::TransferFailed {
                operation: "read result registers",
                ..
            }
        ));
    }

    #[test]
    fn test_self_test_accepts_expected_identity() {
        let mut spi = FakeSpi::new();
        spi.respond(0x8F, &[0x00, 0xB1]);
        let mut sensor = Lps22hb::new(spi);

        assert!(block_on(sensor.self_test()));
        assert_eq!(sensor.release().frames(), vec![vec![0x8F, 0x00]]);
    }

    #[test]
    fn test_self_test_rejects_other_identity() {
        let mut spi = FakeSpi::new();
        spi.respond(0x8F, &[0x00, 0xBD]);
        let mut sensor = Lps22hb::new(spi);

        assert!(!block_on(sensor.self_test()));
    }

    #[test]
    fn test_self_test_is_false_on_transfer_failure() {
        let mut spi = FakeSpi::new();
        spi.fail_after(0);
        let mut sensor = Lps22hb::new(spi);

        assert!(!block_on(sensor.self_test()));
    }

    #[test]
    fn test_identity_matches_needs_second_byte() {
        assert!(identity_matches(&[0x00, 0xB1]));
        assert!(identity_matches(&[0xB1, 0xB1, 0x00]));
        assert!(!identity_matches(&[0xB1]));
        assert!(!identity_matches(&[]));
        assert!(!identity_matches(&[0x00, 0x00]));
    }
}
