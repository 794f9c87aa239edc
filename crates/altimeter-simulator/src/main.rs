//! Desktop simulator for the altimeter-rs driver.
//!
//! Runs `altimeter-core` against a simulated LPS22HB: a register file behind
//! an async SPI bus and chip-select pin, plus a data-ready line that fires at
//! the configured output data rate. The simulated aircraft climbs to about
//! 9,000 ft and back every two minutes, and the interrupt line periodically
//! goes quiet so the driver's timeout path is exercised.
//!
//! Both sides run on the embassy thread executor. Alongside the tracker, a
//! transmitter loop reads the accessor surface once per second and encodes
//! the latest reading with `postcard`.
//!
//! ```text
//! cargo run -p altimeter-simulator -- [run-seconds]
//! RUST_LOG=debug cargo run -p altimeter-simulator
//! ```

use std::convert::Infallible;
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::pin::pin;
use std::time::Instant as StdInstant;
use std::{env, process};

use altimeter_core::{Altimeter, AltimeterConfig, Readings, Shutdown};
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, ErrorKind};
use embedded_hal_async::digital::Wait;
use embedded_hal_async::spi::{SpiBus, SpiDevice};
use embedded_hal_bus::spi::ExclusiveDevice;
use log::{error, info, trace, warn};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Run time when none is given on the command line.
const DEFAULT_RUN_SECS: u64 = 10;

/// Interval between consumer reports.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Length of one climb-and-descend cycle.
const PROFILE_PERIOD_SECS: f64 = 120.0;

/// Peak altitude of the flight profile.
const PROFILE_PEAK_FT: f64 = 9000.0;

/// The data-ready line goes quiet for the last `STUCK_FOR_SECS` of every
/// `STUCK_EVERY_SECS`.
const STUCK_EVERY_SECS: f64 = 8.0;
const STUCK_FOR_SECS: f64 = 1.5;

/// How often an unconfigured sensor is checked for a sample rate.
const POWER_DOWN_POLL: Duration = Duration::from_millis(10);

const READ: u8 = 0x80;
const WHO_AM_I: usize = 0x0F;
const CTRL_REG1: usize = 0x10;
const CTRL_REG2: usize = 0x11;
const CTRL_REG3: usize = 0x12;
const PRESS_OUT_XL: usize = 0x28;
const IF_ADD_INC: u8 = 1 << 4;

// ---------------------------------------------------------------------------
// Sensor model
// ---------------------------------------------------------------------------

/// Register pointer for the transaction in progress.
#[derive(Clone, Copy)]
struct Cursor {
    register: usize,
    read: bool,
}

/// LPS22HB register file and atmosphere.
struct Lps22hbModel {
    registers: [u8; 0x80],
    selected: bool,
    cursor: Option<Cursor>,
    started: StdInstant,
}

type SharedModel = Arc<Mutex<Lps22hbModel>>;

fn lock(model: &SharedModel) -> MutexGuard<'_, Lps22hbModel> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Lps22hbModel {
    fn new() -> Self {
        let mut registers = [0u8; 0x80];
        registers[WHO_AM_I] = 0xB1;
        registers[CTRL_REG2] = IF_ADD_INC;

        Self {
            registers,
            selected: false,
            cursor: None,
            started: StdInstant::now(),
        }
    }

    fn shared() -> SharedModel {
        Arc::new(Mutex::new(Self::new()))
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Output data rate from CTRL_REG1, `None` while powered down.
    fn sample_period(&self) -> Option<Duration> {
        match (self.registers[CTRL_REG1] >> 4) & 0b111 {
            0 => None,
            1 => Some(Duration::from_hz(1)),
            2 => Some(Duration::from_hz(10)),
            3 => Some(Duration::from_hz(25)),
            4 => Some(Duration::from_hz(50)),
            _ => Some(Duration::from_hz(75)),
        }
    }

    fn interrupt_line_stuck(&self, t: f64) -> bool {
        t % STUCK_EVERY_SECS >= STUCK_EVERY_SECS - STUCK_FOR_SECS
    }

    /// Latch a new pressure and temperature sample into the output registers.
    fn latch_sample(&mut self, t: f64) {
        let altitude_ft = PROFILE_PEAK_FT / 2.0 * (1.0 - (TAU * t / PROFILE_PERIOD_SECS).cos());
        let pressure_hpa = 1013.25 * (1.0 - altitude_ft / 145_366.45).powf(1.0 / 0.190_284);
        // 2 C per 1000 ft lapse on top of a warm board
        let temperature_c = 24.0 - altitude_ft * 0.002 + 0.3 * (t / 17.0).sin();

        let pressure = ((pressure_hpa * 4096.0) as i32).to_le_bytes();
        let temperature = ((temperature_c * 100.0) as i16).to_le_bytes();
        self.registers[PRESS_OUT_XL..PRESS_OUT_XL + 3].copy_from_slice(&pressure[..3]);
        self.registers[PRESS_OUT_XL + 3..PRESS_OUT_XL + 5].copy_from_slice(&temperature);

        trace!(
            "sensor latched {:.0} ft / {:.2} hPa / {:.2} C",
            altitude_ft, pressure_hpa, temperature_c
        );
    }

    fn select(&mut self) {
        self.selected = true;
        self.cursor = None;
    }

    fn deselect(&mut self) {
        self.selected = false;
        self.cursor = None;
    }

    /// Exchange one byte: the first byte of a transaction is the address.
    fn clock(&mut self, mosi: u8) -> Result<u8, ErrorKind> {
        if !self.selected {
            return Err(ErrorKind::ChipSelectFault);
        }

        let Some(mut cursor) = self.cursor else {
            self.cursor = Some(Cursor {
                register: (mosi & !READ) as usize,
                read: mosi & READ != 0,
            });
            return Ok(0x00);
        };

        let miso = if cursor.read {
            self.registers[cursor.register]
        } else {
            if (CTRL_REG1..=CTRL_REG3).contains(&cursor.register) {
                self.registers[cursor.register] = mosi;
            }
            0x00
        };

        if self.registers[CTRL_REG2] & IF_ADD_INC != 0 {
            cursor.register = (cursor.register + 1) % self.registers.len();
        }
        self.cursor = Some(cursor);
        Ok(miso)
    }
}

// ---------------------------------------------------------------------------
// Simulated bus and pins
// ---------------------------------------------------------------------------

/// SPI bus wired to the sensor model.
struct SimSpiBus {
    model: SharedModel,
}

impl spi::ErrorType for SimSpiBus {
    type Error = ErrorKind;
}

impl SpiBus<u8> for SimSpiBus {
    async fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut model = lock(&self.model);
        for word in words.iter_mut() {
            *word = model.clock(0x00)?;
        }
        Ok(())
    }

    async fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let mut model = lock(&self.model);
        for word in words {
            model.clock(*word)?;
        }
        Ok(())
    }

    async fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let mut model = lock(&self.model);
        for i in 0..read.len().max(write.len()) {
            let miso = model.clock(write.get(i).copied().unwrap_or(0x00))?;
            if let Some(word) = read.get_mut(i) {
                *word = miso;
            }
        }
        Ok(())
    }

    async fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut model = lock(&self.model);
        for word in words.iter_mut() {
            *word = model.clock(*word)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Active-low chip select of the sensor.
struct SimChipSelect {
    model: SharedModel,
}

impl digital::ErrorType for SimChipSelect {
    type Error = Infallible;
}

impl OutputPin for SimChipSelect {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        lock(&self.model).select();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        lock(&self.model).deselect();
        Ok(())
    }
}

/// INT_DRDY line: rises each time the model latches a sample, except while
/// the line is stuck.
struct SimDataReady {
    model: SharedModel,
}

impl SimDataReady {
    async fn next_edge(&mut self) -> Result<(), Infallible> {
        loop {
            let period = lock(&self.model).sample_period();
            let Some(period) = period else {
                Timer::after(POWER_DOWN_POLL).await;
                continue;
            };
            Timer::after(period).await;

            let mut model = lock(&self.model);
            let t = model.elapsed_secs();
            model.latch_sample(t);
            if model.interrupt_line_stuck(t) {
                trace!("data-ready edge lost at {:.2}s", t);
                continue;
            }
            return Ok(());
        }
    }
}

impl digital::ErrorType for SimDataReady {
    type Error = Infallible;
}

impl Wait for SimDataReady {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// What a downstream transmitter would do with the accessor surface.
fn report(readings: &Readings<'_>) {
    let stats = readings.stats();
    if !stats.has_sample() {
        info!("no sample yet");
        return;
    }

    let reading = readings.latest();
    let mut buffer = [0u8; 32];
    match postcard::to_slice(&reading, &mut buffer) {
        Ok(frame) => info!(
            "{:>6} ft {:>8.2} hPa {:>6.2} C ({:?}) samples={} timeouts={} failures={} frame={:02X?}",
            readings.altitude_ft(),
            readings.pressure_hpa(),
            readings.temperature_c(),
            reading.source,
            stats.samples,
            stats.timeout_samples,
            stats.failures,
            frame
        ),
        Err(e) => warn!("Failed to encode reading: {:?}", e),
    }
}

/// Report once per `REPORT_INTERVAL` for `run_secs`.
async fn transmit(readings: Readings<'_>, run_secs: u64) {
    for _ in 0..run_secs {
        Timer::after(REPORT_INTERVAL).await;
        report(&readings);
    }
}

fn run_secs() -> u64 {
    match env::args().nth(1) {
        None => DEFAULT_RUN_SECS,
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            error!("Invalid run time {:?}, expected whole seconds", arg);
            process::exit(2);
        }),
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let run_secs = run_secs();
    let model = Lps22hbModel::shared();

    let bus = SimSpiBus {
        model: model.clone(),
    };
    let cs = SimChipSelect {
        model: model.clone(),
    };
    // Drives chip select high (idle) before anything is sent
    let Ok(spi) = ExclusiveDevice::new_no_delay(bus, cs);
    let data_ready = SimDataReady { model };

    let mut altimeter = Altimeter::new(spi, data_ready, AltimeterConfig::default());
    info!("Altimeter config: {:?}", altimeter.config());

    if altimeter.self_test().await {
        info!("Self test passed");
    } else {
        warn!("Self test failed: unexpected WHO_AM_I");
    }

    info!("Simulating for {}s", run_secs);

    let shutdown = Shutdown::new();
    let (mut tracker, readings) = altimeter.split();

    let outcome = {
        let mut tracking = pin!(tracker.track(&shutdown));
        match select(tracking.as_mut(), transmit(readings, run_secs)).await {
            Either::First(result) => result,
            Either::Second(()) => {
                shutdown.signal();
                tracking.await
            }
        }
    };

    let stats = altimeter.readings().stats();
    if let Err(e) = outcome {
        error!("Altimeter stopped: {}", e);
        process::exit(1);
    }
    info!(
        "Done: {} samples ({} after timeout), {} failed reads",
        stats.samples, stats.timeout_samples, stats.failures
    );

    // Hand the bus back and confirm the sensor still answers
    let (mut spi, _data_ready) = altimeter.release();
    let mut who_am_i = [0x8F, 0x00];
    match spi.transfer_in_place(&mut who_am_i).await {
        Ok(()) => info!("Released sensor, WHO_AM_I=0x{:02X}", who_am_i[1]),
        Err(e) => warn!("Released sensor did not answer: {:?}", e),
    }

    // The thread executor never returns
    process::exit(0);
}
