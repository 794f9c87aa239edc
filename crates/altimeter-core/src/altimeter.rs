//! Data-ready driven pressure-altitude acquisition
//!
//! [`Altimeter`] owns the sensor handle, the data-ready pin and the shared
//! [`ReadingCache`]. Split it into a [`Tracker`], which runs the acquisition
//! loop as the cache's only writer, and a [`Readings`] handle that any number
//! of tasks or threads can read from while the tracker runs.
//!
//! ```rust,ignore
//! let mut altimeter = Altimeter::new(spi, data_ready, AltimeterConfig::default());
//! if !altimeter.self_test().await {
//!     warn!("unexpected barometer identity");
//! }
//!
//! let (mut tracker, readings) = altimeter.split();
//! // Hand `readings` to the transmitter, then run forever:
//! tracker.track(&SHUTDOWN).await?;
//! ```

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Timer, with_timeout};
use embedded_hal::digital::Error as _;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::spi::SpiDevice;
use log::{debug, error, info, warn};

use crate::config::AltimeterConfig;
use crate::metrics::{AcquisitionStats, StatsSnapshot};
use crate::reading::{Reading, ReadingCache, SampleSource};
use crate::sensors::{Lps22hb, SensorError};

/// Cooperative stop request for [`Tracker::track`].
///
/// Once signalled it stays signalled.
pub struct Shutdown {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl Shutdown {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Ask the tracker to stop before its next sample.
    pub fn signal(&self) {
        self.signal.signal(());
    }

    pub fn is_signaled(&self) -> bool {
        self.signal.signaled()
    }

    async fn wait(&self) {
        self.signal.wait().await;
        // `wait` consumes the signal; put it back so it stays latched
        self.signal.signal(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// LPS22HB pressure-altitude driver.
///
/// The data-ready pin must already be an input with pull-down bias; the
/// sensor drives it high when a new sample is latched.
pub struct Altimeter<SPI, P> {
    sensor: Lps22hb<SPI>,
    data_ready: P,
    cache: ReadingCache,
    stats: AcquisitionStats,
    config: AltimeterConfig,
}

impl<SPI, P> Altimeter<SPI, P>
where
    SPI: SpiDevice,
    P: Wait,
{
    /// Bind a chip-selected SPI device and the data-ready pin.
    ///
    /// Nothing is sent to the sensor until [`Self::self_test`] or tracking.
    pub fn new(spi: SPI, data_ready: P, config: AltimeterConfig) -> Self {
        Self {
            sensor: Lps22hb::new(spi),
            data_ready,
            cache: ReadingCache::new(),
            stats: AcquisitionStats::new(),
            config,
        }
    }

    /// Check the sensor identity. Safe before configuration.
    pub async fn self_test(&mut self) -> bool {
        self.sensor.self_test().await
    }

    /// Separate the acquisition loop from the read-only accessors.
    pub fn split(&mut self) -> (Tracker<'_, SPI, P>, Readings<'_>) {
        let tracker = Tracker {
            sensor: &mut self.sensor,
            data_ready: &mut self.data_ready,
            cache: &self.cache,
            stats: &self.stats,
            config: &self.config,
        };
        let readings = Readings {
            cache: &self.cache,
            stats: &self.stats,
        };
        (tracker, readings)
    }

    /// Configure the sensor and run the acquisition loop until `shutdown`.
    ///
    /// Use [`Self::split`] instead when readings must be consumed while the
    /// loop runs.
    pub async fn track(&mut self, shutdown: &Shutdown) -> Result<(), SensorError> {
        let (mut tracker, _) = self.split();
        tracker.track(shutdown).await
    }
}

impl<SPI, P> Altimeter<SPI, P> {
    pub fn readings(&self) -> Readings<'_> {
        Readings {
            cache: &self.cache,
            stats: &self.stats,
        }
    }

    pub fn altitude_ft(&self) -> i32 {
        self.cache.altitude_ft()
    }

    pub fn pressure_hpa(&self) -> f64 {
        self.cache.pressure_hpa()
    }

    pub fn temperature_c(&self) -> f64 {
        self.cache.temperature_c()
    }

    pub fn config(&self) -> &AltimeterConfig {
        &self.config
    }

    /// Give back the SPI device and data-ready pin.
    pub fn release(self) -> (SPI, P) {
        (self.sensor.release(), self.data_ready)
    }
}

/// Read-only view of the latest reading. Cheap to copy and share.
#[derive(Clone, Copy)]
pub struct Readings<'a> {
    cache: &'a ReadingCache,
    stats: &'a AcquisitionStats,
}

impl Readings<'_> {
    /// Pressure altitude in feet, 0 before the first sample.
    pub fn altitude_ft(&self) -> i32 {
        self.cache.altitude_ft()
    }

    /// Pressure in hPa, 0 before the first sample.
    pub fn pressure_hpa(&self) -> f64 {
        self.cache.pressure_hpa()
    }

    /// Temperature in Celsius, 0 before the first sample.
    pub fn temperature_c(&self) -> f64 {
        self.cache.temperature_c()
    }

    /// All fields of the latest reading, from the same sample.
    pub fn latest(&self) -> Reading {
        self.cache.latest()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// The acquisition loop: sole writer of the reading cache.
pub struct Tracker<'a, SPI, P> {
    sensor: &'a mut Lps22hb<SPI>,
    data_ready: &'a mut P,
    cache: &'a ReadingCache,
    stats: &'a AcquisitionStats,
    config: &'a AltimeterConfig,
}

impl<SPI, P> Tracker<'_, SPI, P>
where
    SPI: SpiDevice,
    P: Wait,
{
    /// Configure the sensor, then wait for data-ready (or the timeout), read,
    /// convert and publish until `shutdown` is signalled.
    ///
    /// Setup and data-ready pin failures end the loop with an error. A failed
    /// sample read only skips that cycle and backs off.
    pub async fn track(&mut self, shutdown: &Shutdown) -> Result<(), SensorError> {
        info!("altimeter tracking");

        self.sensor.configure().await?;
        self.sensor.clear_result().await?;

        loop {
            let source = match select(shutdown.wait(), self.wait_for_data_ready()).await {
                Either::First(()) => break,
                Either::Second(source) => source?,
            };

            self.acquire(source).await;

            let backoff = self
                .config
                .failure_backoff(self.stats.snapshot().consecutive_failures);
            if backoff.as_ticks() > 0 {
                if let Either::First(()) = select(shutdown.wait(), Timer::after(backoff)).await {
                    break;
                }
            }
        }

        info!("altimeter tracking stopped");
        Ok(())
    }

    /// Wait for a rising data-ready edge, giving up after the configured
    /// timeout so a missed edge cannot stall the loop.
    async fn wait_for_data_ready(&mut self) -> Result<SampleSource, SensorError> {
        let edge = self.data_ready.wait_for_rising_edge();
        match with_timeout(self.config.data_ready_timeout(), edge).await {
            Ok(Ok(())) => Ok(SampleSource::DataReady),
            Ok(Err(e)) => {
                error!("Data-ready wait failed: {:?}", e);
                Err(SensorError::DataReadyFailed {
                    sensor: "LPS22HB",
                    operation: "waiting for data-ready edge",
                    kind: e.kind(),
                })
            }
            Err(_) => Ok(SampleSource::Timeout),
        }
    }

    async fn acquire(&mut self, source: SampleSource) {
        match self.sensor.read_sample().await {
            Ok(raw) => {
                let reading = Reading::from_raw(raw, source);
                self.cache.publish(reading);
                self.stats.record_sample(source);
                debug!(
                    "altimeter: {} ft, {} hPa, {} C ({:?})",
                    reading.altitude_ft, reading.pressure_hpa, reading.temperature_c, source
                );
            }
            Err(e) => {
                let failures = self.stats.record_failure();
                warn!(
                    "altimeter: sample skipped ({} consecutive failures): {}",
                    failures, e
                );
            }
        }
    }
}
