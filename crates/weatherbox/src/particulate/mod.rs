//! SPS30 particulate matter sensor.

mod sampler;

pub use sampler::{BackgroundSampler, MIN_SAMPLING_PERIOD};

use std::time::Duration;

use bus_manager::BusFactory;
use chrono::{DateTime, Utc};
use embedded_hal::i2c;
use embedded_hal_async::i2c::I2c;
use serde::Serialize;
use sps30::{MeasuredValues, StatusRegister};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{DeinitError, ExchangeError, InitError, ReadError, StoreError};
use crate::history::History;
use crate::lifecycle::{Lifecycle, SensorStatus};
use crate::link::I2cLink;
use crate::sensor::Sensor;
use crate::sink::PersistenceSink;

/// One frame as captured by the sampler or by an on-demand read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticulateReading {
    /// Position in the sampler's output, starting at 1. On-demand reads use 0.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub values: MeasuredValues,
}

impl ParticulateReading {
    pub fn is_valid(&self) -> bool {
        self.values.is_valid()
    }
}

/// Flat persisted form of a valid reading.
///
/// `pmXX` fields are mass densities in ug/m3, `ncXX` particle counts in
/// #/cm3, and the typical particle size is in um. `pm10` is PM1.0 and `pm100`
/// is PM10.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticulateRecord {
    pub timestamp: DateTime<Utc>,
    pub pm10: f32,
    pub pm25: f32,
    pub pm40: f32,
    pub pm100: f32,
    pub nc05: f32,
    pub nc10: f32,
    pub nc25: f32,
    pub nc40: f32,
    pub nc100: f32,
    pub typical_particle_size: f32,
}

impl ParticulateRecord {
    /// `None` when any measurement group failed its checksum.
    pub fn from_reading(reading: &ParticulateReading) -> Option<Self> {
        let m = reading.values.measurement()?;
        Some(Self {
            timestamp: reading.captured_at,
            pm10: m.mass_density.pm1_0,
            pm25: m.mass_density.pm2_5,
            pm40: m.mass_density.pm4_0,
            pm100: m.mass_density.pm10,
            nc05: m.particle_count.pm0_5,
            nc10: m.particle_count.pm1_0,
            nc25: m.particle_count.pm2_5,
            nc40: m.particle_count.pm4_0,
            nc100: m.particle_count.pm10,
            typical_particle_size: m.typical_particle_size,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticulateSettings {
    /// Background sampler poll period.
    pub sampling_period: Duration,
    pub warm_up: Duration,
    /// Bound on the wait for the first measurement after start.
    pub init_timeout: Duration,
    /// Bound on an on-demand `read`.
    pub read_timeout: Duration,
    /// Data-ready poll interval of an on-demand `read`.
    pub poll_interval: Duration,
}

impl Default for ParticulateSettings {
    fn default() -> Self {
        Self {
            sampling_period: Duration::from_secs(1),
            warm_up: Duration::from_secs(30),
            init_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// An SPS30 on a shared bus, sampled in the background once initialized.
pub struct ParticulateSensor<F: BusFactory, K> {
    lifecycle: Lifecycle,
    link: I2cLink<F>,
    settings: ParticulateSettings,
    sampler: Option<BackgroundSampler>,
    history: Option<watch::Receiver<History<ParticulateReading>>>,
    sink: K,
    last_stored: u64,
}

impl<F, K> ParticulateSensor<F, K>
where
    F: BusFactory + 'static,
    F::Bus: I2c,
    K: PersistenceSink<ParticulateRecord>,
{
    pub fn new(
        name: impl Into<String>,
        enabled: bool,
        link: I2cLink<F>,
        settings: ParticulateSettings,
        sink: K,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(name, enabled, settings.warm_up),
            link,
            settings,
            sampler: None,
            history: None,
            sink,
            last_stored: 0,
        }
    }

    pub fn link(&self) -> &I2cLink<F> {
        &self.link
    }

    pub fn settings(&self) -> &ParticulateSettings {
        &self.settings
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Receiver on the sampler's history, while one has been started.
    pub fn history(&self) -> Option<watch::Receiver<History<ParticulateReading>>> {
        self.history.clone()
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.as_ref().is_some_and(BackgroundSampler::is_running)
    }

    async fn identify(&self) -> Result<(), ExchangeError> {
        let name = self.lifecycle.name();
        let mut sps = self.link.sps30().await?;

        let firmware = tolerate_crc(name, "firmware version", sps.firmware_version().await)?;
        let product = tolerate_crc(name, "product type", sps.product_type().await)?;
        let status = tolerate_crc(name, "status register", sps.read_status_register().await)?;

        info!(
            sensor = name,
            bus = %self.link.bus(),
            address = self.link.address(),
            firmware = ?firmware.map(|v| v.to_string()),
            product = ?product.as_deref(),
            "identified SPS30"
        );
        if let Some(status) = status.filter(|s| *s != StatusRegister::empty()) {
            let health = status.health();
            warn!(
                sensor = name,
                register = %status.bit_string(),
                speed = health.speed,
                laser = health.laser,
                fan = health.fan,
                "device reports faults"
            );
        }
        Ok(())
    }

    async fn bring_up(&mut self) -> Result<(), InitError> {
        self.identify().await?;
        self.link.sps30().await?.start_measurement().await?;

        // A new sampler numbers its readings from 1 again.
        self.last_stored = 0;
        let sampler = BackgroundSampler::spawn(
            self.lifecycle.name(),
            self.link.clone(),
            self.settings.sampling_period,
        );
        let mut history = sampler.history();
        self.history = Some(history.clone());
        self.sampler = Some(sampler);

        match tokio::time::timeout(
            self.settings.init_timeout,
            history.wait_for(|h| !h.is_empty()),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(InitError::SamplerExited),
            Err(_) => return Err(InitError::Timeout(self.settings.init_timeout)),
        }
        debug!(sensor = self.lifecycle.name(), "first measurement received");

        self.lifecycle.warm_up().await;
        Ok(())
    }

    async fn stop_sampling(&mut self) -> Result<(), DeinitError> {
        match self.sampler.take() {
            Some(sampler) => sampler.stop().await,
            None => {
                self.link.sps30().await?.stop_measurement().await?;
                Ok(())
            }
        }
    }
}

/// Identity reads are informational: a corrupted answer is logged and skipped,
/// a transport failure is not.
fn tolerate_crc<T, E: i2c::Error>(
    sensor: &str,
    what: &str,
    result: Result<T, sps30::Error<E>>,
) -> Result<Option<T>, ExchangeError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(sps30::Error::Crc(mismatch)) => {
            warn!(sensor, what, error = %mismatch, "ignoring corrupted response");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

impl<F, K> Sensor for ParticulateSensor<F, K>
where
    F: BusFactory + 'static,
    F::Bus: I2c,
    K: PersistenceSink<ParticulateRecord>,
{
    type Reading = ParticulateReading;

    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    fn status(&self) -> (SensorStatus, Option<String>) {
        (self.lifecycle.status(), self.lifecycle.error().map(str::to_owned))
    }

    fn warm_up_time(&self) -> Duration {
        self.lifecycle.warm_up_time()
    }

    async fn initialize(&mut self) -> Result<(), InitError> {
        self.lifecycle.begin()?;

        if let Err(e) = self.bring_up().await {
            if self.sampler.is_some() {
                if let Err(stop) = self.stop_sampling().await {
                    warn!(sensor = self.lifecycle.name(), error = %stop, "failed to stop measurement");
                }
            }
            self.lifecycle.fail(&e);
            return Err(e);
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<ParticulateReading, ReadError> {
        if !self.lifecycle.is_ready() {
            return Err(ReadError::NotReady(self.lifecycle.status()));
        }

        let deadline = Instant::now() + self.settings.read_timeout;
        while !self.link.sps30().await?.read_data_ready_flag().await? {
            if Instant::now() >= deadline {
                return Err(ReadError::Timeout(self.settings.read_timeout));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        let values = self.link.sps30().await?.read_measured_values().await?;
        if let Some(e) = values.first_error() {
            warn!(sensor = self.lifecycle.name(), error = %e, "measurement invalid");
        }
        Ok(ParticulateReading { sequence: 0, captured_at: Utc::now(), values })
    }

    async fn read_and_store(&mut self) -> Result<(), StoreError> {
        if !self.lifecycle.is_ready() {
            debug!(sensor = self.lifecycle.name(), status = %self.lifecycle.status(), "not ready, skipping store");
            return Ok(());
        }
        let Some(history) = &self.history else {
            return Ok(());
        };

        let pending = history
            .borrow()
            .iter_newest_first()
            .find(|r| r.is_valid())
            .filter(|r| r.sequence > self.last_stored)
            .and_then(|r| Some((r.sequence, ParticulateRecord::from_reading(r)?)));

        let Some((sequence, record)) = pending else {
            debug!(sensor = self.lifecycle.name(), "no new valid measurement");
            return Ok(());
        };
        self.sink.store(self.lifecycle.name(), &record)?;
        self.last_stored = sequence;
        debug!(sensor = self.lifecycle.name(), sequence, "stored measurement");
        Ok(())
    }

    async fn deinitialize(&mut self) -> Result<(), DeinitError> {
        if matches!(self.lifecycle.status(), SensorStatus::Off | SensorStatus::Disabled) {
            return Ok(());
        }

        let result = self.stop_sampling().await;
        if let Err(e) = &result {
            warn!(sensor = self.lifecycle.name(), error = %e, "failed to stop measurement");
        }
        self.history = None;
        self.lifecycle.shut_down();
        result
    }
}
