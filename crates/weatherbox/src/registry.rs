use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::DeinitError;
use crate::lifecycle::SensorStatus;
use crate::sensor::Sensor;

/// Status snapshot of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub name: String,
    pub status: SensorStatus,
    /// Seconds.
    pub warm_up_time: f32,
    pub error_message: Option<String>,
}

/// The station's sensors, in configuration order.
pub struct SensorRegistry<S> {
    sensors: Vec<S>,
    init_complete: bool,
}

impl<S: Sensor> SensorRegistry<S> {
    pub fn new(sensors: Vec<S>) -> Self {
        Self { sensors, init_complete: false }
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&S> {
        self.sensors.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut S> {
        self.sensors.get_mut(index)
    }

    pub fn sensors(&self) -> &[S] {
        &self.sensors
    }

    /// Initialize every enabled sensor in order.
    ///
    /// A failure is recorded on that sensor and does not stop the rest.
    /// Returns whether every enabled sensor ended `Ready`.
    pub async fn initialize_all(&mut self) -> bool {
        let mut all_ready = true;
        for sensor in &mut self.sensors {
            if sensor.status().0 == SensorStatus::Disabled {
                info!(sensor = sensor.name(), "disabled, skipping");
                continue;
            }
            if let Err(e) = sensor.initialize().await {
                warn!(sensor = sensor.name(), error = %e, "sensor unavailable");
                all_ready = false;
            }
        }
        self.init_complete = all_ready;
        info!(all_ready, "sensor initialization finished");
        all_ready
    }

    /// Whether the last `initialize_all` brought every enabled sensor up.
    pub fn is_initialization_complete(&self) -> bool {
        self.init_complete
    }

    pub fn get_status(&self) -> Vec<SensorReport> {
        self.sensors
            .iter()
            .map(|s| {
                let (status, error_message) = s.status();
                SensorReport {
                    name: s.name().to_owned(),
                    status,
                    warm_up_time: s.warm_up_time().as_secs_f32(),
                    error_message,
                }
            })
            .collect()
    }

    /// Periodic store trigger for the sensor at `index`. Failures are logged.
    pub async fn read_and_store(&mut self, index: usize) {
        let Some(sensor) = self.sensors.get_mut(index) else {
            warn!(index, "no sensor at index");
            return;
        };
        if let Err(e) = sensor.read_and_store().await {
            error!(sensor = sensor.name(), error = %e, "failed to store measurement");
        }
    }

    /// Deinitialize every sensor, collecting failures.
    pub async fn shutdown(&mut self) -> Vec<(String, DeinitError)> {
        let mut failures = Vec::new();
        for sensor in &mut self.sensors {
            if let Err(e) = sensor.deinitialize().await {
                warn!(sensor = sensor.name(), error = %e, "shutdown incomplete");
                failures.push((sensor.name().to_owned(), e));
            }
        }
        self.init_complete = false;
        info!(failures = failures.len(), "sensors shut down");
        failures
    }
}
