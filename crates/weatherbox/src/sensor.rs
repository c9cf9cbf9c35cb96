use std::time::Duration;

use crate::error::{DeinitError, InitError, ReadError, StoreError};
use crate::lifecycle::SensorStatus;

/// What the registry and the store scheduler need from a sensor.
#[allow(async_fn_in_trait)]
pub trait Sensor {
    type Reading;

    fn name(&self) -> &str;

    /// Current status and the last failure message, if any.
    fn status(&self) -> (SensorStatus, Option<String>);

    fn warm_up_time(&self) -> Duration;

    /// Bring the sensor from `Off` to `Ready`. Ends in `Ready` or `Error`.
    async fn initialize(&mut self) -> Result<(), InitError>;

    /// Take one fresh reading directly from the device.
    async fn read(&mut self) -> Result<Self::Reading, ReadError>;

    /// Persist the newest valid reading that has not been stored yet.
    async fn read_and_store(&mut self) -> Result<(), StoreError>;

    /// Release the device. Always ends in `Off` unless the sensor was
    /// already `Off` or `Disabled`.
    async fn deinitialize(&mut self) -> Result<(), DeinitError>;
}
