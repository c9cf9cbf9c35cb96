//! Weather station sensor service.
//!
//! Sensors share I2C buses through one [`bus_manager::BusArbiter`] per
//! process. Each SPS30 is brought up through its [`Lifecycle`], then sampled
//! by a local background task into a bounded [`History`]; a
//! [`StoreSchedule`] periodically persists the newest valid reading.

pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod link;
pub mod particulate;
pub mod registry;
pub mod schedule;
pub mod sensor;
pub mod sim;
pub mod sink;
pub mod transport;

pub use config::{Config, ConfigError, SensorKind};
pub use error::{
    BusFault, DeinitError, ExchangeError, InitError, ReadError, SinkError, StoreError,
};
pub use history::{History, HISTORY_CAPACITY};
pub use lifecycle::{Lifecycle, SensorStatus};
pub use link::{Arbiter, I2cLink, MAX_BUSES};
pub use particulate::{
    BackgroundSampler, ParticulateReading, ParticulateRecord, ParticulateSensor,
    ParticulateSettings, MIN_SAMPLING_PERIOD,
};
pub use registry::{SensorRegistry, SensorReport};
pub use schedule::StoreSchedule;
pub use sensor::Sensor;
pub use sink::{JsonLinesSink, PersistenceSink};
