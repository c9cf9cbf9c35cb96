use std::fmt::Debug;
use std::time::Duration;

use bus_manager::{BusError, BusId};
use derive_more::{Display, From};
use embedded_hal::i2c::{self, ErrorKind};
use sps30::CrcMismatch;

use crate::lifecycle::SensorStatus;

/// Why a bus could not be lent out.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum BusFault {
    #[display("unknown bus {_0}")]
    InvalidBus(BusId),
    #[display("bus {_0} is not open")]
    NotOpen(BusId),
    #[display("bus is poisoned")]
    Poisoned,
    #[display("{_0}")]
    Other(String),
}

impl<E: Debug> From<BusError<E>> for BusFault {
    fn from(err: BusError<E>) -> Self {
        match err {
            BusError::InvalidBus(id) => Self::InvalidBus(id),
            BusError::NotOpen(id) => Self::NotOpen(id),
            BusError::Poisoned => Self::Poisoned,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Failure of one command/response exchange with a device.
#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
pub enum ExchangeError {
    #[display("bus unavailable: {_0}")]
    #[from]
    Bus(BusFault),
    #[display("transport error: {_0}")]
    Transport(ErrorKind),
    #[display("{_0}")]
    #[from]
    Crc(CrcMismatch),
}

impl<E: Debug> From<BusError<E>> for ExchangeError {
    fn from(err: BusError<E>) -> Self {
        Self::Bus(err.into())
    }
}

impl<E: i2c::Error> From<sps30::Error<E>> for ExchangeError {
    fn from(err: sps30::Error<E>) -> Self {
        match err {
            sps30::Error::I2c(e) => Self::Transport(e.kind()),
            sps30::Error::Crc(mismatch) => Self::Crc(mismatch),
        }
    }
}

impl std::error::Error for ExchangeError {}

#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
pub enum InitError {
    #[display("sensor is disabled")]
    Disabled,
    #[display("cannot initialize from state {_0}")]
    InvalidState(SensorStatus),
    #[display("{_0}")]
    #[from]
    Exchange(ExchangeError),
    #[display("no measurement within {}s", _0.as_secs())]
    Timeout(Duration),
    #[display("background sampler exited before the first measurement")]
    SamplerExited,
}

impl<E: i2c::Error> From<sps30::Error<E>> for InitError {
    fn from(err: sps30::Error<E>) -> Self {
        Self::Exchange(err.into())
    }
}

impl std::error::Error for InitError {}

#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
pub enum ReadError {
    #[display("sensor is {_0}, not ready")]
    NotReady(SensorStatus),
    #[display("{_0}")]
    #[from]
    Exchange(ExchangeError),
    /// The data-ready flag stayed clear for the whole read timeout.
    ///
    /// Only an on-demand read reports this. The sampler and `read_and_store`
    /// treat a clear flag as "nothing new yet" and carry on.
    #[display("no new measurement within {}ms", _0.as_millis())]
    Timeout(Duration),
}

impl<E: i2c::Error> From<sps30::Error<E>> for ReadError {
    fn from(err: sps30::Error<E>) -> Self {
        Self::Exchange(err.into())
    }
}

impl std::error::Error for ReadError {}

#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
pub enum DeinitError {
    #[display("{_0}")]
    #[from]
    Exchange(ExchangeError),
    #[display("background sampler failed: {_0}")]
    Sampler(String),
}

impl<E: i2c::Error> From<sps30::Error<E>> for DeinitError {
    fn from(err: sps30::Error<E>) -> Self {
        Self::Exchange(err.into())
    }
}

impl std::error::Error for DeinitError {}

/// Failure to persist a reading.
#[derive(Debug, Display, From)]
pub enum SinkError {
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
    #[display("serialization error: {_0}")]
    Json(serde_json::Error),
}

impl std::error::Error for SinkError {}

#[derive(Debug, Display, From)]
pub enum StoreError {
    #[display("{_0}")]
    Sink(SinkError),
}

impl std::error::Error for StoreError {}
