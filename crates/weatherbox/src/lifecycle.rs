//! Readiness state machine shared by every sensor kind.

use std::time::Duration;

use derive_more::Display;
use serde::Serialize;
use tracing::{error, info};

use crate::error::InitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    #[display("disabled")]
    Disabled,
    #[display("off")]
    Off,
    #[display("initializing")]
    Initializing,
    #[display("warming_up")]
    WarmingUp,
    #[display("ready")]
    Ready,
    #[display("error")]
    Error,
}

/// Status plus the last failure message of one sensor.
///
/// Transitions:
///
/// ```text
/// Off -> Initializing -> [WarmingUp ->] Ready
///        Initializing | WarmingUp -> Error
///        Ready | Error -> Off
/// Disabled (terminal)
/// ```
#[derive(Debug, Clone)]
pub struct Lifecycle {
    name: String,
    status: SensorStatus,
    error: Option<String>,
    warm_up: Duration,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>, enabled: bool, warm_up: Duration) -> Self {
        Self {
            name: name.into(),
            status: if enabled { SensorStatus::Off } else { SensorStatus::Disabled },
            error: None,
            warm_up,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SensorStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn warm_up_time(&self) -> Duration {
        self.warm_up
    }

    pub fn is_ready(&self) -> bool {
        self.status == SensorStatus::Ready
    }

    /// `Off -> Initializing`. Clears any previous error.
    pub fn begin(&mut self) -> Result<(), InitError> {
        match self.status {
            SensorStatus::Off => {
                info!(sensor = %self.name, "initializing");
                self.status = SensorStatus::Initializing;
                self.error = None;
                Ok(())
            }
            SensorStatus::Disabled => Err(InitError::Disabled),
            other => Err(InitError::InvalidState(other)),
        }
    }

    /// `Initializing -> [WarmingUp ->] Ready`.
    ///
    /// Sleeps for the warm-up duration when it is nonzero.
    pub async fn warm_up(&mut self) {
        debug_assert_eq!(self.status, SensorStatus::Initializing);
        if !self.warm_up.is_zero() {
            self.status = SensorStatus::WarmingUp;
            info!(sensor = %self.name, secs = self.warm_up.as_secs_f32(), "warming up");
            tokio::time::sleep(self.warm_up).await;
        }
        self.status = SensorStatus::Ready;
        info!(sensor = %self.name, "ready");
    }

    /// `Initializing | WarmingUp -> Error`, recording the message.
    pub fn fail(&mut self, err: &impl std::fmt::Display) {
        let message = err.to_string();
        error!(sensor = %self.name, error = %message, "initialization failed");
        self.status = SensorStatus::Error;
        self.error = Some(message);
    }

    /// `Ready | Error -> Off`. Returns false if there was nothing to shut down.
    pub fn shut_down(&mut self) -> bool {
        match self.status {
            SensorStatus::Ready | SensorStatus::Error => {
                self.status = SensorStatus::Off;
                info!(sensor = %self.name, "off");
                true
            }
            // An interrupted initialization still has to release the device.
            SensorStatus::Initializing | SensorStatus::WarmingUp => {
                self.status = SensorStatus::Off;
                true
            }
            SensorStatus::Off | SensorStatus::Disabled => false,
        }
    }
}
