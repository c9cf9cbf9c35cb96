use std::time::Duration;

use bus_manager::BusFactory;
use chrono::Utc;
use embassy_futures::select::{select, Either};
use embedded_hal_async::i2c::I2c;
use sps30::MeasuredValues;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use super::ParticulateReading;
use crate::error::{DeinitError, ExchangeError};
use crate::history::History;
use crate::link::I2cLink;

/// Shortest period the sampler polls at; shorter requests are raised to it.
pub const MIN_SAMPLING_PERIOD: Duration = Duration::from_millis(10);

/// Local task that keeps the most recent measurements of one SPS30.
///
/// Owns the only writer of its history; callers get read-only receivers.
/// Dropping the sampler cancels it, but only [`stop`](Self::stop) waits for
/// the task to finish.
pub struct BackgroundSampler {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ExchangeError>>,
    history: watch::Receiver<History<ParticulateReading>>,
    _cancel_on_drop: DropGuard,
}

impl BackgroundSampler {
    /// Spawn the sampler on the current `LocalSet`.
    ///
    /// Measurement must already be started on the device. A `period` below
    /// [`MIN_SAMPLING_PERIOD`] is raised to it.
    pub fn spawn<F>(name: &str, link: I2cLink<F>, period: Duration) -> Self
    where
        F: BusFactory + 'static,
        F::Bus: I2c,
    {
        if period < MIN_SAMPLING_PERIOD {
            warn!(
                sensor = %name,
                period_ms = period.as_millis() as u64,
                "sampling period too short, clamped"
            );
        }
        let period = period.max(MIN_SAMPLING_PERIOD);
        let (tx, history) = watch::channel(History::new());
        let cancel = CancellationToken::new();
        let task = tokio::task::spawn_local(sample_task(
            name.to_owned(),
            link,
            period,
            tx,
            cancel.clone(),
        ));

        Self { _cancel_on_drop: cancel.clone().drop_guard(), cancel, task, history }
    }

    pub fn history(&self) -> watch::Receiver<History<ParticulateReading>> {
        self.history.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the task and wait for it to exit.
    ///
    /// The in-flight exchange, if any, is abandoned and stop-measurement is
    /// sent on the way out. No history writes happen after this returns.
    pub async fn stop(self) -> Result<(), DeinitError> {
        let Self { cancel, task, .. } = self;
        cancel.cancel();
        match task.await {
            Ok(result) => result.map_err(DeinitError::from),
            Err(e) => Err(DeinitError::Sampler(e.to_string())),
        }
    }
}

/// One data-ready check and, when ready, one measurement read.
async fn poll_once<F>(link: &I2cLink<F>) -> Result<Option<MeasuredValues>, ExchangeError>
where
    F: BusFactory,
    F::Bus: I2c,
{
    if !link.sps30().await?.read_data_ready_flag().await? {
        return Ok(None);
    }
    let values = link.sps30().await?.read_measured_values().await?;
    Ok(Some(values))
}

async fn sample_task<F>(
    name: String,
    link: I2cLink<F>,
    period: Duration,
    history: watch::Sender<History<ParticulateReading>>,
    cancel: CancellationToken,
) -> Result<(), ExchangeError>
where
    F: BusFactory,
    F::Bus: I2c,
{
    info!(sensor = %name, period_ms = period.as_millis() as u64, "sampler started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence = 0u64;

    loop {
        match select(cancel.cancelled(), async {
            ticker.tick().await;
            poll_once(&link).await
        })
        .await
        {
            Either::First(()) => break,
            Either::Second(Ok(Some(values))) => {
                sequence += 1;
                match values.first_error() {
                    Some(e) => warn!(sensor = %name, sequence, error = %e, "measurement invalid"),
                    None => debug!(sensor = %name, sequence, "measurement"),
                }
                let reading = ParticulateReading { sequence, captured_at: Utc::now(), values };
                history.send_modify(|h| h.push(reading));
            }
            // Not ready yet is routine at short periods.
            Either::Second(Ok(None)) => trace!(sensor = %name, "no new measurement"),
            Either::Second(Err(e)) => warn!(sensor = %name, error = %e, "sampling failed"),
        }
    }

    info!(sensor = %name, "stopping measurement");
    link.sps30().await?.stop_measurement().await?;
    Ok(())
}
