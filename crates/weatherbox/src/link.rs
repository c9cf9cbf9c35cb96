//! A sensor's handle on the shared bus context.

use std::rc::Rc;

use bus_manager::{BusArbiter, BusFactory, BusGuard, BusId};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::i2c::ErrorType;
use embedded_hal_async::i2c::{I2c, Operation};
use sps30::Sps30;

use crate::error::ExchangeError;
use crate::transport::TokioDelay;

/// Buses a station can arbitrate.
pub const MAX_BUSES: usize = 4;

/// The process-wide bus context. Built once at startup and shared by `Rc`,
/// since every task runs on the same local scheduler.
pub type Arbiter<F> = BusArbiter<NoopRawMutex, F, MAX_BUSES>;

/// A bus held for one logical exchange.
///
/// Released when dropped, including when the holding future is cancelled.
pub struct HeldBus<'a, F: BusFactory> {
    guard: BusGuard<'a, NoopRawMutex, F>,
}

impl<F: BusFactory> ErrorType for HeldBus<'_, F>
where
    F::Bus: I2c,
{
    type Error = <F::Bus as ErrorType>::Error;
}

impl<F: BusFactory> I2c for HeldBus<'_, F>
where
    F::Bus: I2c,
{
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.guard.transaction(address, operations).await
    }
}

/// SPS30 driver bound to a held bus.
pub type Sps30Exchange<'a, F> = Sps30<HeldBus<'a, F>, TokioDelay>;

/// Arbiter handle, bus id, and device address of one sensor.
pub struct I2cLink<F: BusFactory> {
    arbiter: Rc<Arbiter<F>>,
    bus: BusId,
    address: u8,
}

impl<F: BusFactory> Clone for I2cLink<F> {
    fn clone(&self) -> Self {
        Self { arbiter: self.arbiter.clone(), bus: self.bus, address: self.address }
    }
}

impl<F> I2cLink<F>
where
    F: BusFactory,
    F::Bus: I2c,
{
    pub fn new(arbiter: Rc<Arbiter<F>>, bus: BusId, address: u8) -> Self {
        Self { arbiter, bus, address }
    }

    pub fn bus(&self) -> BusId {
        self.bus
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Acquire the bus and bind the SPS30 protocol to it.
    ///
    /// Keep the returned driver only for one logical exchange; the bus stays
    /// locked until it is dropped.
    pub async fn sps30(&self) -> Result<Sps30Exchange<'_, F>, ExchangeError> {
        let guard = self.arbiter.acquire(self.bus).await?;
        Ok(Sps30::with_address(HeldBus { guard }, TokioDelay, self.address))
    }
}
