use core::ops::{Deref, DerefMut};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::MutexGuard;
use portable_atomic::{AtomicUsize, Ordering};

use crate::arbiter::{BusId, Phase};
use crate::factory::BusFactory;

/// RAII guard providing exclusive access to one open bus.
///
/// Only one guard per bus exists at any instant. Dropping the guard
/// decrements the holder count and then releases the bus lock, so the next
/// waiter never observes a stale holder.
pub struct BusGuard<'a, M: RawMutex, F: BusFactory> {
    id: BusId,
    holders: &'a AtomicUsize,
    phase: MutexGuard<'a, M, Phase<F>>,
}

impl<'a, M: RawMutex, F: BusFactory> BusGuard<'a, M, F> {
    /// Only called by `BusArbiter::acquire` once the phase is known to be active.
    pub(crate) fn new(
        id: BusId,
        phase: MutexGuard<'a, M, Phase<F>>,
        holders: &'a AtomicUsize,
    ) -> Self {
        Self { id, holders, phase }
    }

    /// The bus this guard holds.
    pub fn bus_id(&self) -> BusId {
        self.id
    }
}

impl<M: RawMutex, F: BusFactory> Deref for BusGuard<'_, M, F> {
    type Target = F::Bus;

    #[inline]
    fn deref(&self) -> &F::Bus {
        match &*self.phase {
            Phase::Active { bus, .. } => bus,
            _ => unreachable!("guard issued for a bus that is not open"),
        }
    }
}

impl<M: RawMutex, F: BusFactory> DerefMut for BusGuard<'_, M, F> {
    #[inline]
    fn deref_mut(&mut self) -> &mut F::Bus {
        match &mut *self.phase {
            Phase::Active { bus, .. } => bus,
            _ => unreachable!("guard issued for a bus that is not open"),
        }
    }
}

impl<M: RawMutex, F: BusFactory> Drop for BusGuard<'_, M, F> {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::Release);
    }
}
