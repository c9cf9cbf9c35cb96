use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use heapless::Vec;
use portable_atomic::{AtomicUsize, Ordering};

use crate::error::BusError;
use crate::factory::BusFactory;
use crate::guard::BusGuard;

/// Identifier of a physical bus, e.g. `1` for `/dev/i2c-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusId(pub u8);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c-{}", self.0)
    }
}

impl From<u8> for BusId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// Phase state machine for one bus.
pub(crate) enum Phase<F: BusFactory> {
    /// Bus is closed; resources are available.
    Idle(F::Resources),
    /// Bus is open and may be lent out.
    Active { bus: F::Bus, destructor: F::Destructor },
    /// Unrecoverable error state (should not normally be reached).
    Poisoned,
}

struct BusSlot<M: RawMutex, F: BusFactory> {
    id: BusId,
    phase: Mutex<M, Phase<F>>,
    holders: AtomicUsize,
}

/// Arbitrates exclusive access to up to `N` buses.
///
/// Buses are registered once at startup, before the arbiter is shared, and
/// then opened explicitly. Each bus has its own lock, so exchanges on
/// different buses never wait on each other.
pub struct BusArbiter<M: RawMutex, F: BusFactory, const N: usize> {
    slots: Vec<BusSlot<M, F>, N>,
}

impl<M: RawMutex, F: BusFactory, const N: usize> Default for BusArbiter<M, F, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, F: BusFactory, const N: usize> BusArbiter<M, F, N> {
    /// Create an arbiter with no buses.
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register a bus and the resources needed to open it.
    pub fn register(
        &mut self,
        id: BusId,
        resources: F::Resources,
    ) -> Result<(), BusError<F::Error>> {
        if self.slots.iter().any(|slot| slot.id == id) {
            return Err(BusError::DuplicateBus(id));
        }
        self.slots
            .push(BusSlot {
                id,
                phase: Mutex::new(Phase::Idle(resources)),
                holders: AtomicUsize::new(0),
            })
            .map_err(|_| BusError::CapacityExceeded)
    }

    fn slot(&self, id: BusId) -> Result<&BusSlot<M, F>, BusError<F::Error>> {
        self.slots
            .iter()
            .find(|slot| slot.id == id)
            .ok_or(BusError::InvalidBus(id))
    }

    /// Open a bus through the factory.
    ///
    /// Opening an already open bus is a no-op. If the factory fails, the
    /// resources are kept so the open can be retried.
    pub async fn open(&self, id: BusId) -> Result<(), BusError<F::Error>> {
        let slot = self.slot(id)?;
        let mut phase = slot.phase.lock().await;

        match core::mem::replace(&mut *phase, Phase::Poisoned) {
            Phase::Idle(resources) => match F::create(resources) {
                Ok((bus, destructor)) => {
                    *phase = Phase::Active { bus, destructor };
                    Ok(())
                }
                Err((err, resources)) => {
                    *phase = Phase::Idle(resources);
                    Err(BusError::FactoryError(err))
                }
            },
            active @ Phase::Active { .. } => {
                *phase = active;
                Ok(())
            }
            Phase::Poisoned => Err(BusError::Poisoned),
        }
    }

    /// Open every registered bus, stopping at the first failure.
    pub async fn open_all(&self) -> Result<(), BusError<F::Error>> {
        for slot in &self.slots {
            self.open(slot.id).await?;
        }
        Ok(())
    }

    /// Acquire exclusive access to an open bus.
    ///
    /// Waits until any current holder drops its guard.
    pub async fn acquire(
        &self,
        id: BusId,
    ) -> Result<BusGuard<'_, M, F>, BusError<F::Error>> {
        let slot = self.slot(id)?;
        let phase = slot.phase.lock().await;

        match &*phase {
            Phase::Active { .. } => {}
            Phase::Idle(_) => return Err(BusError::NotOpen(id)),
            Phase::Poisoned => return Err(BusError::Poisoned),
        }

        slot.holders.fetch_add(1, Ordering::Acquire);
        Ok(BusGuard::new(id, phase, &slot.holders))
    }

    /// Close a bus and recover its resources.
    ///
    /// Waits for the current holder to release the bus first. Closing an
    /// already closed bus is a no-op.
    pub async fn close(&self, id: BusId) -> Result<(), BusError<F::Error>> {
        let slot = self.slot(id)?;
        let mut phase = slot.phase.lock().await;

        match core::mem::replace(&mut *phase, Phase::Poisoned) {
            Phase::Active { bus, destructor } => {
                drop(bus);
                *phase = Phase::Idle(F::recover(destructor));
                Ok(())
            }
            idle @ Phase::Idle(_) => {
                *phase = idle;
                Ok(())
            }
            Phase::Poisoned => Err(BusError::Poisoned),
        }
    }

    /// Close every registered bus, continuing past failures.
    ///
    /// Returns the first failure encountered, if any.
    pub async fn close_all(&self) -> Result<(), BusError<F::Error>> {
        let mut result = Ok(());
        for slot in &self.slots {
            if let Err(e) = self.close(slot.id).await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Returns the number of live guards for a bus (0 or 1).
    ///
    /// Unknown buses report 0.
    pub fn holders(&self, id: BusId) -> usize {
        self.slot(id)
            .map(|slot| slot.holders.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Returns `Some(true)` if open, `Some(false)` if closed, `None` if the
    /// bus is unknown, poisoned, or currently held.
    ///
    /// This is a non-blocking best-effort check using `try_lock`.
    pub fn is_open(&self, id: BusId) -> Option<bool> {
        let slot = self.slot(id).ok()?;
        let phase = slot.phase.try_lock().ok()?;
        match &*phase {
            Phase::Active { .. } => Some(true),
            Phase::Idle(_) => Some(false),
            Phase::Poisoned => None,
        }
    }

    /// Ids of all registered buses, in registration order.
    pub fn bus_ids(&self) -> impl Iterator<Item = BusId> + '_ {
        self.slots.iter().map(|slot| slot.id)
    }
}
