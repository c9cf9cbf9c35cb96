use core::fmt;

use crate::arbiter::BusId;

/// Errors that can occur during bus operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError<E: fmt::Debug> {
    /// The bus factory failed to open the bus.
    FactoryError(E),
    /// The bus id was never registered with the arbiter.
    InvalidBus(BusId),
    /// The bus is registered but not currently open.
    NotOpen(BusId),
    /// A bus with this id is already registered.
    DuplicateBus(BusId),
    /// The arbiter has no room for another bus.
    CapacityExceeded,
    /// Bus is in an unrecoverable state.
    Poisoned,
}

impl<E: fmt::Debug> fmt::Display for BusError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FactoryError(e) => write!(f, "failed to open bus: {e:?}"),
            Self::InvalidBus(id) => write!(f, "unknown bus {id}"),
            Self::NotOpen(id) => write!(f, "bus {id} is not open"),
            Self::DuplicateBus(id) => write!(f, "bus {id} is already registered"),
            Self::CapacityExceeded => f.write_str("no capacity for another bus"),
            Self::Poisoned => f.write_str("bus is poisoned"),
        }
    }
}
