#![no_std]
//! Exclusive access arbitration for shared peripheral buses.
//!
//! A [`BusArbiter`] owns one lock per statically registered bus. Each bus is
//! opened once through a [`BusFactory`] and then lent out to one holder at a
//! time through a scoped [`BusGuard`]. Dropping the guard, whether on a normal
//! return, an error path, or cancellation of the holding future, releases the
//! bus to the next waiter.

mod arbiter;
mod error;
mod factory;
mod guard;

pub use arbiter::{BusArbiter, BusId};
pub use error::BusError;
pub use factory::BusFactory;
pub use guard::BusGuard;
