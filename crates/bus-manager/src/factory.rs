/// Turns the registered resources of one bus into an open I2C transport and
/// back.
///
/// The arbiter owns the resources between calls and only ever invokes the
/// factory while it holds that bus's lock, so `create` and `recover` never
/// race with a lent [`BusGuard`](crate::BusGuard) or with each other.
pub trait BusFactory {
    /// The open transport lent through guards. Device drivers talk to it
    /// directly, so it normally implements `embedded_hal_async::i2c::I2c`.
    type Bus;
    /// What gets registered: a device node path, a peripheral handle, a
    /// simulated bus.
    type Resources;
    /// Kept next to the open bus; hands the resources back on close.
    type Destructor;
    /// Reason an open failed. Surfaced as `BusError::FactoryError`.
    type Error: core::fmt::Debug;

    /// Called by `open` once per closed-to-open transition.
    ///
    /// On failure the resources must come back unchanged with the error. The
    /// arbiter re-registers them as closed, so a later `open` retries.
    fn create(
        resources: Self::Resources,
    ) -> Result<(Self::Bus, Self::Destructor), (Self::Error, Self::Resources)>;

    /// Called by `close` after the bus has been dropped and no guard is left.
    fn recover(destructor: Self::Destructor) -> Self::Resources;
}
