//! Transport channels: the byte-level I2C buses the arbiter lends out.

use std::time::Duration;

use embedded_hal_async::delay::DelayNs;

/// `DelayNs` backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

impl DelayNs for TokioDelay {
    async fn delay_ns(&mut self, ns: u32) {
        tokio::time::sleep(Duration::from_nanos(u64::from(ns))).await;
    }

    async fn delay_us(&mut self, us: u32) {
        tokio::time::sleep(Duration::from_micros(u64::from(us))).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
    }
}

#[cfg(target_os = "linux")]
pub use linux::{LinuxBusFactory, LinuxI2c};

#[cfg(target_os = "linux")]
mod linux {
    use std::path::PathBuf;

    use bus_manager::BusFactory;
    use embedded_hal::i2c::ErrorType;
    use embedded_hal_async::i2c::{I2c, Operation};
    use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
    use linux_embedded_hal::I2cdev;
    use tracing::debug;

    /// A `/dev/i2c-N` character device.
    ///
    /// Transfers are short and bounded, so they run inline on the
    /// scheduler thread.
    pub struct LinuxI2c {
        dev: I2cdev,
        path: PathBuf,
    }

    impl ErrorType for LinuxI2c {
        type Error = <I2cdev as ErrorType>::Error;
    }

    impl I2c for LinuxI2c {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            embedded_hal::i2c::I2c::transaction(&mut self.dev, address, operations)
        }
    }

    /// Opens a `/dev/i2c-N` device node for the arbiter.
    pub struct LinuxBusFactory;

    impl BusFactory for LinuxBusFactory {
        type Bus = LinuxI2c;
        type Resources = PathBuf;
        type Destructor = PathBuf;
        type Error = LinuxI2CError;

        fn create(
            path: Self::Resources,
        ) -> Result<(Self::Bus, Self::Destructor), (Self::Error, Self::Resources)> {
            match I2cdev::new(&path) {
                Ok(dev) => {
                    debug!(device = %path.display(), "opened I2C bus");
                    Ok((LinuxI2c { dev, path: path.clone() }, path))
                }
                Err(e) => Err((e, path)),
            }
        }

        fn recover(path: Self::Destructor) -> Self::Resources {
            path
        }
    }

    impl Drop for LinuxI2c {
        fn drop(&mut self) {
            debug!(device = %self.path.display(), "closed I2C bus");
        }
    }
}
