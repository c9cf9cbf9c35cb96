#![cfg_attr(not(test), no_std)]
//! Async driver for the Sensirion SPS30 particulate matter sensor over I2C.
//!
//! Every command is a 2-byte opcode, optionally followed by CRC-protected
//! argument words. Responses are runs of `[hi, lo, crc]` packets. Measured
//! values use the big-endian float output format.

use core::fmt;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

pub mod commands;
pub mod errors;
pub mod float;
pub mod measurement;
pub mod packet;
pub mod status;

pub use commands::{Command, CommandFrame};
pub use errors::Error;
pub use measurement::{
    MassDensity, MeasuredValues, Measurement, ParticleCount, MEASUREMENT_FRAME_LEN,
};
pub use packet::{crc8, CrcMismatch};
pub use status::{DeviceHealth, StatusRegister};

/// Factory default I2C address.
pub const DEFAULT_ADDRESS: u8 = 0x69;

/// Settle time after start measurement and after writing the cleaning interval.
const SETTLE_MS: u32 = 50;

const SECONDS_PER_DAY: u32 = 86_400;

/// Firmware version as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Product type string, e.g. `"00080000"`.
pub type ProductType = heapless::String<8>;
/// Serial number string, up to 32 characters.
pub type SerialNumber = heapless::String<32>;

fn ascii<const N: usize>(data: &[u8]) -> heapless::String<N> {
    let mut s = heapless::String::new();
    for &b in data.iter().take_while(|&&b| b != 0) {
        let _ = s.push(if b.is_ascii() { char::from(b) } else { '?' });
    }
    s
}

pub struct Sps30<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> Sps30<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self { i2c, delay, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give back the bus and delay.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    async fn send(&mut self, frame: &CommandFrame) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write(self.address, frame.as_bytes())
            .await
            .map_err(Error::I2c)
    }

    /// Write a bare command and read `R` raw response bytes.
    async fn query<const R: usize>(
        &mut self,
        command: Command,
    ) -> Result<[u8; R], Error<I2C::Error>> {
        debug_assert_eq!(command.response_len(), R);
        self.send(&command.into()).await?;
        let mut raw = [0u8; R];
        self.i2c
            .read(self.address, &mut raw)
            .await
            .map_err(Error::I2c)?;
        Ok(raw)
    }

    /// Like [`query`](Self::query), then verify and strip every CRC.
    async fn query_data<const R: usize, const N: usize>(
        &mut self,
        command: Command,
    ) -> Result<[u8; N], Error<I2C::Error>> {
        let raw = self.query::<R>(command).await?;
        Ok(packet::unpack::<N>(&raw, 0)?)
    }

    /// Start continuous measurement with float output.
    pub async fn start_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&CommandFrame::start_measurement()).await?;
        self.delay.delay_ms(SETTLE_MS).await;
        Ok(())
    }

    pub async fn stop_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&Command::StopMeasurement.into()).await
    }

    /// Whether a new measurement is available.
    pub async fn read_data_ready_flag(&mut self) -> Result<bool, Error<I2C::Error>> {
        let data = self.query_data::<3, 2>(Command::ReadDataReadyFlag).await?;
        Ok(data[1] & 0x01 == 0x01)
    }

    /// Read one measurement frame.
    ///
    /// Checksum failures do not fail the read; they void the affected group
    /// in the returned [`MeasuredValues`].
    pub async fn read_measured_values(
        &mut self,
    ) -> Result<MeasuredValues, Error<I2C::Error>> {
        let raw = self
            .query::<MEASUREMENT_FRAME_LEN>(Command::ReadMeasuredValues)
            .await?;
        Ok(MeasuredValues::decode(&raw))
    }

    pub async fn sleep(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&Command::Sleep.into()).await
    }

    pub async fn wake_up(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&Command::WakeUp.into()).await
    }

    pub async fn start_fan_cleaning(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&Command::StartFanCleaning.into()).await
    }

    /// Auto-cleaning interval, in seconds.
    pub async fn read_auto_cleaning_interval(&mut self) -> Result<u32, Error<I2C::Error>> {
        let data = self
            .query_data::<6, 4>(Command::AutoCleaningInterval)
            .await?;
        Ok(u32::from_be_bytes(data))
    }

    /// Set the auto-cleaning interval in seconds and return the value read back.
    pub async fn write_auto_cleaning_interval(
        &mut self,
        seconds: u32,
    ) -> Result<u32, Error<I2C::Error>> {
        self.send(&CommandFrame::write_auto_cleaning_interval(seconds))
            .await?;
        self.delay.delay_ms(SETTLE_MS).await;
        self.read_auto_cleaning_interval().await
    }

    /// Set the auto-cleaning interval in whole days.
    pub async fn write_auto_cleaning_interval_days(
        &mut self,
        days: u32,
    ) -> Result<u32, Error<I2C::Error>> {
        self.write_auto_cleaning_interval(days.saturating_mul(SECONDS_PER_DAY))
            .await
    }

    pub async fn product_type(&mut self) -> Result<ProductType, Error<I2C::Error>> {
        let data = self.query_data::<12, 8>(Command::ProductType).await?;
        Ok(ascii(&data))
    }

    pub async fn serial_number(&mut self) -> Result<SerialNumber, Error<I2C::Error>> {
        let data = self.query_data::<48, 32>(Command::SerialNumber).await?;
        Ok(ascii(&data))
    }

    pub async fn firmware_version(&mut self) -> Result<FirmwareVersion, Error<I2C::Error>> {
        let [major, minor] = self.query_data::<3, 2>(Command::FirmwareVersion).await?;
        Ok(FirmwareVersion { major, minor })
    }

    pub async fn read_status_register(
        &mut self,
    ) -> Result<StatusRegister, Error<I2C::Error>> {
        let data = self.query_data::<6, 4>(Command::ReadStatusRegister).await?;
        Ok(StatusRegister::from_bits_retain(u32::from_be_bytes(data)))
    }

    pub async fn clear_status_register(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&Command::ClearStatusRegister.into()).await
    }

    pub async fn reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.send(&Command::Reset.into()).await
    }
}
