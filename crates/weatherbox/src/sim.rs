//! In-process SPS30 simulator.
//!
//! Runs the station without hardware (`--simulate`) and lets tests script
//! device behavior: data-ready latency, corrupted packets, transport
//! failures. Everything here is single-threaded; handles share state
//! through `Rc<RefCell<_>>`.

use std::cell::RefCell;
use std::rc::Rc;

use bus_manager::BusFactory;
use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource};
use embedded_hal_async::i2c::{I2c, Operation};
use sps30::packet::{pack, unpack, PACKET_LEN};
use sps30::{Command, MassDensity, Measurement, ParticleCount, DEFAULT_ADDRESS};

/// Measurement the simulator reports until told otherwise.
pub const SIM_MEASUREMENT: Measurement = Measurement {
    mass_density: MassDensity { pm1_0: 2.125, pm2_5: 3.5, pm4_0: 4.25, pm10: 4.5 },
    particle_count: ParticleCount {
        pm0_5: 14.0,
        pm1_0: 16.5,
        pm2_5: 16.625,
        pm4_0: 16.75,
        pm10: 17.0,
    },
    typical_particle_size: 0.625,
};

struct DeviceState {
    address: u8,
    measuring: bool,
    /// Not-ready answers before each new measurement.
    not_ready_polls: u32,
    pending_polls: u32,
    measurement: Measurement,
    response: Option<Vec<u8>>,
    corruptions: Vec<(Command, usize)>,
    failures: u32,
    offline: bool,
    commands: Vec<Command>,
    auto_cleaning_secs: u32,
    status: u32,
    firmware: (u8, u8),
    product_type: &'static [u8; 8],
    serial: &'static str,
}

/// Handle on one simulated SPS30. Clones share the same device.
#[derive(Clone)]
pub struct SimulatedSps30 {
    state: Rc<RefCell<DeviceState>>,
}

impl Default for SimulatedSps30 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSps30 {
    pub fn new() -> Self {
        Self::with_address(DEFAULT_ADDRESS)
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            state: Rc::new(RefCell::new(DeviceState {
                address,
                measuring: false,
                not_ready_polls: 0,
                pending_polls: 0,
                measurement: SIM_MEASUREMENT,
                response: None,
                corruptions: Vec::new(),
                failures: 0,
                offline: false,
                commands: Vec::new(),
                auto_cleaning_secs: 604_800,
                status: 0,
                firmware: (2, 3),
                product_type: b"00080000",
                serial: "SIM0000000000001",
            })),
        }
    }

    pub fn address(&self) -> u8 {
        self.state.borrow().address
    }

    /// Answer "not ready" this many times before each new measurement.
    pub fn set_not_ready_polls(&self, polls: u32) {
        let mut state = self.state.borrow_mut();
        state.not_ready_polls = polls;
        state.pending_polls = polls;
    }

    pub fn set_measurement(&self, measurement: Measurement) {
        self.state.borrow_mut().measurement = measurement;
    }

    pub fn set_status_register(&self, status: u32) {
        self.state.borrow_mut().status = status;
    }

    /// Flip the byte at `offset` of the next response to `command`.
    pub fn corrupt_next(&self, command: Command, offset: usize) {
        self.state.borrow_mut().corruptions.push((command, offset));
    }

    /// Fail the next `count` transfers with a bus error.
    pub fn fail_next(&self, count: u32) {
        self.state.borrow_mut().failures = count;
    }

    /// While offline the device never acknowledges its address.
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    pub fn is_measuring(&self) -> bool {
        self.state.borrow().measuring
    }

    /// Every command received, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    pub fn count(&self, command: Command) -> usize {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|c| **c == command)
            .count()
    }
}

impl DeviceState {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data);
        let [hi, lo] = [*bytes.first().ok_or(nack)?, *bytes.get(1).ok_or(nack)?];
        let command = Command::from_opcode(u16::from_be_bytes([hi, lo])).ok_or(nack)?;
        let args = &bytes[2..];
        self.commands.push(command);
        self.response = None;

        let words: Vec<u16> = match command {
            Command::StartMeasurement => {
                if args.len() != PACKET_LEN {
                    return Err(nack);
                }
                unpack::<2>(args, 2).map_err(|_| nack)?;
                self.measuring = true;
                self.pending_polls = self.not_ready_polls;
                vec![]
            }
            Command::StopMeasurement | Command::Reset => {
                self.measuring = false;
                vec![]
            }
            Command::ReadDataReadyFlag => {
                let ready = if !self.measuring {
                    false
                } else if self.pending_polls > 0 {
                    self.pending_polls -= 1;
                    false
                } else {
                    true
                };
                vec![u16::from(ready)]
            }
            Command::ReadMeasuredValues => {
                if !self.measuring {
                    return Err(nack);
                }
                self.pending_polls = self.not_ready_polls;
                self.response = Some(self.measurement.to_frame().to_vec());
                self.apply_corruption(command);
                return Ok(());
            }
            Command::AutoCleaningInterval => {
                if !args.is_empty() {
                    if args.len() != 2 * PACKET_LEN {
                        return Err(nack);
                    }
                    let data = unpack::<4>(args, 2).map_err(|_| nack)?;
                    self.auto_cleaning_secs = u32::from_be_bytes(data);
                }
                let secs = self.auto_cleaning_secs;
                vec![(secs >> 16) as u16, secs as u16]
            }
            Command::ProductType => self
                .product_type
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect(),
            Command::SerialNumber => {
                let mut padded = [0u8; 32];
                let serial = self.serial.as_bytes();
                let len = serial.len().min(padded.len());
                padded[..len].copy_from_slice(&serial[..len]);
                padded
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect()
            }
            Command::FirmwareVersion => {
                vec![u16::from_be_bytes([self.firmware.0, self.firmware.1])]
            }
            Command::ReadStatusRegister => {
                vec![(self.status >> 16) as u16, self.status as u16]
            }
            Command::ClearStatusRegister => {
                self.status = 0;
                vec![]
            }
            Command::Sleep | Command::WakeUp | Command::StartFanCleaning => vec![],
        };

        if command.response_len() > 0 {
            self.response = Some(words.iter().flat_map(|w| pack(*w)).collect());
            self.apply_corruption(command);
        }
        Ok(())
    }

    fn apply_corruption(&mut self, command: Command) {
        let Some(i) = self.corruptions.iter().position(|(c, _)| *c == command) else {
            return;
        };
        let (_, offset) = self.corruptions.remove(i);
        if let Some(byte) = self.response.as_mut().and_then(|r| r.get_mut(offset)) {
            *byte ^= 0xFF;
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        let response = self
            .response
            .take()
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data))?;
        if response.len() < buf.len() {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }
        buf.copy_from_slice(&response[..buf.len()]);
        Ok(())
    }
}

/// A simulated bus with any number of SPS30s on it.
#[derive(Clone, Default)]
pub struct SimulatedBus {
    devices: Vec<SimulatedSps30>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: SimulatedSps30) -> Self {
        self.devices.push(device);
        self
    }
}

impl ErrorType for SimulatedBus {
    type Error = ErrorKind;
}

impl I2c for SimulatedBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let device = self
            .devices
            .iter()
            .find(|d| d.address() == address)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;
        let mut state = device.state.borrow_mut();

        for op in operations {
            if state.offline {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            if state.failures > 0 {
                state.failures -= 1;
                return Err(ErrorKind::Bus);
            }
            match op {
                Operation::Write(bytes) => state.write(bytes)?,
                Operation::Read(buf) => state.read(buf)?,
            }
        }
        Ok(())
    }
}

/// Hands simulated buses to the arbiter.
pub struct SimFactory;

impl BusFactory for SimFactory {
    type Bus = SimulatedBus;
    type Resources = SimulatedBus;
    type Destructor = SimulatedBus;
    type Error = ErrorKind;

    fn create(
        bus: Self::Resources,
    ) -> Result<(Self::Bus, Self::Destructor), (Self::Error, Self::Resources)> {
        Ok((bus.clone(), bus))
    }

    fn recover(bus: Self::Destructor) -> Self::Resources {
        bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokioDelay;
    use sps30::Sps30;

    #[tokio::test(start_paused = true)]
    async fn answers_identity_commands() {
        let device = SimulatedSps30::new();
        let mut sps = Sps30::new(SimulatedBus::new().with_device(device.clone()), TokioDelay);

        assert_eq!(sps.firmware_version().await.unwrap().to_string(), "2.3");
        assert_eq!(sps.product_type().await.unwrap().as_str(), "00080000");
        assert_eq!(sps.serial_number().await.unwrap().as_str(), "SIM0000000000001");
        assert_eq!(sps.read_auto_cleaning_interval().await.unwrap(), 604_800);
        assert_eq!(
            device.commands(),
            vec![
                Command::FirmwareVersion,
                Command::ProductType,
                Command::SerialNumber,
                Command::AutoCleaningInterval
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn data_ready_follows_the_scripted_latency() {
        let device = SimulatedSps30::new();
        device.set_not_ready_polls(2);
        let mut sps = Sps30::new(SimulatedBus::new().with_device(device.clone()), TokioDelay);

        assert!(!sps.read_data_ready_flag().await.unwrap());
        sps.start_measurement().await.unwrap();
        assert!(!sps.read_data_ready_flag().await.unwrap());
        assert!(!sps.read_data_ready_flag().await.unwrap());
        assert!(sps.read_data_ready_flag().await.unwrap());

        let values = sps.read_measured_values().await.unwrap();
        assert_eq!(values.measurement(), Some(SIM_MEASUREMENT));
        assert!(!sps.read_data_ready_flag().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_address_is_not_acknowledged() {
        let mut sps = Sps30::with_address(SimulatedBus::new(), TokioDelay, 0x42);
        assert_eq!(
            sps.firmware_version().await.unwrap_err(),
            sps30::Error::I2c(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        );
    }
}
