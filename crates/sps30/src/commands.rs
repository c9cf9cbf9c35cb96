use heapless::Vec;

use crate::packet::{pack, PACKET_LEN};

/// Output format selector sent with [`Command::StartMeasurement`]: big-endian IEEE-754 floats.
pub const FLOAT_OUTPUT_FORMAT: u16 = 0x0300;

/// Longest frame the host ever sends: opcode plus two data packets.
pub const MAX_FRAME_LEN: usize = 2 + 2 * PACKET_LEN;

/// SPS30 I2C command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    StartMeasurement,
    StopMeasurement,
    ReadDataReadyFlag,
    ReadMeasuredValues,
    Sleep,
    WakeUp,
    StartFanCleaning,
    /// Read or, with a data word pair, write the auto-cleaning interval.
    AutoCleaningInterval,
    ProductType,
    SerialNumber,
    FirmwareVersion,
    ReadStatusRegister,
    ClearStatusRegister,
    Reset,
}

impl Command {
    pub const fn opcode(self) -> u16 {
        match self {
            Self::StartMeasurement => 0x0010,
            Self::StopMeasurement => 0x0104,
            Self::ReadDataReadyFlag => 0x0202,
            Self::ReadMeasuredValues => 0x0300,
            Self::Sleep => 0x1001,
            Self::WakeUp => 0x1103,
            Self::StartFanCleaning => 0x5607,
            Self::AutoCleaningInterval => 0x8004,
            Self::ProductType => 0xD002,
            Self::SerialNumber => 0xD033,
            Self::FirmwareVersion => 0xD100,
            Self::ReadStatusRegister => 0xD206,
            Self::ClearStatusRegister => 0xD210,
            Self::Reset => 0xD304,
        }
    }

    /// Number of response bytes (data plus CRC) the command produces.
    ///
    /// Zero for write-only commands.
    pub const fn response_len(self) -> usize {
        match self {
            Self::ReadDataReadyFlag => 3,
            Self::ReadMeasuredValues => 60,
            Self::AutoCleaningInterval => 6,
            Self::ProductType => 12,
            Self::SerialNumber => 48,
            Self::FirmwareVersion => 3,
            Self::ReadStatusRegister => 6,
            Self::StartMeasurement
            | Self::StopMeasurement
            | Self::Sleep
            | Self::WakeUp
            | Self::StartFanCleaning
            | Self::ClearStatusRegister
            | Self::Reset => 0,
        }
    }

    /// Look a command up by its opcode.
    pub const fn from_opcode(opcode: u16) -> Option<Self> {
        Some(match opcode {
            0x0010 => Self::StartMeasurement,
            0x0104 => Self::StopMeasurement,
            0x0202 => Self::ReadDataReadyFlag,
            0x0300 => Self::ReadMeasuredValues,
            0x1001 => Self::Sleep,
            0x1103 => Self::WakeUp,
            0x5607 => Self::StartFanCleaning,
            0x8004 => Self::AutoCleaningInterval,
            0xD002 => Self::ProductType,
            0xD033 => Self::SerialNumber,
            0xD100 => Self::FirmwareVersion,
            0xD206 => Self::ReadStatusRegister,
            0xD210 => Self::ClearStatusRegister,
            0xD304 => Self::Reset,
            _ => return None,
        })
    }
}

/// Bytes written to the sensor for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: Vec<u8, MAX_FRAME_LEN>,
}

impl CommandFrame {
    /// A bare opcode with no arguments.
    pub fn new(command: Command) -> Self {
        let mut bytes = Vec::new();
        // Capacity always holds the opcode.
        let _ = bytes.extend_from_slice(&command.opcode().to_be_bytes());
        Self { bytes }
    }

    /// Opcode followed by up to two argument words, each with its CRC.
    ///
    /// Words beyond the second are ignored; no command takes more.
    pub fn with_words(command: Command, words: &[u16]) -> Self {
        let mut frame = Self::new(command);
        for word in words.iter().take(2) {
            let _ = frame.bytes.extend_from_slice(&pack(*word));
        }
        frame
    }

    /// Start measurement with float output.
    pub fn start_measurement() -> Self {
        Self::with_words(Command::StartMeasurement, &[FLOAT_OUTPUT_FORMAT])
    }

    /// Write the auto-cleaning interval, in seconds.
    pub fn write_auto_cleaning_interval(seconds: u32) -> Self {
        let [b0, b1, b2, b3] = seconds.to_be_bytes();
        Self::with_words(
            Command::AutoCleaningInterval,
            &[u16::from_be_bytes([b0, b1]), u16::from_be_bytes([b2, b3])],
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Command> for CommandFrame {
    fn from(command: Command) -> Self {
        Self::new(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_round_trips() {
        let all = [
            Command::StartMeasurement,
            Command::StopMeasurement,
            Command::ReadDataReadyFlag,
            Command::ReadMeasuredValues,
            Command::Sleep,
            Command::WakeUp,
            Command::StartFanCleaning,
            Command::AutoCleaningInterval,
            Command::ProductType,
            Command::SerialNumber,
            Command::FirmwareVersion,
            Command::ReadStatusRegister,
            Command::ClearStatusRegister,
            Command::Reset,
        ];
        for command in all {
            assert_eq!(Command::from_opcode(command.opcode()), Some(command));
            assert_eq!(command.response_len() % PACKET_LEN, 0);
        }
        assert_eq!(Command::from_opcode(0xFFFF), None);
    }

    #[test]
    fn bare_frames_are_the_opcode() {
        assert_eq!(CommandFrame::new(Command::StopMeasurement).as_bytes(), &[0x01, 0x04]);
        assert_eq!(CommandFrame::from(Command::Reset).as_bytes(), &[0xD3, 0x04]);
    }

    #[test]
    fn start_measurement_selects_float_output() {
        assert_eq!(
            CommandFrame::start_measurement().as_bytes(),
            &[0x00, 0x10, 0x03, 0x00, 0xAC]
        );
    }

    #[test]
    fn auto_cleaning_interval_is_crc_protected_per_word() {
        // One week: 604800 s = 0x0009_3A80.
        let frame = CommandFrame::write_auto_cleaning_interval(7 * 86_400);
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), MAX_FRAME_LEN);
        assert_eq!(&bytes[..2], &[0x80, 0x04]);
        assert_eq!(&bytes[2..5], &pack(0x0009));
        assert_eq!(&bytes[5..], &pack(0x3A80));
    }
}
