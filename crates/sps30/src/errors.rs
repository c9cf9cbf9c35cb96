use core::fmt;

use embedded_hal::i2c::{self, ErrorKind};

use crate::packet::CrcMismatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<I2cError> {
    /// The bus transfer itself failed.
    I2c(I2cError),
    /// A single-value response failed its checksum.
    Crc(CrcMismatch),
}

impl<E> From<CrcMismatch> for Error<E> {
    fn from(e: CrcMismatch) -> Self {
        Error::Crc(e)
    }
}

impl<E: i2c::Error> Error<E> {
    /// The transport failure class, if this is a transport error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::I2c(e) => Some(e.kind()),
            Error::Crc(_) => None,
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(err) => write!(f, "I2C communication error: {:?}", err),
            Error::Crc(mismatch) => write!(f, "{}", mismatch),
        }
    }
}
