use bitflags::bitflags;
use core::fmt::Write;

bitflags! {
    /// Device status register.
    ///
    /// A set bit flags a fault. The register is sticky until cleared with
    /// [`Command::ClearStatusRegister`](crate::Command::ClearStatusRegister).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusRegister: u32 {
        /// Fan speed out of range.
        const SPEED = 1 << 21;
        /// Laser current out of range.
        const LASER = 1 << 5;
        /// Fan is switched on but reports 0 rpm.
        const FAN = 1 << 4;

        const _ = !0;
    }
}

/// Per-component health decoded from a [`StatusRegister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceHealth {
    pub speed: &'static str,
    pub laser: &'static str,
    pub fan: &'static str,
}

impl StatusRegister {
    /// The register as a 32-character bit string, most significant bit first.
    pub fn bit_string(&self) -> heapless::String<32> {
        let mut s = heapless::String::new();
        // 32 characters always fit.
        let _ = write!(s, "{:032b}", self.bits());
        s
    }

    pub fn speed_ok(&self) -> bool {
        !self.contains(Self::SPEED)
    }

    pub fn laser_ok(&self) -> bool {
        !self.contains(Self::LASER)
    }

    pub fn fan_ok(&self) -> bool {
        !self.contains(Self::FAN)
    }

    pub fn health(&self) -> DeviceHealth {
        DeviceHealth {
            speed: if self.speed_ok() { "ok" } else { "too high/too low" },
            laser: if self.laser_ok() { "ok" } else { "out of range" },
            fan: if self.fan_ok() { "ok" } else { "0 rpm" },
        }
    }
}
