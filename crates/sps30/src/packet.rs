//! Packet framing and CRC8 integrity checks.
//!
//! Every 2-byte data word on the wire, in either direction, is followed by a
//! CRC8 over those two bytes. A `[hi, lo, crc]` triple is a packet.

use core::fmt;

/// Bytes per packet on the wire.
pub const PACKET_LEN: usize = 3;

const CRC8_POLYNOMIAL: u8 = 0x31;
const CRC8_INIT: u8 = 0xFF;

/// CRC8 over one 2-byte data word (polynomial 0x31, init 0xFF).
pub const fn crc8(data: [u8; 2]) -> u8 {
    let mut crc = CRC8_INIT;
    let mut i = 0;
    while i < data.len() {
        crc ^= data[i];
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        i += 1;
    }
    crc
}

/// Frame one 16-bit word as a packet.
pub const fn pack(word: u16) -> [u8; PACKET_LEN] {
    let [hi, lo] = word.to_be_bytes();
    [hi, lo, crc8([hi, lo])]
}

/// A packet whose transmitted checksum disagrees with its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrcMismatch {
    /// Byte offset of the packet within the response.
    pub offset: usize,
    /// CRC computed over the received data bytes.
    pub computed: u8,
    /// CRC byte that came over the wire.
    pub received: u8,
}

impl fmt::Display for CrcMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CRC mismatch in packet at byte {}: computed {:#04x}, received {:#04x}",
            self.offset, self.computed, self.received
        )
    }
}

/// Verify a single packet and return its two data bytes.
pub fn verify(packet: &[u8; PACKET_LEN], offset: usize) -> Result<[u8; 2], CrcMismatch> {
    let data = [packet[0], packet[1]];
    let computed = crc8(data);
    if computed == packet[2] {
        Ok(data)
    } else {
        Err(CrcMismatch { offset, computed, received: packet[2] })
    }
}

/// Strip the checksums from a run of packets, verifying each one.
///
/// `raw` must hold exactly `N / 2` packets. `base` is the byte offset of
/// `raw` within the whole response and is only used for error reporting.
/// The first failing packet is reported.
pub fn unpack<const N: usize>(raw: &[u8], base: usize) -> Result<[u8; N], CrcMismatch> {
    debug_assert_eq!(raw.len(), N / 2 * PACKET_LEN);

    let mut data = [0u8; N];
    for (i, (packet, word)) in raw
        .chunks_exact(PACKET_LEN)
        .zip(data.chunks_exact_mut(2))
        .enumerate()
    {
        let packet = [packet[0], packet[1], packet[2]];
        word.copy_from_slice(&verify(&packet, base + i * PACKET_LEN)?);
    }
    Ok(data)
}
