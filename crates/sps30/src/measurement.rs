use core::fmt;

use crate::float::decode_ieee754;
use crate::packet::{pack, unpack, CrcMismatch, PACKET_LEN};

/// Length of a measured-values response in float format.
pub const MEASUREMENT_FRAME_LEN: usize = 60;

const MASS_DENSITY_VALUES: usize = 4;
const PARTICLE_COUNT_VALUES: usize = 5;
/// Bytes per float value on the wire: two packets.
const VALUE_LEN: usize = 2 * PACKET_LEN;

const MASS_DENSITY_OFFSET: usize = 0;
const PARTICLE_COUNT_OFFSET: usize = MASS_DENSITY_OFFSET + MASS_DENSITY_VALUES * VALUE_LEN;
const PARTICLE_SIZE_OFFSET: usize = PARTICLE_COUNT_OFFSET + PARTICLE_COUNT_VALUES * VALUE_LEN;

pub const MASS_DENSITY_UNIT: &str = "ug/m3";
pub const PARTICLE_COUNT_UNIT: &str = "#/cm3";
pub const PARTICLE_SIZE_UNIT: &str = "um";

/// Mass concentration per size bucket, in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MassDensity {
    pub pm1_0: f32,
    pub pm2_5: f32,
    pub pm4_0: f32,
    pub pm10: f32,
}

/// Number concentration per size bucket, in #/cm³.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParticleCount {
    pub pm0_5: f32,
    pub pm1_0: f32,
    pub pm2_5: f32,
    pub pm4_0: f32,
    pub pm10: f32,
}

/// A fully valid measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    pub mass_density: MassDensity,
    pub particle_count: ParticleCount,
    /// Typical particle size, in µm.
    pub typical_particle_size: f32,
}

/// One decoded measured-values response.
///
/// Each group is checked independently: a corrupted packet voids only the
/// group it belongs to, and the group carries the mismatch instead of values.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MeasuredValues {
    pub mass_density: Result<MassDensity, CrcMismatch>,
    pub particle_count: Result<ParticleCount, CrcMismatch>,
    pub typical_particle_size: Result<f32, CrcMismatch>,
}

fn decode_floats<const V: usize>(raw: &[u8], base: usize) -> Result<[f32; V], CrcMismatch> {
    let mut values = [0.0f32; V];
    for (i, (chunk, value)) in raw.chunks_exact(VALUE_LEN).zip(values.iter_mut()).enumerate() {
        let bytes = unpack::<4>(chunk, base + i * VALUE_LEN)?;
        *value = decode_ieee754(u32::from_be_bytes(bytes));
    }
    Ok(values)
}

fn encode_float(value: f32, out: &mut [u8]) {
    let bits = value.to_bits();
    out[..PACKET_LEN].copy_from_slice(&pack((bits >> 16) as u16));
    out[PACKET_LEN..VALUE_LEN].copy_from_slice(&pack(bits as u16));
}

impl MeasuredValues {
    /// Decode a 60-byte response: mass density (24 bytes), particle count
    /// (30 bytes), then typical particle size (6 bytes).
    pub fn decode(frame: &[u8; MEASUREMENT_FRAME_LEN]) -> Self {
        let mass_density = decode_floats::<MASS_DENSITY_VALUES>(
            &frame[MASS_DENSITY_OFFSET..PARTICLE_COUNT_OFFSET],
            MASS_DENSITY_OFFSET,
        )
        .map(|[pm1_0, pm2_5, pm4_0, pm10]| MassDensity { pm1_0, pm2_5, pm4_0, pm10 });

        let particle_count = decode_floats::<PARTICLE_COUNT_VALUES>(
            &frame[PARTICLE_COUNT_OFFSET..PARTICLE_SIZE_OFFSET],
            PARTICLE_COUNT_OFFSET,
        )
        .map(|[pm0_5, pm1_0, pm2_5, pm4_0, pm10]| ParticleCount {
            pm0_5,
            pm1_0,
            pm2_5,
            pm4_0,
            pm10,
        });

        let typical_particle_size =
            decode_floats::<1>(&frame[PARTICLE_SIZE_OFFSET..], PARTICLE_SIZE_OFFSET)
                .map(|[size]| size);

        Self { mass_density, particle_count, typical_particle_size }
    }

    /// True when every group passed its CRC checks.
    pub fn is_valid(&self) -> bool {
        self.first_error().is_none()
    }

    /// The first checksum failure, in frame order.
    pub fn first_error(&self) -> Option<CrcMismatch> {
        self.mass_density
            .err()
            .or(self.particle_count.err())
            .or(self.typical_particle_size.err())
    }

    /// The measurement, if every group is valid.
    pub fn measurement(&self) -> Option<Measurement> {
        Some(Measurement {
            mass_density: self.mass_density.ok()?,
            particle_count: self.particle_count.ok()?,
            typical_particle_size: self.typical_particle_size.ok()?,
        })
    }
}

impl From<Measurement> for MeasuredValues {
    fn from(m: Measurement) -> Self {
        Self {
            mass_density: Ok(m.mass_density),
            particle_count: Ok(m.particle_count),
            typical_particle_size: Ok(m.typical_particle_size),
        }
    }
}

impl Measurement {
    /// Encode as the sensor would send it.
    pub fn to_frame(&self) -> [u8; MEASUREMENT_FRAME_LEN] {
        let md = &self.mass_density;
        let pc = &self.particle_count;
        let values = [
            md.pm1_0,
            md.pm2_5,
            md.pm4_0,
            md.pm10,
            pc.pm0_5,
            pc.pm1_0,
            pc.pm2_5,
            pc.pm4_0,
            pc.pm10,
            self.typical_particle_size,
        ];

        let mut frame = [0u8; MEASUREMENT_FRAME_LEN];
        for (value, out) in values.iter().zip(frame.chunks_exact_mut(VALUE_LEN)) {
            encode_float(*value, out);
        }
        frame
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let md = &self.mass_density;
        let pc = &self.particle_count;
        write!(
            f,
            "PM1.0 {} PM2.5 {} PM4.0 {} PM10 {} {MASS_DENSITY_UNIT}; \
             PM0.5 {} PM1.0 {} PM2.5 {} PM4.0 {} PM10 {} {PARTICLE_COUNT_UNIT}; \
             size {} {PARTICLE_SIZE_UNIT}",
            md.pm1_0,
            md.pm2_5,
            md.pm4_0,
            md.pm10,
            pc.pm0_5,
            pc.pm1_0,
            pc.pm2_5,
            pc.pm4_0,
            pc.pm10,
            self.typical_particle_size
        )
    }
}
