//! IEEE-754 single precision reconstruction for measured values.
//!
//! The sensor reports each value as a big-endian `f32` spread over two
//! packets. Values are rebuilt field by field (sign, exponent, mantissa)
//! and rounded to three decimals, which is the precision stored downstream.

const EXPONENT_BIAS: i32 = 127;
const MANTISSA_BITS: u32 = 23;
const MANTISSA_MASK: u32 = (1 << MANTISSA_BITS) - 1;

/// Decode the raw bits of a single precision float, rounded to 3 decimals.
///
/// A zero or subnormal exponent decodes to `0.0`.
pub fn decode_ieee754(raw: u32) -> f32 {
    let negative = raw >> 31 == 1;
    let biased = (raw >> MANTISSA_BITS) & 0xFF;
    if biased == 0 {
        return 0.0;
    }
    let exponent = biased as i32 - EXPONENT_BIAS;
    let mantissa = raw & MANTISSA_MASK;

    // Non-negative exponents shift mantissa bits into the integer part;
    // negative ones leave the mantissa fractional and halve afterwards.
    let (shift, divider) = if exponent < 0 {
        (0, exponent.unsigned_abs())
    } else {
        (exponent as u32, 0)
    };

    let int_bits = shift.min(MANTISSA_BITS);
    let frac_bits = MANTISSA_BITS - int_bits;

    let mut integer = ((1u64 << int_bits) | u64::from(mantissa >> frac_bits)) as f64;
    for _ in int_bits..shift {
        integer *= 2.0;
    }

    let mut fraction = 0.0f64;
    let mut weight = 0.5f64;
    for position in 0..frac_bits {
        if (mantissa >> (frac_bits - 1 - position)) & 1 == 1 {
            fraction += weight;
        }
        weight /= 2.0;
    }

    let mut value = integer + fraction;
    for _ in 0..divider {
        value /= 2.0;
    }
    if negative {
        value = -value;
    }
    round3(value) as f32
}

/// Round half away from zero to 3 decimals.
pub fn round3(value: f64) -> f64 {
    if !value.is_finite() || value > 1e15 || value < -1e15 {
        return value;
    }
    let scaled = value * 1000.0;
    let rounded = if scaled < 0.0 { scaled - 0.5 } else { scaled + 0.5 };
    (rounded as i64) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(value: f32) -> f32 {
        round3(f64::from(value)) as f32
    }

    #[test]
    fn decodes_twelve_and_a_half() {
        assert_eq!(decode_ieee754(0x4148_0000), 12.5);
        assert_eq!(decode_ieee754(u32::from_be_bytes(12.5f32.to_be_bytes())), 12.5);
    }

    #[test]
    fn agrees_with_standard_decode() {
        let samples = [
            1.0f32, 2.0, 0.5, 0.75, 0.1, 0.0042, 3.1415927, 12.5, 27.81, 99.999, 523.2871,
            1000.0, 3000.0, 65535.5, 1.0e7,
        ];
        for value in samples {
            assert_eq!(decode_ieee754(value.to_bits()), reference(value), "{value}");
        }
    }

    #[test]
    fn sign_applies_to_fraction_too() {
        assert_eq!(decode_ieee754((-12.5f32).to_bits()), -12.5);
        assert_eq!(decode_ieee754((-0.25f32).to_bits()), -0.25);
    }

    #[test]
    fn zero_and_subnormals() {
        assert_eq!(decode_ieee754(0), 0.0);
        assert_eq!(decode_ieee754(0x8000_0000), 0.0);
        assert_eq!(decode_ieee754(0x0000_0001), 0.0);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round3(1.0625), 1.063);
        assert_eq!(round3(-1.0625), -1.063);
        assert_eq!(round3(0.0004), 0.0);
    }
}
