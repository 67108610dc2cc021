//! IEEE 754-2008 decimal floating point, densely packed decimal encoding.
//!
//! Both widths share the layout: sign bit, a combination field holding the
//! exponent high bits and the leading digit, the exponent continuation, then
//! the remaining digits packed three per 10 bit declet.
use std::fmt;

use super::Decimal;

const DEC64_BIAS: i32 = 398;
const DEC128_BIAS: i32 = 6176;

/// Decoded `DECFLOAT` value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecFloat {
    Finite(Decimal),
    NaN,
    Infinity,
    NegInfinity,
}

impl DecFloat {
    pub fn is_finite(&self) -> bool {
        matches!(self, DecFloat::Finite(_))
    }

    pub fn to_f64(self) -> f64 {
        match self {
            DecFloat::Finite(d) => d.to_f64(),
            DecFloat::NaN => f64::NAN,
            DecFloat::Infinity => f64::INFINITY,
            DecFloat::NegInfinity => f64::NEG_INFINITY,
        }
    }
}

impl fmt::Display for DecFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecFloat::Finite(d) => d.fmt(f),
            DecFloat::NaN => f.write_str("NaN"),
            DecFloat::Infinity => f.write_str("Infinity"),
            DecFloat::NegInfinity => f.write_str("-Infinity"),
        }
    }
}

/// Sign, biased exponent and significand of a finite value.
struct Parts {
    negative: bool,
    exponent: i32,
    digits: i128,
}

impl Parts {
    fn into_decimal(self) -> Decimal {
        match self.negative {
            true => Decimal::new(-self.digits, self.exponent),
            false => Decimal::new(self.digits, self.exponent),
        }
    }
}

fn special(negative: bool, cf: u32, nan_mask: u32, inf_mask: u32) -> Option<DecFloat> {
    if cf & nan_mask == nan_mask {
        Some(DecFloat::NaN)
    } else if cf & nan_mask == inf_mask {
        Some(match negative {
            true => DecFloat::NegInfinity,
            false => DecFloat::Infinity,
        })
    } else {
        None
    }
}

/// Decode `DECFLOAT(16)`.
pub fn decode_decimal64(b: [u8; 8]) -> DecFloat {
    let negative = b[0] & 0x80 != 0;
    let cf = ((b[0] >> 2) & 0x1f) as u32;
    if let Some(special) = special(negative, cf, 0x1f, 0x1e) {
        return special;
    }

    let continuation = (((b[0] & 3) as i32) << 6) | ((b[1] >> 2) & 0x3f) as i32;
    let (high, prefix) = combination(cf);
    let exponent = (high << 8) + continuation - DEC64_BIAS;

    let bits = u64::from_be_bytes(b) as u128 & 0x3_ffff_ffff_ffff;
    let digits = significand(prefix, bits, 5);
    Parts { negative, exponent, digits }.into_decimal().into()
}

/// Decode `DECFLOAT(34)`.
pub fn decode_decimal128(b: [u8; 16]) -> DecFloat {
    match parts128(b) {
        Ok(parts) => parts.into_decimal().into(),
        Err(special) => special,
    }
}

/// Decode `DECIMAL` backed by a 128 bit decimal, which ignores the encoded
/// exponent in favor of the column scale.
pub fn decode_fixed(b: [u8; 16], scale: i32) -> DecFloat {
    match parts128(b) {
        Ok(parts) => Parts { exponent: scale, ..parts }.into_decimal().into(),
        Err(special) => special,
    }
}

fn parts128(b: [u8; 16]) -> Result<Parts, DecFloat> {
    let negative = b[0] & 0x80 != 0;
    let cf = ((b[0] & 0x7f) as u32) << 10 | (b[1] as u32) << 2 | (b[2] >> 6) as u32;
    if let Some(special) = special(negative, cf >> 12, 0x1f, 0x1e) {
        return Err(special);
    }

    let (high, prefix) = combination(cf >> 12);
    let exponent = (high << 12) + (cf & 0xfff) as i32 - DEC128_BIAS;

    let bits = u128::from_be_bytes(b) & 0x3fff_ffff_ffff_ffff_ffff_ffff_ffff;
    let digits = significand(prefix, bits, 11);
    Ok(Parts { negative, exponent, digits })
}

/// Split the 5 bit combination field into exponent high bits and the
/// leading digit.
fn combination(cf: u32) -> (i32, i128) {
    match cf & 0x18 {
        0x18 => (((cf >> 1) & 3) as i32, 8 + (cf & 1) as i128),
        high => ((high >> 3) as i32, (cf & 7) as i128),
    }
}

fn significand(prefix: i128, bits: u128, declets: u32) -> i128 {
    (0..declets).rev().fold(prefix, |acc, i| {
        let declet = ((bits >> (10 * i)) & 0x3ff) as u16;
        acc * 1000 + dpd_to_int(declet) as i128
    })
}

/// Unpack one declet into a number in `0..=999`.
fn dpd_to_int(dpd: u16) -> u16 {
    let bit = |n: u16| (dpd >> n) & 1;
    let (b0, b1, b2, b3, b4) = (bit(0), bit(1), bit(2), bit(3), bit(4));
    let (b5, b6, b7, b8, b9) = (bit(5), bit(6), bit(7), bit(8), bit(9));

    let (d2, d1, d0) = match (b3, b2, b1, b6, b5) {
        (0, ..) => (b9 * 4 + b8 * 2 + b7, b6 * 4 + b5 * 2 + b4, b2 * 4 + b1 * 2 + b0),
        (1, 0, 0, ..) => (b9 * 4 + b8 * 2 + b7, b6 * 4 + b5 * 2 + b4, 8 + b0),
        (1, 0, 1, ..) => (b9 * 4 + b8 * 2 + b7, 8 + b4, b6 * 4 + b5 * 2 + b0),
        (1, 1, 0, ..) => (8 + b7, b6 * 4 + b5 * 2 + b4, b9 * 4 + b8 * 2 + b0),
        (1, 1, 1, 0, 0) => (8 + b7, 8 + b4, b9 * 4 + b8 * 2 + b0),
        (1, 1, 1, 0, 1) => (8 + b7, b9 * 4 + b8 * 2 + b4, 8 + b0),
        (1, 1, 1, 1, 0) => (b9 * 4 + b8 * 2 + b7, 8 + b4, 8 + b0),
        _ => (8 + b7, 8 + b4, 8 + b0),
    };

    d2 * 100 + d1 * 10 + d0
}

impl From<Decimal> for DecFloat {
    fn from(value: Decimal) -> Self {
        DecFloat::Finite(value)
    }
}
