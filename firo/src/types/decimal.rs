use std::{fmt, str::FromStr};

use crate::row::DecodeError;

/// Exact decimal number, `mantissa * 10^exponent`.
///
/// Scaled `NUMERIC` and `DECIMAL` columns decode into this type with the
/// column scale as exponent, so `12.50` keeps its two fractional digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    exponent: i32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal::new(0, 0);

    pub const fn new(mantissa: i128, exponent: i32) -> Decimal {
        Decimal { mantissa, exponent }
    }

    pub const fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub const fn exponent(&self) -> i32 {
        self.exponent
    }

    pub const fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    /// Rescale to `exponent`, returns `None` when digits would be lost or the
    /// mantissa overflows.
    pub fn rescale(self, exponent: i32) -> Option<Decimal> {
        let diff = self.exponent.checked_sub(exponent)?;
        let mantissa = match diff {
            0 => self.mantissa,
            diff if diff > 0 => self.mantissa.checked_mul(10i128.checked_pow(diff as u32)?)?,
            diff => {
                let div = 10i128.checked_pow(diff.unsigned_abs())?;
                if self.mantissa % div != 0 {
                    return None;
                }
                self.mantissa / div
            },
        };
        Some(Decimal { mantissa, exponent })
    }

    /// Returns the value as integer when it has no fractional part.
    pub fn to_i128(self) -> Option<i128> {
        self.rescale(0).map(|e| e.mantissa)
    }

    /// Lossy conversion to float.
    pub fn to_f64(self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.exponent)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = itoa::Buffer::new();
        let digits = buf.format(self.mantissa.unsigned_abs());
        if self.is_negative() {
            f.write_str("-")?;
        }

        if self.exponent >= 0 {
            f.write_str(digits)?;
            for _ in 0..self.exponent {
                f.write_str("0")?;
            }
            return Ok(());
        }

        let frac = self.exponent.unsigned_abs() as usize;
        if digits.len() > frac {
            let (int, fraction) = digits.split_at(digits.len() - frac);
            write!(f, "{int}.{fraction}")
        } else {
            f.write_str("0.")?;
            for _ in 0..frac - digits.len() {
                f.write_str("0")?;
            }
            f.write_str(digits)
        }
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({self})")
    }
}

impl FromStr for Decimal {
    type Err = DecodeError;

    /// Parse plain decimal notation with an optional `e` exponent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecodeError::OutOfRange(format!("invalid decimal {s:?}").into());

        let (number, exp) = match s.find(['e', 'E']) {
            Some(at) => (&s[..at], s[at + 1..].parse::<i32>().map_err(|_| invalid())?),
            None => (s, 0),
        };
        let (int, frac) = number.split_once('.').unwrap_or((number, ""));
        if int.trim_start_matches(['-', '+']).is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !frac.bytes().all(|e| e.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut mantissa = match int {
            "" | "-" | "+" => 0,
            int => int.parse::<i128>().map_err(|_| invalid())?,
        };
        for digit in frac.bytes() {
            let digit = (digit - b'0') as i128;
            mantissa = mantissa.checked_mul(10).ok_or_else(invalid)?;
            mantissa = match int.starts_with('-') {
                true => mantissa.checked_sub(digit),
                false => mantissa.checked_add(digit),
            }
            .ok_or_else(invalid)?;
        }

        let exponent = exp.checked_sub(frac.len() as i32).ok_or_else(invalid)?;
        Ok(Decimal { mantissa, exponent })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Decimal::new(1250, -2).to_string(), "12.50");
        assert_eq!(Decimal::new(-5, -3).to_string(), "-0.005");
        assert_eq!(Decimal::new(7, 2).to_string(), "700");
        assert_eq!(Decimal::new(0, -1).to_string(), "0.0");
    }

    #[test]
    fn parse() {
        assert_eq!("12.50".parse::<Decimal>().unwrap(), Decimal::new(1250, -2));
        assert_eq!("-0.005".parse::<Decimal>().unwrap(), Decimal::new(-5, -3));
        assert_eq!("1.5E+3".parse::<Decimal>().unwrap(), Decimal::new(15, 2));
        assert!("abc".parse::<Decimal>().is_err());
        assert!(".".parse::<Decimal>().is_err());
    }

    #[test]
    fn rescale() {
        assert_eq!(Decimal::new(15, 2).to_i128(), Some(1500));
        assert_eq!(Decimal::new(1500, -2).to_i128(), Some(15));
        assert_eq!(Decimal::new(1501, -2).to_i128(), None);
        assert!((Decimal::new(-125, -2).to_f64() + 1.25).abs() < 1e-12);
    }
}
