//! Numeric accumulation without an intermediate string.
//!
//! Digits fold into a `u64` mantissa as they arrive; the decimal point and
//! any exponent only move a power-of-ten `scale`. A finished [`Number`] is
//! either an exact integer or `mantissa * 10^scale` computed with a single
//! multiplication or division.

use crate::schema::Reject;

/// Exact powers of ten representable in an `f64`.
const POW10: [f64; 23] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16,
    1e17, 1e18, 1e19, 1e20, 1e21, 1e22,
];

/// A decoded JSON number.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Number {
    mantissa: u64,
    negative: bool,
    scale: i32,
    float: bool,
    truncated: bool,
}

impl Number {
    /// Whether the literal had a fraction or an exponent.
    #[must_use]
    pub fn is_float(&self) -> bool {
        self.float
    }

    /// Whether the literal carried a minus sign (including `-0`).
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The exact integer value.
    ///
    /// # Errors
    ///
    /// [`Reject::Mismatch`] if the literal is fractional or has an exponent,
    /// [`Reject::OutOfRange`] if its digits overflowed the mantissa.
    pub fn to_integer(&self) -> Result<i128, Reject> {
        if self.float {
            return Err(Reject::Mismatch);
        }
        if self.truncated {
            return Err(Reject::OutOfRange);
        }
        let magnitude = i128::from(self.mantissa);
        Ok(if self.negative { -magnitude } else { magnitude })
    }

    /// The value as a float, with the sign applied last so `-0` stays
    /// negative.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> f64 {
        let mantissa = self.mantissa as f64;
        let magnitude = match usize::try_from(self.scale.unsigned_abs()) {
            Ok(exp) if exp < POW10.len() => {
                if self.scale >= 0 {
                    mantissa * POW10[exp]
                } else {
                    mantissa / POW10[exp]
                }
            }
            _ if self.scale >= 0 => mantissa * 10f64.powi(self.scale),
            _ => mantissa / 10f64.powi(self.scale.saturating_neg()),
        };
        if self.negative { -magnitude } else { magnitude }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Part {
    #[default]
    Start,
    Integer,
    Fraction,
    ExponentStart,
    Exponent,
}

/// Per-byte number state carried across read-buffer refills.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Accumulator {
    number: Number,
    part: Part,
    exponent: i32,
    exponent_negative: bool,
}

impl Accumulator {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Folds one more byte in. Returns `false` if `byte` cannot continue a
    /// number, in which case nothing changed.
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        match (self.part, byte) {
            (Part::Start, b'-') if !self.number.negative => {
                self.number.negative = true;
                true
            }
            (Part::Start | Part::Integer, b'0'..=b'9') => {
                self.part = Part::Integer;
                if !self.fold(byte) {
                    // Integer digits past the mantissa still count.
                    self.number.scale = self.number.scale.saturating_add(1);
                }
                true
            }
            (Part::Integer, b'.') => {
                self.part = Part::Fraction;
                self.number.float = true;
                true
            }
            (Part::Fraction, b'0'..=b'9') => {
                if self.fold(byte) {
                    self.number.scale = self.number.scale.saturating_sub(1);
                }
                true
            }
            (Part::Integer | Part::Fraction, b'e' | b'E') => {
                self.part = Part::ExponentStart;
                self.number.float = true;
                true
            }
            (Part::ExponentStart, b'-') => {
                self.exponent_negative = true;
                self.part = Part::Exponent;
                true
            }
            (Part::ExponentStart, b'+') => {
                self.part = Part::Exponent;
                true
            }
            (Part::ExponentStart | Part::Exponent, b'0'..=b'9') => {
                self.part = Part::Exponent;
                self.exponent = self
                    .exponent
                    .saturating_mul(10)
                    .saturating_add(i32::from(byte - b'0'));
                true
            }
            _ => false,
        }
    }

    /// Appends a digit to the mantissa. Returns `false` once the mantissa is
    /// full; the digit is then dropped.
    fn fold(&mut self, digit: u8) -> bool {
        if self.number.truncated {
            return false;
        }
        match self
            .number
            .mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(u64::from(digit - b'0')))
        {
            Some(m) => {
                self.number.mantissa = m;
                true
            }
            None => {
                self.number.truncated = true;
                false
            }
        }
    }

    /// Whether at least one digit has been seen.
    pub(crate) fn has_digits(&self) -> bool {
        self.part != Part::Start
    }

    pub(crate) fn finish(&self) -> Number {
        let mut number = self.number;
        let exponent = if self.exponent_negative {
            -self.exponent
        } else {
            self.exponent
        };
        number.scale = number.scale.saturating_add(exponent);
        number
    }
}
