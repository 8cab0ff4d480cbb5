use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, str::FromStr};

/// Fixed-point decimal `value / 10^scale`.
///
/// Equality, ordering and hashing compare the `(value, scale)` pair as written
/// and are not normalized: `12` and `12.0` (`(12, 0)` and `(120, 1)`) are
/// different numerics. Use [`Numeric::cmp_value`] to compare quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Numeric {
    value: i128,
    scale: u8,
}

impl Numeric {
    pub const MAX_SCALE: u8 = 38;

    /// Returns `None` if `scale` exceeds [`Numeric::MAX_SCALE`].
    pub fn new(value: i128, scale: u8) -> Option<Self> {
        (scale <= Self::MAX_SCALE).then_some(Self { value, scale })
    }

    pub fn from_integer(value: i128) -> Self {
        Self { value, scale: 0 }
    }

    /// Unscaled integer value.
    pub fn value(self) -> i128 {
        self.value
    }

    pub fn scale(self) -> u8 {
        self.scale
    }

    /// Number of significant decimal digits of the unscaled value.
    pub fn precision(self) -> u32 {
        self.value.unsigned_abs().checked_ilog10().map_or(1, |digits| digits + 1)
    }

    /// Returns the same quantity written with `scale` fractional digits.
    ///
    /// Returns `None` if digits would be dropped or the value overflows.
    pub fn rescale(self, scale: u8) -> Option<Self> {
        if scale > Self::MAX_SCALE {
            return None;
        }
        let value = match scale.cmp(&self.scale) {
            Ordering::Equal => self.value,
            Ordering::Greater => self
                .value
                .checked_mul(pow10(scale - self.scale)?)?,
            Ordering::Less => {
                let divisor = pow10(self.scale - scale)?;
                if self.value % divisor != 0 {
                    return None;
                }
                self.value / divisor
            }
        };
        Some(Self { value, scale })
    }

    /// The integral value, if there is no fractional part.
    pub fn to_integer(self) -> Option<i128> {
        self.rescale(0).map(|n| n.value)
    }

    pub fn to_f64(self) -> f64 {
        // Going through the decimal text keeps the closest binary value.
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Exact decimal form of a finite float, using its shortest round-trip
    /// representation.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        format!("{value}").parse().ok()
    }

    /// Compares the represented quantities rather than the components.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        match (self.rescale(scale), other.rescale(scale)) {
            (Some(a), Some(b)) => a.value.cmp(&b.value),
            // Overflowing on upscale means the magnitude exceeds the other side.
            (None, Some(_)) => self.value.signum().cmp(&0),
            (Some(_), None) => 0.cmp(&other.value.signum()),
            (None, None) => self.value.signum().cmp(&other.value.signum()),
        }
    }
}

fn pow10(exp: u8) -> Option<i128> {
    10i128.checked_pow(exp.into())
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scale == 0 {
            return self.value.fmt(f);
        }
        let sign = if self.value < 0 { "-" } else { "" };
        let abs = self.value.unsigned_abs();
        let divisor = 10u128.pow(self.scale.into());
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / divisor,
            abs % divisor,
            width = usize::from(self.scale)
        )
    }
}

impl std::ops::Neg for Numeric {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            value: -self.value,
            scale: self.scale,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid numeric literal {0:?}")]
pub struct ParseNumericError(String);

impl FromStr for Numeric {
    type Err = ParseNumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseNumericError(s.to_owned());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (integral, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if integral.is_empty() && fraction.is_empty() {
            return Err(err());
        }
        let scale = u8::try_from(fraction.len())
            .ok()
            .filter(|scale| *scale <= Self::MAX_SCALE)
            .ok_or_else(err)?;
        let mut value: i128 = 0;
        for ch in integral.chars().chain(fraction.chars()) {
            let digit = ch.to_digit(10).ok_or_else(err)?;
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit.into()))
                .ok_or_else(err)?;
        }
        if negative {
            value = -value;
        }
        Ok(Self { value, scale })
    }
}
