//! Kubernetes resource quantities (`500m`, `2`, `128Mi`, `1e3`).
//!
//! Values are held as signed milli-units so CPU (millicores) and memory
//! (bytes) share one representation. Rendering follows the API server's
//! canonical form: fractional values print as `<n>m`, whole values use the
//! largest suffix of their format that divides them exactly.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Suffix family a quantity is rendered with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QuantityFormat {
    /// Powers of 1000 (`k`, `M`, `G`, ...) and exponents.
    #[default]
    Decimal,
    /// Powers of 1024 (`Ki`, `Mi`, `Gi`, ...).
    Binary,
}

/// Errors from [`Quantity::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    /// Empty input.
    #[error("empty quantity")]
    Empty,
    /// The numeric part is not a decimal number.
    #[error("invalid number in quantity {0:?}")]
    Number(String),
    /// The suffix is not one the API server accepts.
    #[error("unknown suffix {0:?}")]
    Suffix(String),
    /// The value does not fit the milli-unit representation.
    #[error("quantity {0:?} out of range")]
    Overflow(String),
}

/// A parsed quantity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quantity {
    millis: i128,
    format: Option<QuantityFormat>,
}

const DECIMAL_SUFFIXES: [(u32, &str); 6] = [
    (18, "E"),
    (15, "P"),
    (12, "T"),
    (9, "G"),
    (6, "M"),
    (3, "k"),
];

const BINARY_SUFFIXES: [(u32, &str); 6] = [
    (60, "Ei"),
    (50, "Pi"),
    (40, "Ti"),
    (30, "Gi"),
    (20, "Mi"),
    (10, "Ki"),
];

enum Scale {
    Pow10(i32),
    Pow2(u32),
}

impl Quantity {
    /// A zero quantity that renders in `format` until something is added.
    pub fn zero(format: QuantityFormat) -> Self {
        Self {
            millis: 0,
            format: Some(format),
        }
    }

    /// Parse a quantity string. Sub-milli precision rounds up.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);

        let (negative, unsigned) = match number.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, number.strip_prefix('+').unwrap_or(number)),
        };
        let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let digits_ok = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !digits_ok(whole) || !digits_ok(frac) {
            return Err(QuantityError::Number(input.to_string()));
        }

        let overflow = || QuantityError::Overflow(input.to_string());
        if whole.len() + frac.len() > 30 {
            return Err(overflow());
        }
        let mantissa: i128 = format!("{whole}{frac}")
            .parse()
            .map_err(|_| QuantityError::Number(input.to_string()))?;
        let frac_len = i32::try_from(frac.len()).map_err(|_| overflow())?;

        let (format, scale) = parse_suffix(suffix)?;
        let millis = match scale {
            Scale::Pow10(exp) => {
                let shift = exp + 3 - frac_len;
                if shift >= 0 {
                    mantissa.checked_mul(pow10(shift).ok_or_else(overflow)?)
                } else {
                    pow10(-shift).map(|d| ceil_div(mantissa, d))
                }
            }
            Scale::Pow2(bits) => {
                let numer = 1_i128
                    .checked_shl(bits)
                    .and_then(|p| p.checked_mul(1000))
                    .ok_or_else(overflow)?;
                let denom = pow10(frac_len).ok_or_else(overflow)?;
                mantissa.checked_mul(numer).map(|n| ceil_div(n, denom))
            }
        }
        .ok_or_else(overflow)?;

        Ok(Self {
            millis: if negative { -millis } else { millis },
            format: Some(format),
        })
    }

    /// Value in milli-units.
    pub fn millis(&self) -> i128 {
        self.millis
    }

    /// True when the value is zero, regardless of format.
    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// Add `other` in place. A quantity with no format adopts `other`'s.
    pub fn add(&mut self, other: Quantity) {
        if self.format.is_none() {
            self.format = other.format;
        }
        self.millis = self.millis.saturating_add(other.millis);
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis == 0 {
            return f.write_str("0");
        }
        if self.millis % 1000 != 0 {
            return write!(f, "{}m", self.millis);
        }

        let value = self.millis / 1000;
        match self.format.unwrap_or_default() {
            QuantityFormat::Binary => {
                for (bits, suffix) in BINARY_SUFFIXES {
                    let unit = 1_i128 << bits;
                    if value % unit == 0 {
                        return write!(f, "{}{suffix}", value / unit);
                    }
                }
            }
            QuantityFormat::Decimal => {
                for (exp, suffix) in DECIMAL_SUFFIXES {
                    let unit = 10_i128.pow(exp);
                    if value % unit == 0 {
                        return write!(f, "{}{suffix}", value / unit);
                    }
                }
            }
        }
        write!(f, "{value}")
    }
}

fn parse_suffix(suffix: &str) -> Result<(QuantityFormat, Scale), QuantityError> {
    let decimal = |exp| Ok((QuantityFormat::Decimal, Scale::Pow10(exp)));
    let binary = |bits| Ok((QuantityFormat::Binary, Scale::Pow2(bits)));
    match suffix {
        "" => decimal(0),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        other => {
            let exp = other
                .strip_prefix(['e', 'E'])
                .and_then(|e| e.parse::<i32>().ok())
                .filter(|e| e.abs() <= 30)
                .ok_or_else(|| QuantityError::Suffix(other.to_string()))?;
            decimal(exp)
        }
    }
}

fn pow10(exp: i32) -> Option<i128> {
    u32::try_from(exp).ok().and_then(|e| 10_i128.checked_pow(e))
}

fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d > 0 { q + 1 } else { q }
}

/// Sum a set of quantity strings, skipping ones that do not parse.
pub fn sum<'a, I>(values: I, start: Quantity) -> Quantity
where
    I: IntoIterator<Item = &'a str>,
{
    values.into_iter().fold(start, |mut total, raw| {
        match Quantity::parse(raw) {
            Ok(q) => total.add(q),
            Err(e) => tracing::debug!(value = raw, error = %e, "skipping unparseable quantity"),
        }
        total
    })
}

/// Re-render a quantity in canonical form, `"0"` when absent.
///
/// Values that do not parse are passed through unchanged.
pub fn canonical(raw: Option<&str>) -> String {
    match raw {
        None => "0".to_string(),
        Some(raw) => Quantity::parse(raw).map_or_else(|_| raw.to_string(), |q| q.to_string()),
    }
}
