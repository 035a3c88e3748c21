//! Parsing and formatting of Kubernetes resource quantities.
//!
//! Only the subset needed to do CPU arithmetic is exposed, but the parser
//! accepts the full quantity grammar (decimal SI, binary SI and decimal
//! exponent suffixes) so that any value the API server accepts can be read.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::errors::QuantityError;

/// Largest number of significant digits accepted before the mantissa would
/// risk overflowing once scaled.
const MAX_DIGITS: usize = 30;

/// A quantity decoded into an exact decimal: `mantissa * 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    mantissa: i128,
    exponent: i32,
}

impl ParsedQuantity {
    /// Value expressed in thousandths, rounded up like the API server does.
    pub fn milli_value(&self) -> Result<i64, QuantityError> {
        let scale = self.exponent + 3;
        let millis = if scale >= 0 {
            pow10(scale)
                .and_then(|p| self.mantissa.checked_mul(p))
                .ok_or(QuantityError::Overflow)?
        } else {
            let divisor = pow10(-scale).ok_or(QuantityError::Overflow)?;
            let quotient = self.mantissa / divisor;
            if self.mantissa % divisor > 0 {
                quotient + 1
            } else {
                quotient
            }
        };
        i64::try_from(millis).map_err(|_| QuantityError::Overflow)
    }

    pub fn as_f64(&self) -> f64 {
        if self.exponent < 0 {
            self.mantissa as f64 / 10f64.powi(-self.exponent)
        } else {
            self.mantissa as f64 * 10f64.powi(self.exponent)
        }
    }
}

fn pow10(exp: i32) -> Option<i128> {
    10i128.checked_pow(u32::try_from(exp).ok()?)
}

/// Parse a quantity string such as `4`, `3500m`, `1.5`, `2Ki` or `1e3`.
pub fn parse_quantity(input: &str) -> Result<ParsedQuantity, QuantityError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (negative, rest) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let number_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_len);

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(QuantityError::InvalidNumber(input.to_owned()));
    }
    if frac_part.contains('.') {
        return Err(QuantityError::InvalidNumber(input.to_owned()));
    }

    let digits = format!("{int_part}{frac_part}");
    let digits = digits.trim_start_matches('0');
    if digits.len() > MAX_DIGITS {
        return Err(QuantityError::Overflow);
    }
    let mut mantissa: i128 = if digits.is_empty() {
        0
    } else {
        digits
            .parse()
            .map_err(|_| QuantityError::InvalidNumber(input.to_owned()))?
    };
    let mut exponent = -i32::try_from(frac_part.len()).map_err(|_| QuantityError::Overflow)?;

    match suffix {
        "" => {}
        "n" => exponent -= 9,
        "u" => exponent -= 6,
        "m" => exponent -= 3,
        "k" => exponent += 3,
        "M" => exponent += 6,
        "G" => exponent += 9,
        "T" => exponent += 12,
        "P" => exponent += 15,
        "E" => exponent += 18,
        "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => {
            let power = match suffix {
                "Ki" => 1,
                "Mi" => 2,
                "Gi" => 3,
                "Ti" => 4,
                "Pi" => 5,
                _ => 6,
            };
            mantissa = mantissa
                .checked_mul(1i128 << (10 * power))
                .ok_or(QuantityError::Overflow)?;
        }
        s if s.starts_with(['e', 'E']) => {
            let scale: i32 = s[1..]
                .parse()
                .map_err(|_| QuantityError::InvalidSuffix(s.to_owned()))?;
            exponent = exponent
                .checked_add(scale)
                .ok_or(QuantityError::Overflow)?;
        }
        s => return Err(QuantityError::InvalidSuffix(s.to_owned())),
    }

    if negative {
        mantissa = -mantissa;
    }

    Ok(ParsedQuantity { mantissa, exponent })
}

/// Milli-CPU value of a quantity taken from a resource list.
pub fn cpu_millis(quantity: &Quantity) -> Result<i64, QuantityError> {
    parse_quantity(&quantity.0)?.milli_value()
}

/// Format milli-CPU as an integer millicore quantity, e.g. `8000m`.
pub fn format_milli_cpu(millis: i64) -> String {
    format!("{millis}m")
}
