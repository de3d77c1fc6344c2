//! Engineering-unit parsing for human readable magnitudes like `"100n"`.

use crate::error::NanonisError;

/// Metric prefixes accepted as a single trailing letter, with their
/// power of ten.
pub const SI_PREFIXES: [(char, i32); 9] = [
    ('f', -15),
    ('p', -12),
    ('n', -9),
    ('u', -6),
    ('m', -3),
    ('k', 3),
    ('M', 6),
    ('G', 9),
    ('T', 12),
];

fn prefix_exponent(prefix: char) -> Option<i32> {
    SI_PREFIXES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, exponent)| *exponent)
}

/// Scale by a power of ten. Dividing for negative exponents keeps results
/// like `100n` exactly equal to the literal `1e-7`.
fn scale(value: f64, exponent: i32) -> f64 {
    let factor = 10f64.powi(exponent.abs());
    if exponent < 0 {
        value / factor
    } else {
        value * factor
    }
}

/// Parse a numeric literal with an optional SI prefix into base units.
///
/// The trailing letter is only treated as a prefix when it is recognised and
/// the rest parses as a decimal number. Otherwise the whole string is parsed
/// as a plain float.
///
/// # Examples
/// ```
/// use nanonis_control::units::parse_engineering;
///
/// assert_eq!(parse_engineering("1.5k")?, 1500.0);
/// assert_eq!(parse_engineering("5")?, 5.0);
/// assert!(parse_engineering("5x").is_err());
/// # Ok::<(), nanonis_control::NanonisError>(())
/// ```
pub fn parse_engineering(input: &str) -> Result<f64, NanonisError> {
    let literal = input.trim();

    if let Some(last) = literal.chars().last() {
        if let Some(exponent) = prefix_exponent(last) {
            let mantissa = &literal[..literal.len() - last.len_utf8()];
            if let Ok(value) = mantissa.parse::<f64>() {
                return Ok(scale(value, exponent));
            }
        }
    }

    literal
        .parse::<f64>()
        .map_err(|_| NanonisError::InvalidValue(format!("Cannot parse '{input}' as a number")))
}
