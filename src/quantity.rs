//! Kubernetes resource quantities.
//!
//! Storage sizes (`maxWrite`, buffer sizes) are whole byte counts; CPU and memory values on
//! container resources are compared numerically so that `100m` equals `0.1`.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::{OptionExt, ResultExt, Snafu};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum QuantityError {
    #[snafu(display("empty quantity"))]
    Empty,
    #[snafu(display("invalid number in quantity {:?}", quantity))]
    InvalidNumber {
        quantity: String,
        source: std::num::ParseFloatError,
    },
    #[snafu(display("unknown suffix {:?} in quantity {:?}", suffix, quantity))]
    UnknownSuffix { quantity: String, suffix: String },
    #[snafu(display("quantity {:?} is not a whole number of bytes", quantity))]
    NotWholeBytes { quantity: String },
    #[snafu(display("quantity {:?} is out of range", quantity))]
    OutOfRange { quantity: String },
}

const BINARY: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL: [(&str, i32); 8] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
];

fn split(quantity: &str) -> (&str, &str) {
    let end = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(quantity.len());
    quantity.split_at(end)
}

fn multiplier(quantity: &str, suffix: &str) -> Result<f64, QuantityError> {
    if suffix.is_empty() {
        return Ok(1.0);
    }
    if let Some((_, shift)) = BINARY.iter().find(|(s, _)| *s == suffix) {
        return Ok((1u64 << shift) as f64);
    }
    if let Some((_, exp)) = DECIMAL.iter().find(|(s, _)| *s == suffix) {
        return Ok(10f64.powi(*exp));
    }
    if suffix == "E" {
        return Ok(1e18);
    }
    if let Some(exp) = suffix.strip_prefix(['e', 'E']) {
        if let Ok(exp) = exp.parse::<i32>() {
            return Ok(10f64.powi(exp));
        }
    }
    UnknownSuffixSnafu { quantity, suffix }.fail()
}

/// Power of ten for decimal suffixes that scale up: `k` through `E` and `e<N>` with `N >= 0`.
fn positive_exponent(suffix: &str) -> Option<u32> {
    if suffix == "E" {
        return Some(18);
    }
    if let Some((_, exp)) = DECIMAL.iter().find(|(s, _)| *s == suffix) {
        return u32::try_from(*exp).ok();
    }
    suffix.strip_prefix(['e', 'E'])?.parse::<u32>().ok()
}

/// Numeric value of a quantity, in base units.
pub fn parse_value(quantity: &str) -> Result<f64, QuantityError> {
    let quantity = quantity.trim();
    if quantity.is_empty() {
        return EmptySnafu.fail();
    }
    let (number, suffix) = split(quantity);
    let number: f64 = number.parse().context(InvalidNumberSnafu { quantity })?;
    Ok(number * multiplier(quantity, suffix)?)
}

/// Parses a storage size into a byte count.
pub fn parse_quantity(quantity: &str) -> Result<u64, QuantityError> {
    let trimmed = quantity.trim();
    if trimmed.is_empty() {
        return EmptySnafu.fail();
    }
    let (number, suffix) = split(trimmed);

    // Integers with a binary suffix are computed exactly.
    if let (Ok(whole), Some((_, shift))) = (
        number.parse::<u64>(),
        BINARY.iter().find(|(s, _)| *s == suffix),
    ) {
        return whole
            .checked_mul(1u64 << shift)
            .context(OutOfRangeSnafu { quantity });
    }
    if let (Ok(whole), true) = (number.parse::<u64>(), suffix.is_empty()) {
        return Ok(whole);
    }
    // So are integers with a decimal suffix that scales up.
    if let (Ok(whole), Some(exp)) = (number.parse::<u64>(), positive_exponent(suffix)) {
        return 10u64
            .checked_pow(exp)
            .and_then(|scale| whole.checked_mul(scale))
            .context(OutOfRangeSnafu { quantity });
    }

    let value = parse_value(trimmed)?;
    if value < 0.0 || value > u64::MAX as f64 {
        return OutOfRangeSnafu { quantity }.fail();
    }
    if value.fract() != 0.0 {
        return NotWholeBytesSnafu { quantity }.fail();
    }
    Ok(value as u64)
}

/// Canonical text for a byte count: the largest binary suffix that divides it exactly.
pub fn serialize_quantity(bytes: u64) -> String {
    if bytes == 0 {
        return "0".to_string();
    }
    BINARY
        .iter()
        .rev()
        .find(|(_, shift)| bytes.trailing_zeros() >= *shift)
        .map(|(suffix, shift)| format!("{}{}", bytes >> shift, suffix))
        .unwrap_or_else(|| bytes.to_string())
}

pub fn to_bytes(quantity: &Quantity) -> Result<u64, QuantityError> {
    parse_quantity(&quantity.0)
}

/// Numeric equality of two quantities; unparseable values fall back to text equality.
pub fn same_value(a: &Quantity, b: &Quantity) -> bool {
    match (parse_value(&a.0), parse_value(&b.0)) {
        (Ok(a), Ok(b)) => (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0),
        _ => a.0 == b.0,
    }
}
