//! Fixed point numeric.
//!
//! Binary numerics are stored as 1, 2 or 4 little-endian 32-bit words,
//! most significant word first, holding the two's complement unscaled value.
//! The word count depends on declared precision.
use super::{DecodeError, Value};
use crate::{codec::read_u32_le, netezza::NzType};

/// Numeric with precision up to this many digits is returned as [`Value::Number`]
/// when the conversion is lossless.
pub const MAX_NATIVE_PRECISION: u8 = 15;

/// Number of 32-bit words used for given precision.
pub fn word_count(precision: u8) -> usize {
    match precision {
        0..=9 => 1,
        10..=18 => 2,
        _ => 4,
    }
}

/// Decode binary numeric.
pub fn decode(buf: &[u8], precision: u8, scale: u8) -> Result<Value, DecodeError> {
    let words = word_count(precision);
    if buf.len() < words * 4 {
        return Err(DecodeError::new(NzType::Numeric, "numeric shorter than its precision"));
    }

    // the most significant word carry the sign
    let mut value = read_u32_le(buf, 0).map_err(DecodeError::protocol(NzType::Numeric))? as i32 as i128;
    for i in 1..words {
        let word = read_u32_le(buf, i * 4).map_err(DecodeError::protocol(NzType::Numeric))?;
        value = (value << 32) | word as i128;
    }

    Ok(from_text(&format(value, scale), precision))
}

/// Render unscaled `value` with `scale` fractional digits.
///
/// A zero still keeps all of its fractional digits, e.g. `0.0000`.
pub fn format(value: i128, scale: u8) -> String {
    let mut itoa = itoa::Buffer::new();
    let digits = itoa.format(value.unsigned_abs());
    let scale = scale as usize;

    let mut out = String::with_capacity(digits.len() + scale + 3);
    if value < 0 {
        out.push('-');
    }

    // at least one digit before the point
    let mut padded = String::with_capacity(scale + 1);
    for _ in digits.len()..scale + 1 {
        padded.push('0');
    }
    padded.push_str(digits);

    let (int, frac) = padded.split_at(padded.len() - scale);
    out.push_str(int);
    if scale > 0 {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Choose native number or exact decimal text.
///
/// Precision above [`MAX_NATIVE_PRECISION`], or text that does not survive
/// the round trip through `f64`, stays as [`Value::Decimal`].
pub fn from_text(text: &str, precision: u8) -> Value {
    if precision > MAX_NATIVE_PRECISION {
        return Value::Decimal(text.to_owned());
    }

    let Ok(number) = text.parse::<f64>() else {
        return Value::Decimal(text.to_owned());
    };

    match normalize(text) == number.to_string() {
        true => Value::Number(number),
        false => Value::Decimal(text.to_owned()),
    }
}

/// Strip fractional trailing zeros and a negative zero sign.
fn normalize(text: &str) -> String {
    let mut text = match text.contains('.') {
        true => text.trim_end_matches('0').trim_end_matches('.'),
        false => text,
    };
    if text.is_empty() {
        text = "0";
    }
    match text {
        "-0" => "0".into(),
        text => text.into(),
    }
}

/// Precision and scale from the text mode type modifier.
///
/// Returns `None` for unconstrained numeric.
pub fn typmod(modifier: i32) -> Option<(u8, u8)> {
    if modifier < 4 {
        return None;
    }
    let modifier = modifier - 4;
    Some((((modifier >> 16) & 0xFFFF) as u8, (modifier & 0xFFFF) as u8))
}
