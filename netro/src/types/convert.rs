//! Pure decoders from raw column bytes into [`Value`].
//!
//! Binary fields (DBOS tuples) are little-endian and dispatched by
//! [`NzType`], text fields (`DataRow`) are dispatched by the column oid.
//!
//! Epoch based types count from `2000-01-01`, except `abstime` which counts
//! seconds from the unix epoch.
use std::fmt;
use time::{
    Date, Duration, PrimitiveDateTime, Time,
    macros::{datetime, format_description},
};
use uuid::Uuid;

use super::{DecodeError, Value, numeric};
use crate::{
    codec::{read_f32_le, read_f64_le, read_i8, read_i16_le, read_i32_le, read_i64_le},
    descriptor::{DbosField, FieldDescription},
    netezza::{NzType, Oid, oid},
};

/// `2000-01-01 00:00:00`, origin of date, timestamp and time with zone.
pub const NZ_EPOCH: PrimitiveDateTime = datetime!(2000-01-01 0:00);

/// `1970-01-01 00:00:00`, origin of `abstime`.
pub const UNIX_EPOCH: PrimitiveDateTime = datetime!(1970-01-01 0:00);

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Decode one DBOS field.
///
/// `column_oid` is the oid of the same column in `RowDescription`, used to
/// recognize uuid stored as binary.
pub fn decode_dbos(field: &DbosField, column_oid: Option<Oid>, buf: &[u8]) -> Result<Value, DecodeError> {
    let ty = field.nz_type;
    let err = DecodeError::protocol(ty);

    let value = match ty {
        NzType::Int1 => Value::Int(read_i8(buf, 0).map_err(err)?.into()),
        NzType::Int2 => Value::Int(read_i16_le(buf, 0).map_err(err)?.into()),
        NzType::Int => Value::Int(read_i32_le(buf, 0).map_err(err)?),
        NzType::Int8 => Value::BigInt(read_i64_le(buf, 0).map_err(err)?),
        NzType::Float => Value::Number(read_f32_le(buf, 0).map_err(err)?.into()),
        NzType::Double => Value::Number(read_f64_le(buf, 0).map_err(err)?),
        NzType::Bool => match buf.first() {
            Some(b) => Value::Bool(*b != 0),
            None => return Err(DecodeError::new(ty, "empty boolean")),
        },
        NzType::Date => Value::Date(date(read_i32_le(buf, 0).map_err(err)?)?),
        NzType::Time => Value::Time(time(read_i64_le(buf, 0).map_err(&err)?)?),
        NzType::Timestamp => Value::Timestamp(timestamp(read_i64_le(buf, 0).map_err(err)?)?),
        NzType::AbsTime => Value::Timestamp(abstime(read_i32_le(buf, 0).map_err(err)?)?),
        NzType::Interval => {
            let micros = read_i64_le(buf, 0).map_err(&err)?;
            let months = read_i32_le(buf, 8).map_err(&err)?;
            Value::Interval(interval(micros, months))
        },
        NzType::TimeTz => {
            let micros = read_i64_le(buf, 0).map_err(&err)?;
            let zone = read_i32_le(buf, 8).map_err(&err)?;
            Value::TimeTz(time_tz(micros, zone)?)
        },
        NzType::Numeric => {
            let (precision, scale) = field.precision_scale();
            numeric::decode(buf, precision, scale)?
        },
        NzType::Char | NzType::VarChar | NzType::VarFixedChar => Value::Text(latin9(buf)),
        NzType::NChar
        | NzType::NVarChar
        | NzType::NText
        | NzType::Text
        | NzType::Json
        | NzType::Jsonb
        | NzType::Jsonpath => Value::Text(String::from_utf8_lossy(buf).into_owned()),
        NzType::Binary | NzType::VarBinary if column_oid == Some(oid::UUID) && buf.len() == 16 => {
            Value::Uuid(uuid(buf)?)
        },
        _ => Value::Bytes(bytes::Bytes::copy_from_slice(buf)),
    };

    Ok(value)
}

/// Decode one text mode field.
///
/// Text that does not parse for the column type is kept as [`Value::Text`],
/// except for numbers and booleans which are an error.
pub fn decode_text(column: &FieldDescription, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = String::from_utf8_lossy(buf);
    let oid = column.oid;
    let invalid = |what: &'static str| DecodeError::text(oid, format!("invalid {what} `{text}`"));

    let value = match oid {
        oid::BOOL => match &*text {
            "t" | "true" | "1" | "y" | "yes" => Value::Bool(true),
            "f" | "false" | "0" | "n" | "no" => Value::Bool(false),
            _ => return Err(invalid("boolean")),
        },
        oid::INT2 | oid::INT4 | oid::BYTEINT | oid::OID => {
            Value::Int(text.trim().parse().map_err(|_| invalid("integer"))?)
        },
        oid::INT8 => Value::BigInt(text.trim().parse().map_err(|_| invalid("bigint"))?),
        oid::FLOAT4 | oid::FLOAT8 => Value::Number(text.trim().parse().map_err(|_| invalid("float"))?),
        oid::NUMERIC => {
            let precision = numeric::typmod(column.modifier).map_or(u8::MAX, |(p, _)| p);
            numeric::from_text(text.trim(), precision)
        },
        oid::DATE => match Date::parse(&text, DATE) {
            Ok(date) => Value::Date(date),
            Err(_) => Value::Text(text.into_owned()),
        },
        oid::TIME => match Time::parse(&text, TIME) {
            Ok(time) => Value::Time(time),
            Err(_) => Value::Text(text.into_owned()),
        },
        oid::UUID => match Uuid::parse_str(&text) {
            Ok(uuid) => Value::Uuid(uuid),
            Err(_) => Value::Text(text.into_owned()),
        },
        _ => Value::Text(text.into_owned()),
    };

    Ok(value)
}

const DATE: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

const TIME: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]");

/// Days since `2000-01-01`.
pub fn date(days: i32) -> Result<Date, DecodeError> {
    NZ_EPOCH
        .date()
        .checked_add(Duration::days(days.into()))
        .ok_or_else(|| DecodeError::new(NzType::Date, "date out of range"))
}

/// Microseconds since midnight.
pub fn time(micros: i64) -> Result<Time, DecodeError> {
    if !(0..MICROS_PER_DAY).contains(&micros) {
        return Err(DecodeError::new(NzType::Time, "time of day out of range"));
    }
    Ok(Time::MIDNIGHT + Duration::microseconds(micros))
}

/// Microseconds since `2000-01-01 00:00:00`.
pub fn timestamp(micros: i64) -> Result<PrimitiveDateTime, DecodeError> {
    NZ_EPOCH
        .checked_add(Duration::microseconds(micros))
        .ok_or_else(|| DecodeError::new(NzType::Timestamp, "timestamp out of range"))
}

/// Seconds since `1970-01-01 00:00:00`.
pub fn abstime(seconds: i32) -> Result<PrimitiveDateTime, DecodeError> {
    UNIX_EPOCH
        .checked_add(Duration::seconds(seconds.into()))
        .ok_or_else(|| DecodeError::new(NzType::AbsTime, "abstime out of range"))
}

/// Render interval as `<years> years <months> mons <time>`.
///
/// Days are folded into the hours of the time part.
pub fn interval(micros: i64, months: i32) -> String {
    let mut out = format!("{} years {} mons ", months / 12, months % 12);
    if micros < 0 {
        out.push('-');
    }
    push_clock(&mut out, micros.unsigned_abs());
    out
}

/// Render time with zone as `HH:MM:SS[.f]+HH[:MM[:SS]]`.
///
/// `zone` is seconds west of UTC, so the rendered sign is flipped.
pub fn time_tz(micros: i64, zone: i32) -> Result<String, DecodeError> {
    if !(0..MICROS_PER_DAY).contains(&micros) {
        return Err(DecodeError::new(NzType::TimeTz, "time of day out of range"));
    }

    let mut out = String::with_capacity(20);
    push_clock(&mut out, micros.unsigned_abs());

    let offset = -i64::from(zone);
    out.push(if offset < 0 { '-' } else { '+' });

    let offset = offset.unsigned_abs();
    let (hours, minutes, seconds) = (offset / 3600, offset % 3600 / 60, offset % 60);
    push_2(&mut out, hours);
    if minutes != 0 || seconds != 0 {
        out.push(':');
        push_2(&mut out, minutes);
    }
    if seconds != 0 {
        out.push(':');
        push_2(&mut out, seconds);
    }

    Ok(out)
}

/// Decode RK packed number.
///
/// When bit 1 is set the upper 30 bits are a signed integer, otherwise they
/// are the upper bits of a `f64`. When bit 0 is set the value is divided by 100.
pub fn rk(rk: u32) -> Value {
    let number = match rk & 0b10 != 0 {
        true => f64::from((rk as i32) >> 2),
        false => f64::from_bits(u64::from(rk & !0b11) << 32),
    };
    match rk & 0b01 != 0 {
        true => Value::Number(number / 100.0),
        false => Value::Number(number),
    }
}

/// Decode ISO-8859-15 text, used by `CHAR` and `VARCHAR` columns.
pub fn latin9(buf: &[u8]) -> String {
    buf.iter()
        .map(|&b| match b {
            0xA4 => '€',
            0xA6 => 'Š',
            0xA8 => 'š',
            0xB4 => 'Ž',
            0xB8 => 'ž',
            0xBC => 'Œ',
            0xBD => 'œ',
            0xBE => 'Ÿ',
            b => char::from(b),
        })
        .collect()
}

/// 16 bytes in network order.
pub fn uuid(buf: &[u8]) -> Result<Uuid, DecodeError> {
    Uuid::from_slice(buf).map_err(|e| DecodeError::new(NzType::Binary, e.to_string()))
}

/// Push `HH:MM:SS[.ffffff]`, hours may exceed a day, trailing fractional zeros trimmed.
fn push_clock(out: &mut String, micros: u64) {
    const MICROS: u64 = MICROS_PER_SECOND as u64;
    let seconds = micros / MICROS;
    let fraction = micros % MICROS;

    push_2(out, seconds / 3600);
    out.push(':');
    push_2(out, seconds % 3600 / 60);
    out.push(':');
    push_2(out, seconds % 60);

    if fraction != 0 {
        let digits = format!(".{fraction:06}");
        out.push_str(digits.trim_end_matches('0'));
    }
}

/// Push at least two digits.
fn push_2(out: &mut String, n: u64) {
    if n < 10 {
        out.push('0');
    }
    out.push_str(itoa::Buffer::new().format(n));
}

// ===== Display =====

pub(crate) fn fmt_date(date: Date, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}-{:02}", date.year(), date.month() as u8, date.day())
}

pub(crate) fn fmt_time(time: Time, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let micros = i64::from(time.hour()) * 3600 * MICROS_PER_SECOND
        + i64::from(time.minute()) * 60 * MICROS_PER_SECOND
        + i64::from(time.second()) * MICROS_PER_SECOND
        + i64::from(time.microsecond());
    let mut out = String::with_capacity(15);
    push_clock(&mut out, micros.unsigned_abs());
    f.write_str(&out)
}

pub(crate) fn fmt_timestamp(ts: PrimitiveDateTime, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt_date(ts.date(), f)?;
    f.write_str(" ")?;
    fmt_time(ts.time(), f)
}
