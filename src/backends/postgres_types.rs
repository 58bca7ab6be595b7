//! PostgreSQL wire codecs
//!
//! Parameters are sent in binary format for booleans, integers, floats and
//! `bytea`, and as text for every other parameter type so that the server
//! performs the conversion (`uuid`, `timestamp`, `numeric`, ...).
//!
//! Columns always arrive in binary format. Types without a native
//! [`SqlValue`] counterpart are rendered the way the server prints them in
//! its text output (`numeric`, `date`, `time`, `interval`, `inet`, arrays).

use crate::core::error::StorageError;
use crate::core::value::SqlValue;
use bytes::BytesMut;
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_postgres::types::{to_sql_checked, Format, FromSql, IsNull, Kind, ToSql, Type};

pub(crate) type DriverError = Box<dyn StdError + Sync + Send>;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

// 2000-01-01 counted from 1970-01-01
const POSTGRES_EPOCH_DAYS: i64 = 10_957;

const NUMERIC_NEGATIVE: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_POSITIVE_INFINITY: u16 = 0xD000;
const NUMERIC_NEGATIVE_INFINITY: u16 = 0xF000;

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

fn is_binary_parameter(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL | Type::INT2 | Type::INT4 | Type::INT8 | Type::FLOAT4 | Type::FLOAT8 | Type::BYTEA
    )
}

fn cast_error(value: &SqlValue, ty: &Type) -> DriverError {
    Box::new(StorageError::incorrect_parameter_cast(format!(
        "{} value \"{}\" can't be sent as {}",
        value.type_name(),
        value,
        ty
    )))
}

/// Positional parameter as seen by the driver
#[derive(Debug)]
pub(crate) struct PgParam<'a>(pub(crate) &'a SqlValue);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, DriverError> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => value.as_bool().ok_or_else(|| cast_error(value, ty))?.to_sql(ty, out),
            Type::INT2 => {
                let long = value.as_long().ok_or_else(|| cast_error(value, ty))?;
                i16::try_from(long)
                    .map_err(|_| cast_error(value, ty))?
                    .to_sql(ty, out)
            }
            Type::INT4 => {
                let long = value.as_long().ok_or_else(|| cast_error(value, ty))?;
                i32::try_from(long)
                    .map_err(|_| cast_error(value, ty))?
                    .to_sql(ty, out)
            }
            Type::INT8 => value.as_long().ok_or_else(|| cast_error(value, ty))?.to_sql(ty, out),
            Type::FLOAT4 => {
                let double = value.as_double().ok_or_else(|| cast_error(value, ty))?;
                (double as f32).to_sql(ty, out)
            }
            Type::FLOAT8 => value.as_double().ok_or_else(|| cast_error(value, ty))?.to_sql(ty, out),
            Type::BYTEA => value.as_bytes().ok_or_else(|| cast_error(value, ty))?.to_sql(ty, out),
            _ => {
                match value {
                    SqlValue::Bytes(raw) => out.extend_from_slice(raw),
                    other => out.extend_from_slice(other.to_string().as_bytes()),
                }
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, ty: &Type) -> Format {
        if is_binary_parameter(ty) {
            Format::Binary
        } else {
            Format::Text
        }
    }

    to_sql_checked!();
}

/// Column value decoded from the binary wire format
pub(crate) struct PgValue(pub(crate) SqlValue);

impl<'a> FromSql<'a> for PgValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, DriverError> {
        match ty.kind() {
            Kind::Array(_) => {
                let elements = Vec::<PgValue>::from_sql(ty, raw)?;
                return Ok(PgValue(SqlValue::String(render_array(&elements))));
            }
            Kind::Domain(base) => return PgValue::from_sql(base, raw),
            Kind::Enum(_) => return Ok(PgValue(text_or_bytes(raw))),
            _ => {}
        }

        let value = match *ty {
            Type::BOOL => SqlValue::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => SqlValue::Long(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => SqlValue::Long(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => SqlValue::Long(i64::from_sql(ty, raw)?),
            Type::OID => SqlValue::Long(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => SqlValue::Double(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => SqlValue::Double(f64::from_sql(ty, raw)?),
            Type::BYTEA => SqlValue::Bytes(raw.to_vec()),
            Type::UUID if raw.len() == 16 => SqlValue::String(format_uuid(raw)),
            Type::NUMERIC => SqlValue::String(decode_numeric(raw)?),
            Type::DATE => SqlValue::String(format_date(read_i32(raw)?)),
            Type::TIME => SqlValue::String(format_time(read_i64(raw)?)),
            Type::TIMETZ => SqlValue::String(decode_timetz(raw)?),
            Type::INTERVAL => SqlValue::String(decode_interval(raw)?),
            Type::INET | Type::CIDR => SqlValue::String(decode_inet(raw, *ty == Type::CIDR)?),
            Type::MACADDR if raw.len() == 6 => SqlValue::String(format_mac(raw)),
            // microseconds since the Unix epoch
            Type::TIMESTAMP | Type::TIMESTAMPTZ => {
                let at = SystemTime::from_sql(ty, raw)?;
                let micros = match at.duration_since(UNIX_EPOCH) {
                    Ok(after) => after.as_micros() as i64,
                    Err(before) => -(before.duration().as_micros() as i64),
                };
                SqlValue::Long(micros)
            }
            // jsonb carries a one byte format version before the text
            Type::JSONB if raw.first() == Some(&1) => text_or_bytes(&raw[1..]),
            Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::CHAR
            | Type::JSON
            | Type::XML
            | Type::UNKNOWN => text_or_bytes(raw),
            _ if ty.name() == "citext" => text_or_bytes(raw),
            _ => SqlValue::Bytes(raw.to_vec()),
        };
        Ok(PgValue(value))
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, DriverError> {
        Ok(PgValue(SqlValue::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn text_or_bytes(raw: &[u8]) -> SqlValue {
    match std::str::from_utf8(raw) {
        Ok(text) => SqlValue::String(text.to_string()),
        Err(_) => SqlValue::Bytes(raw.to_vec()),
    }
}

fn malformed(ty: &str) -> DriverError {
    format!("malformed binary {} value", ty).into()
}

fn read_i16(raw: &[u8]) -> std::result::Result<i16, DriverError> {
    let bytes: [u8; 2] = raw.try_into().map_err(|_| malformed("int2"))?;
    Ok(i16::from_be_bytes(bytes))
}

fn read_i32(raw: &[u8]) -> std::result::Result<i32, DriverError> {
    let bytes: [u8; 4] = raw.try_into().map_err(|_| malformed("int4"))?;
    Ok(i32::from_be_bytes(bytes))
}

fn read_i64(raw: &[u8]) -> std::result::Result<i64, DriverError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| malformed("int8"))?;
    Ok(i64::from_be_bytes(bytes))
}

fn format_uuid(raw: &[u8]) -> String {
    let hex = hex::encode(raw);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn format_mac(raw: &[u8]) -> String {
    raw.iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

/// Decimal text of a `numeric`: header of four `i16` (digit count, weight,
/// sign, display scale) followed by base-10000 digits
fn decode_numeric(raw: &[u8]) -> std::result::Result<String, DriverError> {
    if raw.len() < 8 {
        return Err(malformed("numeric"));
    }
    let ndigits = usize::try_from(read_i16(&raw[0..2])?).map_err(|_| malformed("numeric"))?;
    let weight = i64::from(read_i16(&raw[2..4])?);
    let sign = u16::from_be_bytes([raw[4], raw[5]]);
    let dscale = usize::try_from(read_i16(&raw[6..8])?).map_err(|_| malformed("numeric"))?;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_POSITIVE_INFINITY => return Ok("Infinity".to_string()),
        NUMERIC_NEGATIVE_INFINITY => return Ok("-Infinity".to_string()),
        _ => {}
    }
    if raw.len() != 8 + ndigits * 2 {
        return Err(malformed("numeric"));
    }

    let digits: Vec<i16> = raw[8..]
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let digit = |position: i64| -> i16 {
        usize::try_from(position)
            .ok()
            .and_then(|index| digits.get(index).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEGATIVE {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        for position in 0..=weight {
            if position == 0 {
                let _ = write!(text, "{}", digit(position));
            } else {
                let _ = write!(text, "{:04}", digit(position));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut position = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit(position));
            position += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Ok(text)
}

/// Proleptic Gregorian (year, month, day) from days since 1970-01-01
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let day_of_era = z - era * 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * shifted_month + 2) / 5 + 1;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    };
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// ISO date from days since 2000-01-01
fn format_date(days: i32) -> String {
    match days {
        i32::MAX => return "infinity".to_string(),
        i32::MIN => return "-infinity".to_string(),
        _ => {}
    }

    let (year, month, day) = civil_from_days(i64::from(days) + POSTGRES_EPOCH_DAYS);
    if year > 0 {
        format!("{:04}-{:02}-{:02}", year, month, day)
    } else {
        format!("{:04}-{:02}-{:02} BC", 1 - year, month, day)
    }
}

fn push_clock(text: &mut String, micros: i64) {
    let hours = micros / MICROS_PER_HOUR;
    let minutes = micros % MICROS_PER_HOUR / MICROS_PER_MINUTE;
    let seconds = micros % MICROS_PER_MINUTE / MICROS_PER_SECOND;
    let fraction = micros % MICROS_PER_SECOND;

    let _ = write!(text, "{:02}:{:02}:{:02}", hours, minutes, seconds);
    if fraction != 0 {
        let digits = format!("{:06}", fraction);
        text.push('.');
        text.push_str(digits.trim_end_matches('0'));
    }
}

/// Time of day from microseconds since midnight
fn format_time(micros: i64) -> String {
    let mut text = String::with_capacity(15);
    push_clock(&mut text, micros);
    text
}

/// `time with time zone`: microseconds since midnight and the zone offset in
/// seconds west of UTC
fn decode_timetz(raw: &[u8]) -> std::result::Result<String, DriverError> {
    if raw.len() != 12 {
        return Err(malformed("timetz"));
    }
    let mut text = format_time(read_i64(&raw[0..8])?);

    let east = -i64::from(read_i32(&raw[8..12])?);
    let offset = east.abs();
    text.push(if east < 0 { '-' } else { '+' });
    let _ = write!(text, "{:02}", offset / 3600);
    if offset % 3600 != 0 {
        let _ = write!(text, ":{:02}", offset / 60 % 60);
        if offset % 60 != 0 {
            let _ = write!(text, ":{:02}", offset % 60);
        }
    }
    Ok(text)
}

/// `interval` in the server's default output style, e.g.
/// `1 year 2 mons -3 days +04:05:06.5`
fn decode_interval(raw: &[u8]) -> std::result::Result<String, DriverError> {
    if raw.len() != 16 {
        return Err(malformed("interval"));
    }
    let micros = read_i64(&raw[0..8])?;
    let days = i64::from(read_i32(&raw[8..12])?);
    let months = i64::from(read_i32(&raw[12..16])?);

    let mut text = String::new();
    // a preceding negative part makes the next positive one explicit
    let mut after_negative = false;

    for (value, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
        if value == 0 {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        if after_negative && value > 0 {
            text.push('+');
        }
        let _ = write!(text, "{} {}{}", value, unit, if value != 1 { "s" } else { "" });
        after_negative = value < 0;
    }

    if text.is_empty() || micros != 0 {
        if !text.is_empty() {
            text.push(' ');
        }
        if micros < 0 {
            text.push('-');
        } else if after_negative {
            text.push('+');
        }
        push_clock(&mut text, micros.abs());
    }

    Ok(text)
}

/// `inet`/`cidr`: family, prefix bits, cidr flag, address length, address
fn decode_inet(raw: &[u8], cidr: bool) -> std::result::Result<String, DriverError> {
    let (family, bits, address) = match raw {
        [family, bits, _, length, address @ ..] if usize::from(*length) == address.len() => {
            (*family, *bits, address)
        }
        _ => return Err(malformed("inet")),
    };

    let (address, max_bits) = match (family, address.len()) {
        (PGSQL_AF_INET, 4) => {
            let octets: [u8; 4] = address.try_into().map_err(|_| malformed("inet"))?;
            (IpAddr::V4(Ipv4Addr::from(octets)), 32)
        }
        (PGSQL_AF_INET6, 16) => {
            let octets: [u8; 16] = address.try_into().map_err(|_| malformed("inet"))?;
            (IpAddr::V6(Ipv6Addr::from(octets)), 128)
        }
        _ => return Err(malformed("inet")),
    };

    if cidr || bits != max_bits {
        Ok(format!("{}/{}", address, bits))
    } else {
        Ok(address.to_string())
    }
}

/// One-dimensional array in the server's `{a,b,NULL}` text form
fn render_array(elements: &[PgValue]) -> String {
    let mut text = String::from("{");
    for (i, PgValue(element)) in elements.iter().enumerate() {
        if i > 0 {
            text.push(',');
        }
        match element {
            SqlValue::Null => text.push_str("NULL"),
            SqlValue::Bool(flag) => text.push(if *flag { 't' } else { 'f' }),
            SqlValue::Long(long) => {
                let _ = write!(text, "{}", long);
            }
            SqlValue::Double(double) => {
                let _ = write!(text, "{}", double);
            }
            SqlValue::String(item) => push_array_item(&mut text, item),
            SqlValue::Bytes(bytes) => push_array_item(&mut text, &format!("\\x{}", hex::encode(bytes))),
        }
    }
    text.push('}');
    text
}

fn push_array_item(text: &mut String, item: &str) {
    let needs_quotes = item.is_empty()
        || item.eq_ignore_ascii_case("NULL")
        || item
            .chars()
            .any(|ch| matches!(ch, '{' | '}' | ',' | '"' | '\\') || ch.is_whitespace());

    if !needs_quotes {
        text.push_str(item);
        return;
    }

    text.push('"');
    for ch in item.chars() {
        if ch == '"' || ch == '\\' {
            text.push('\\');
        }
        text.push(ch);
    }
    text.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(ty: &Type, raw: &[u8]) -> SqlValue {
        PgValue::from_sql(ty, raw).unwrap().0
    }

    fn numeric(ndigits: i16, weight: i16, sign: u16, dscale: i16, digits: &[i16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for digit in digits {
            raw.extend_from_slice(&digit.to_be_bytes());
        }
        raw
    }

    fn interval(micros: i64, days: i32, months: i32) -> Vec<u8> {
        let mut raw = micros.to_be_bytes().to_vec();
        raw.extend_from_slice(&days.to_be_bytes());
        raw.extend_from_slice(&months.to_be_bytes());
        raw
    }

    #[test]
    fn test_parameter_formats() {
        let value = SqlValue::from("42");
        let param = PgParam(&value);
        assert!(matches!(param.encode_format(&Type::INT4), Format::Binary));
        assert!(matches!(param.encode_format(&Type::BYTEA), Format::Binary));
        assert!(matches!(param.encode_format(&Type::UUID), Format::Text));
        assert!(matches!(param.encode_format(&Type::VARCHAR), Format::Text));
    }

    #[test]
    fn test_parameter_encoding() {
        let mut out = BytesMut::new();

        let text = SqlValue::from("42");
        assert!(matches!(PgParam(&text).to_sql(&Type::INT4, &mut out), Ok(IsNull::No)));
        assert_eq!(&out[..], &42i32.to_be_bytes());

        out.clear();
        let flag = SqlValue::Bool(true);
        assert!(PgParam(&flag).to_sql(&Type::TEXT, &mut out).is_ok());
        assert_eq!(&out[..], b"true");

        out.clear();
        assert!(matches!(
            PgParam(&SqlValue::Null).to_sql(&Type::INT8, &mut out),
            Ok(IsNull::Yes)
        ));

        let overflow = SqlValue::Long(i64::from(i16::MAX) + 1);
        assert!(PgParam(&overflow).to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_fractional_double_is_not_an_integer() {
        let mut out = BytesMut::new();

        let fractional = SqlValue::Double(1.7);
        let err = PgParam(&fractional)
            .to_sql(&Type::INT8, &mut out)
            .err()
            .unwrap();
        assert!(err.to_string().contains("1.7"));
        assert!(PgParam(&fractional).to_sql(&Type::INT4, &mut out).is_err());

        out.clear();
        let integral = SqlValue::Double(2.0);
        assert!(PgParam(&integral).to_sql(&Type::INT8, &mut out).is_ok());
        assert_eq!(&out[..], &2i64.to_be_bytes());
    }

    #[test]
    fn test_value_decoding() {
        assert_eq!(decode(&Type::INT4, &7i32.to_be_bytes()), SqlValue::Long(7));
        assert_eq!(decode(&Type::VARCHAR, b"hello"), SqlValue::from("hello"));

        let raw = [
            0x55, 0x0e, 0x84, 0x00, 0xe2, 0x9b, 0x41, 0xd4, 0xa7, 0x16, 0x44, 0x66, 0x55, 0x44,
            0x00, 0x00,
        ];
        assert_eq!(
            decode(&Type::UUID, &raw),
            SqlValue::from("550e8400-e29b-41d4-a716-446655440000")
        );

        assert_eq!(decode(&Type::JSONB, b"\x01{\"a\":1}"), SqlValue::from("{\"a\":1}"));
        assert_eq!(
            decode(&Type::BYTEA, br"\x6869"),
            SqlValue::Bytes(br"\x6869".to_vec())
        );

        let PgValue(value) = PgValue::from_sql_null(&Type::TEXT).unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_numeric_decoding() {
        assert_eq!(decode(&Type::NUMERIC, &[0, 1, 0, 0, 0, 0, 0, 0, 0, 1]), SqlValue::from("1"));
        assert_eq!(decode(&Type::NUMERIC, &numeric(1, 0, 0, 0, &[10])), SqlValue::from("10"));
        assert_eq!(decode(&Type::NUMERIC, &numeric(1, 1, 0, 0, &[2])), SqlValue::from("20000"));
        assert_eq!(
            decode(&Type::NUMERIC, &numeric(3, 1, 0, 3, &[1, 2345, 6780])),
            SqlValue::from("12345.678")
        );
        assert_eq!(
            decode(&Type::NUMERIC, &numeric(1, -1, NUMERIC_NEGATIVE, 2, &[500])),
            SqlValue::from("-0.05")
        );
        assert_eq!(
            decode(&Type::NUMERIC, &numeric(2, -1, 0, 7, &[1, 2340])),
            SqlValue::from("0.0001234")
        );
        assert_eq!(
            decode(&Type::NUMERIC, &numeric(1, -2, 0, 8, &[1])),
            SqlValue::from("0.00000001")
        );
        assert_eq!(decode(&Type::NUMERIC, &numeric(0, 0, 0, 2, &[])), SqlValue::from("0.00"));
        assert_eq!(decode(&Type::NUMERIC, &numeric(0, 0, NUMERIC_NAN, 0, &[])), SqlValue::from("NaN"));

        assert!(PgValue::from_sql(&Type::NUMERIC, &numeric(2, 0, 0, 0, &[1])).is_err());
    }

    #[test]
    fn test_date_decoding() {
        assert_eq!(decode(&Type::DATE, &0i32.to_be_bytes()), SqlValue::from("2000-01-01"));
        assert_eq!(decode(&Type::DATE, &1i32.to_be_bytes()), SqlValue::from("2000-01-02"));
        assert_eq!(decode(&Type::DATE, &(-1i32).to_be_bytes()), SqlValue::from("1999-12-31"));
        assert_eq!(decode(&Type::DATE, &7305i32.to_be_bytes()), SqlValue::from("2020-01-01"));
        assert_eq!(decode(&Type::DATE, &59i32.to_be_bytes()), SqlValue::from("2000-02-29"));
        assert_eq!(decode(&Type::DATE, &i32::MAX.to_be_bytes()), SqlValue::from("infinity"));
    }

    #[test]
    fn test_time_decoding() {
        let micros = 13 * MICROS_PER_HOUR + 5 * MICROS_PER_MINUTE + 7 * MICROS_PER_SECOND;
        assert_eq!(decode(&Type::TIME, &micros.to_be_bytes()), SqlValue::from("13:05:07"));
        assert_eq!(
            decode(&Type::TIME, &(micros + 250_000).to_be_bytes()),
            SqlValue::from("13:05:07.25")
        );

        let mut raw = micros.to_be_bytes().to_vec();
        raw.extend_from_slice(&(-19_800i32).to_be_bytes());
        assert_eq!(decode(&Type::TIMETZ, &raw), SqlValue::from("13:05:07+05:30"));

        let mut raw = micros.to_be_bytes().to_vec();
        raw.extend_from_slice(&3600i32.to_be_bytes());
        assert_eq!(decode(&Type::TIMETZ, &raw), SqlValue::from("13:05:07-01"));
    }

    #[test]
    fn test_interval_decoding() {
        let clock = 4 * MICROS_PER_HOUR + 5 * MICROS_PER_MINUTE + 6 * MICROS_PER_SECOND + 500_000;
        assert_eq!(
            decode(&Type::INTERVAL, &interval(clock, 3, 14)),
            SqlValue::from("1 year 2 mons 3 days 04:05:06.5")
        );
        assert_eq!(decode(&Type::INTERVAL, &interval(0, 0, 0)), SqlValue::from("00:00:00"));
        assert_eq!(decode(&Type::INTERVAL, &interval(0, 1, 0)), SqlValue::from("1 day"));
        assert_eq!(
            decode(&Type::INTERVAL, &interval(MICROS_PER_HOUR, -1, 0)),
            SqlValue::from("-1 days +01:00:00")
        );
        assert_eq!(
            decode(&Type::INTERVAL, &interval(-90 * MICROS_PER_MINUTE, 0, 0)),
            SqlValue::from("-01:30:00")
        );
    }

    #[test]
    fn test_network_decoding() {
        assert_eq!(
            decode(&Type::INET, &[PGSQL_AF_INET, 32, 0, 4, 192, 168, 0, 1]),
            SqlValue::from("192.168.0.1")
        );
        assert_eq!(
            decode(&Type::INET, &[PGSQL_AF_INET, 24, 0, 4, 192, 168, 0, 1]),
            SqlValue::from("192.168.0.1/24")
        );
        assert_eq!(
            decode(&Type::CIDR, &[PGSQL_AF_INET, 32, 1, 4, 10, 0, 0, 1]),
            SqlValue::from("10.0.0.1/32")
        );

        let mut v6 = vec![PGSQL_AF_INET6, 128, 0, 16];
        v6.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(decode(&Type::INET, &v6), SqlValue::from("::1"));

        assert_eq!(
            decode(&Type::MACADDR, &[0x08, 0x00, 0x2b, 0x01, 0x02, 0x03]),
            SqlValue::from("08:00:2b:01:02:03")
        );
    }

    #[test]
    fn test_array_rendering() {
        let elements = [
            PgValue(SqlValue::Long(1)),
            PgValue(SqlValue::Null),
            PgValue(SqlValue::from("plain")),
            PgValue(SqlValue::from("two words")),
            PgValue(SqlValue::from("say \"hi\"")),
            PgValue(SqlValue::from("")),
            PgValue(SqlValue::Bool(true)),
        ];
        assert_eq!(
            render_array(&elements),
            r#"{1,NULL,plain,"two words","say \"hi\"","",t}"#
        );
        assert_eq!(render_array(&[]), "{}");
    }

    #[test]
    fn test_unknown_types_stay_binary() {
        let point = [0u8, 0, 0, 0, 0, 0, 240, 63, 0, 0, 0, 0, 0, 0, 0, 64];
        assert_eq!(decode(&Type::POINT, &point), SqlValue::Bytes(point.to_vec()));
    }
}
