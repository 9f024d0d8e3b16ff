//! PostgreSQL connections backed by an `r2d2` pool.
//!
//! Values cross the wire in binary format, so every JSON value is encoded
//! for the type the server declared for its placeholder, and every column
//! is decoded by its declared type:
//!
//! | Column type                  | JSON                           |
//! |------------------------------|--------------------------------|
//! | `bool`, integers, floats     | bool / number                  |
//! | `numeric`                    | string, exact digits           |
//! | `json`, `jsonb`              | the document itself            |
//! | `timestamp`, `date`, `time`  | string (`2024-01-02 03:04:05`) |
//! | `timestamptz`                | RFC 3339 string                |
//! | `uuid`, text types           | string                         |
//!
//! Any other column type is an error rather than a silent `null`.

use std::error::Error as StdError;
use std::fmt::Write as _;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use r2d2_postgres::postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use r2d2_postgres::postgres::{self, NoTls};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{Connection, Grammar, PoolOptions, Row};
use crate::error::Result;

type BoxError = Box<dyn StdError + Sync + Send>;

/// Settings under `database.connections.<name>`.
#[derive(Clone, Debug, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub options: PoolOptions,
}

fn default_host() -> String { "localhost".to_owned() }
fn default_port() -> u16 { 5432 }

pub struct PostgresConnection {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresConnection {
    pub fn connect(config: &PostgresConfig) -> Result<Self> {
        let mut pg = postgres::Config::new();
        pg.host(&config.host).port(config.port).dbname(&config.database);
        if let Some(user) = &config.username {
            pg.user(user);
        }
        if let Some(password) = &config.password {
            pg.password(password);
        }

        let manager = PostgresConnectionManager::new(pg, NoTls);
        let pool = config.options.pool_builder().build(manager)?;

        debug!(host = %config.host, port = config.port, database = %config.database, "postgres pool ready");
        Ok(Self { pool })
    }
}

impl Connection for PostgresConnection {
    fn grammar(&self) -> Grammar {
        Grammar::Postgres
    }

    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        let params = Params::new(bindings);
        let mut client = self.pool.get()?;
        let rows = client.query(sql, &params.refs())?;
        trace!(rows = rows.len(), "select finished");
        rows.iter().map(to_row).collect()
    }

    fn statement(&self, sql: &str, bindings: &[Value]) -> Result<u64> {
        let params = Params::new(bindings);
        let mut client = self.pool.get()?;
        Ok(client.execute(sql, &params.refs())?)
    }
}

// ── Parameters ───────────────────────────────────────────────────────────────

/// A JSON value bound to whatever type the server expects for the
/// placeholder. Values that cannot be encoded as that type fail the
/// statement instead of sending malformed bytes.
#[derive(Debug)]
struct Param(Value);

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match &self.0 {
            Value::Null => Ok(IsNull::Yes),
            value if matches!(*ty, Type::JSON | Type::JSONB) => value.to_sql(ty, out),
            Value::Bool(b) if *ty == Type::BOOL => b.to_sql(ty, out),
            Value::Bool(b) => text(&b.to_string(), ty, out),
            Value::Number(n) => match *ty {
                Type::INT2    => i16::try_from(int(n)?)?.to_sql(ty, out),
                Type::INT4    => i32::try_from(int(n)?)?.to_sql(ty, out),
                Type::INT8    => int(n)?.to_sql(ty, out),
                Type::OID     => u32::try_from(int(n)?)?.to_sql(ty, out),
                Type::FLOAT4  => (float(n)? as f32).to_sql(ty, out),
                Type::FLOAT8  => float(n)?.to_sql(ty, out),
                Type::NUMERIC => encode_numeric(&n.to_string(), out),
                _             => text(&n.to_string(), ty, out),
            },
            Value::String(s) => string_to_sql(s, ty, out),
            other => text(&other.to_string(), ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Strings are parsed into the declared type, so dates, uuids and numbers
/// written as text bind to their native columns.
fn string_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL        => s.parse::<bool>()?.to_sql(ty, out),
        Type::INT2        => s.parse::<i16>()?.to_sql(ty, out),
        Type::INT4        => s.parse::<i32>()?.to_sql(ty, out),
        Type::INT8        => s.parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4      => s.parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8      => s.parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC     => encode_numeric(s, out),
        Type::TIMESTAMP   => parse_datetime(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_datetime_tz(s)?.to_sql(ty, out),
        Type::DATE        => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME        => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::UUID        => Uuid::parse_str(s)?.to_sql(ty, out),
        _                 => text(s, ty, out),
    }
}

fn text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !<&str as ToSql>::accepts(ty) {
        return Err(format!("cannot bind {s:?} to a parameter of type {ty}").into());
    }
    s.to_sql(ty, out)
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, BoxError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(Into::into)
}

/// RFC 3339, or a naive timestamp taken as UTC.
fn parse_datetime_tz(s: &str) -> Result<DateTime<Utc>, BoxError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(_) => Ok(parse_datetime(s)?.and_utc()),
    }
}

fn int(n: &serde_json::Number) -> Result<i64, BoxError> {
    n.as_i64().ok_or_else(|| format!("{n} is not an integer").into())
}

fn float(n: &serde_json::Number) -> Result<f64, BoxError> {
    n.as_f64().ok_or_else(|| format!("{n} is not a number").into())
}

struct Params(Vec<Param>);

impl Params {
    fn new(bindings: &[Value]) -> Self {
        Self(bindings.iter().cloned().map(Param).collect())
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.0.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

// ── Rows ─────────────────────────────────────────────────────────────────────

fn to_row(row: &postgres::Row) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| -> Result<(String, Value)> {
            let Cell(value) = row.try_get(i)?;
            Ok((column.name().to_owned(), value))
        })
        .collect()
}

/// One column value decoded by its declared type.
#[derive(Debug, PartialEq)]
struct Cell(Value);

impl<'a> FromSql<'a> for Cell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL        => Value::from(bool::from_sql(ty, raw)?),
            Type::INT2        => Value::from(i16::from_sql(ty, raw)?),
            Type::INT4        => Value::from(i32::from_sql(ty, raw)?),
            Type::INT8        => Value::from(i64::from_sql(ty, raw)?),
            Type::OID         => Value::from(u32::from_sql(ty, raw)?),
            Type::FLOAT4      => Value::from(f32::from_sql(ty, raw)?),
            Type::FLOAT8      => Value::from(f64::from_sql(ty, raw)?),
            Type::NUMERIC     => Value::String(decode_numeric(raw)?),
            Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
            Type::TIMESTAMP   => Value::String(NaiveDateTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMPTZ => Value::String(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
            Type::DATE        => Value::String(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME        => Value::String(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::UUID        => Value::String(Uuid::from_sql(ty, raw)?.to_string()),
            _ if <String as FromSql<'_>>::accepts(ty) => Value::String(String::from_sql(ty, raw)?),
            _ => return Err(format!("unsupported column type {ty}").into()),
        };
        Ok(Self(value))
    }

    fn from_sql_null(_: &Type) -> Result<Self, BoxError> {
        Ok(Self(Value::Null))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

// ── numeric ──────────────────────────────────────────────────────────────────
//
// Binary layout: ndigits i16, weight i16, sign u16, dscale u16, then
// ndigits base-10000 digits. The value is the sum of
// digit[i] * 10000^(weight - i).

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let header = |i: usize| -> Result<u16, BoxError> {
        raw.get(i..i + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric".into())
    };
    let ndigits = usize::from(header(0)?);
    let weight = i64::from(header(2)? as i16);
    let sign = header(4)?;
    let dscale = usize::from(header(6)?);

    if sign == NUMERIC_NAN {
        return Ok("NaN".to_owned());
    }
    let digits = (0..ndigits)
        .map(|i| header(8 + 2 * i).map(|d| d as i16))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |idx: i64| -> i16 {
        usize::try_from(idx).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight {
            if idx == 0 {
                write!(out, "{}", digit(idx))?;
            } else {
                write!(out, "{:04}", digit(idx))?;
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit(idx))?;
            idx += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("nan") {
        for field in [0, 0, NUMERIC_NAN, 0] {
            out.put_u16(field);
        }
        return Ok(IsNull::No);
    }

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !is_digits(int_part) || !is_digits(frac_part) {
        return Err(format!("{text:?} is not a decimal number").into());
    }

    let int_part = int_part.trim_start_matches('0');
    let dscale = u16::try_from(frac_part.len())?;
    let int_digits = format!("{}{int_part}", "0".repeat((4 - int_part.len() % 4) % 4));
    let frac_digits = format!("{frac_part}{}", "0".repeat((4 - frac_part.len() % 4) % 4));

    let mut groups = (0..int_digits.len())
        .step_by(4)
        .map(|i| int_digits[i..i + 4].parse::<i16>())
        .chain((0..frac_digits.len()).step_by(4).map(|i| frac_digits[i..i + 4].parse::<i16>()))
        .collect::<Result<Vec<_>, _>>()?;
    let mut weight = i16::try_from(int_digits.len() / 4)? - 1;

    let leading = groups.iter().take_while(|&&d| d == 0).count();
    groups.drain(..leading);
    weight -= i16::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    out.put_i16(i16::try_from(groups.len())?);
    out.put_i16(weight);
    out.put_u16(if negative && !groups.is_empty() { NUMERIC_NEG } else { NUMERIC_POS });
    out.put_u16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(IsNull::No)
}
