//! MySQL connections backed by an `r2d2` pool.
//!
//! Statements are prepared, so results arrive in the binary protocol.
//! Integers and floats decode to JSON numbers, `json` columns to the
//! document itself, and dates and times to strings. `decimal` columns keep
//! their exact digits as strings. Binary columns that are not valid UTF-8
//! are an error rather than a lossy string.

use r2d2::Pool;
use r2d2_mysql::MySqlConnectionManager;
use r2d2_mysql::mysql::consts::ColumnType;
use r2d2_mysql::mysql::prelude::Queryable;
use r2d2_mysql::mysql::{self, OptsBuilder, Params};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{Connection, Grammar, PoolOptions, Row};
use crate::error::{Error, Result};

/// Settings under `database.connections.<name>`.
#[derive(Clone, Debug, Deserialize)]
pub struct MySqlConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub options: PoolOptions,
}

fn default_host() -> String { "localhost".to_owned() }
fn default_port() -> u16 { 3306 }

pub struct MySqlConnection {
    pool: Pool<MySqlConnectionManager>,
}

impl MySqlConnection {
    pub fn connect(config: &MySqlConfig) -> Result<Self> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.as_str()))
            .tcp_port(config.port)
            .db_name(config.database.as_deref())
            .user(config.username.as_deref())
            .pass(config.password.as_deref());

        let manager = MySqlConnectionManager::new(opts);
        let pool = config.options.pool_builder().build(manager)?;

        debug!(host = %config.host, port = config.port, database = ?config.database, "mysql pool ready");
        Ok(Self { pool })
    }
}

impl Connection for MySqlConnection {
    fn grammar(&self) -> Grammar {
        Grammar::MySql
    }

    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        let mut conn = self.pool.get()?;
        let rows: Vec<mysql::Row> = conn.exec(sql, params(bindings))?;
        trace!(rows = rows.len(), "select finished");
        rows.iter().map(to_row).collect()
    }

    fn statement(&self, sql: &str, bindings: &[Value]) -> Result<u64> {
        let mut conn = self.pool.get()?;
        conn.exec_drop(sql, params(bindings))?;
        Ok(conn.affected_rows())
    }
}

// ── Parameters ───────────────────────────────────────────────────────────────

fn params(bindings: &[Value]) -> Params {
    if bindings.is_empty() {
        Params::Empty
    } else {
        Params::Positional(bindings.iter().map(to_mysql).collect())
    }
}

/// Objects and arrays are sent as their JSON text.
fn to_mysql(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Bool(b) => mysql::Value::Int(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                mysql::Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                mysql::Value::UInt(u)
            } else {
                mysql::Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => mysql::Value::Bytes(s.clone().into_bytes()),
        other => mysql::Value::Bytes(other.to_string().into_bytes()),
    }
}

// ── Rows ─────────────────────────────────────────────────────────────────────

fn to_row(row: &mysql::Row) -> Result<Row> {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(i, column)| -> Result<(String, Value)> {
            let name = column.name_str().into_owned();
            let value = match row.as_ref(i) {
                Some(cell) => from_mysql(cell, column.column_type())
                    .map_err(|e| Error::Database(format!("column [{name}]: {e}")))?,
                None => Value::Null,
            };
            Ok((name, value))
        })
        .collect()
}

fn from_mysql(value: &mysql::Value, ty: ColumnType) -> Result<Value, String> {
    Ok(match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Int(i) => Value::from(*i),
        mysql::Value::UInt(u) => Value::from(*u),
        mysql::Value::Float(f) => finite(f64::from(*f))?,
        mysql::Value::Double(f) => finite(*f)?,
        mysql::Value::Bytes(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| "binary data is not valid UTF-8".to_owned())?;
            if ty == ColumnType::MYSQL_TYPE_JSON {
                serde_json::from_str(text).map_err(|e| e.to_string())?
            } else {
                Value::String(text.to_owned())
            }
        }
        &mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = format!("{year:04}-{month:02}-{day:02}");
            if ty == ColumnType::MYSQL_TYPE_DATE {
                Value::String(date)
            } else {
                Value::String(format!("{date} {}", clock(u32::from(hour), minute, second, micros)))
            }
        }
        &mysql::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if negative { "-" } else { "" };
            let hours = days * 24 + u32::from(hours);
            Value::String(format!("{sign}{}", clock(hours, minutes, seconds, micros)))
        }
    })
}

fn clock(hours: u32, minutes: u8, seconds: u8, micros: u32) -> String {
    if micros == 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
    }
}

fn finite(f: f64) -> Result<Value, String> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("{f} has no JSON representation"))
}
