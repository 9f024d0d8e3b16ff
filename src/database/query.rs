//! Fluent query builder.
//!
//! ```rust,ignore
//! let users = db.table("users")?
//!     .select(&["id", "name"])
//!     .where_eq("active", true)
//!     .where_in("role", ["admin", "editor"])
//!     .order_by("name", Direction::Asc)
//!     .limit(10)
//!     .get()?;
//! ```
//!
//! Values never appear in the SQL text. Every value becomes a placeholder
//! from the connection's [`Grammar`] plus a positional binding.
//!
//! In silent mode a failure reported by the connection is logged at `warn`
//! and replaced with an empty result (`[]`, `None`, `0` or `false`).
//! Malformed queries are still errors.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Connection, Grammar, Row};
use crate::error::{Error, Result};

const OPERATORS: &[&str] = &["=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "ilike"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc  => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Boolean {
    And,
    Or,
}

#[derive(Clone, Debug)]
enum Condition {
    Basic { column: String, operator: String, value: Value },
    Null { column: String, negate: bool },
    In { column: String, values: Vec<Value>, negate: bool },
}

#[derive(Clone, Debug)]
struct Where {
    boolean: Boolean,
    condition: Condition,
}

#[derive(Clone)]
pub struct Builder {
    connection: Arc<dyn Connection>,
    table: Option<String>,
    columns: Vec<String>,
    distinct: bool,
    wheres: Vec<Where>,
    orders: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
    silent: bool,
}

impl Builder {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            table: None,
            columns: Vec::new(),
            distinct: false,
            wheres: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            silent: false,
        }
    }

    pub fn grammar(&self) -> Grammar {
        self.connection.grammar()
    }

    // ── Clauses ──────────────────────────────────────────────────────────────

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_owned());
        self
    }

    /// Replaces the selected columns. No columns selects `*`.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// `column = value`. A `null` value compiles to `IS NULL`.
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_op(column, "=", value)
    }

    pub fn where_op(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_basic(Boolean::And, column, operator, value.into())
    }

    pub fn or_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_basic(Boolean::Or, column, operator, value.into())
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push(Boolean::And, Condition::Null { column: column.to_owned(), negate: false })
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push(Boolean::And, Condition::Null { column: column.to_owned(), negate: true })
    }

    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push(Boolean::And, Condition::In { column: column.to_owned(), values, negate: false })
    }

    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push(Boolean::And, Condition::In { column: column.to_owned(), values, negate: true })
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.orders.push((column.to_owned(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    fn push_basic(self, boolean: Boolean, column: &str, operator: &str, value: Value) -> Self {
        let operator = operator.trim().to_ascii_lowercase();
        let condition = match (&value, operator.as_str()) {
            (Value::Null, "=")         => Condition::Null { column: column.to_owned(), negate: false },
            (Value::Null, "!=" | "<>") => Condition::Null { column: column.to_owned(), negate: true },
            _ => Condition::Basic { column: column.to_owned(), operator, value },
        };
        self.push(boolean, condition)
    }

    fn push(mut self, boolean: Boolean, condition: Condition) -> Self {
        self.wheres.push(Where { boolean, condition });
        self
    }

    // ── Compilation ──────────────────────────────────────────────────────────

    /// The `SELECT` statement and its bindings.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut sql = Sql::new(self.grammar());
        sql.push("SELECT ");
        if self.distinct {
            sql.push("DISTINCT ");
        }
        sql.push(&self.compile_columns());
        sql.push(" FROM ");
        sql.push(&self.wrapped_table()?);
        self.compile_wheres(&mut sql)?;

        if !self.orders.is_empty() {
            let orders: Vec<_> = self
                .orders
                .iter()
                .map(|(column, dir)| format!("{} {}", sql.grammar.wrap(column), dir.as_sql()))
                .collect();
            sql.push(" ORDER BY ");
            sql.push(&orders.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push(&format!(" OFFSET {offset}"));
        }
        Ok(sql.finish())
    }

    fn compile_columns(&self) -> String {
        if self.columns.is_empty() {
            return "*".to_owned();
        }
        let grammar = self.grammar();
        self.columns.iter().map(|c| grammar.wrap(c)).collect::<Vec<_>>().join(", ")
    }

    fn wrapped_table(&self) -> Result<String> {
        match self.table.as_deref() {
            Some(table) if !table.trim().is_empty() => Ok(self.grammar().wrap(table)),
            _ => Err(Error::InvalidArgument("No table specified for the query".into())),
        }
    }

    fn compile_wheres(&self, sql: &mut Sql) -> Result<()> {
        for (i, clause) in self.wheres.iter().enumerate() {
            sql.push(match (i, clause.boolean) {
                (0, _)            => " WHERE ",
                (_, Boolean::And) => " AND ",
                (_, Boolean::Or)  => " OR ",
            });

            match &clause.condition {
                Condition::Basic { column, operator, value } => {
                    if !OPERATORS.contains(&operator.as_str()) {
                        return Err(Error::InvalidArgument(format!("Illegal operator [{operator}]")));
                    }
                    let column = sql.grammar.wrap(column);
                    let placeholder = sql.bind(value.clone());
                    sql.push(&format!("{column} {} {placeholder}", operator.to_ascii_uppercase()));
                }
                Condition::Null { column, negate } => {
                    let column = sql.grammar.wrap(column);
                    let check = if *negate { "IS NOT NULL" } else { "IS NULL" };
                    sql.push(&format!("{column} {check}"));
                }
                Condition::In { values, negate, .. } if values.is_empty() => {
                    // Nothing is in the empty set.
                    sql.push(if *negate { "1 = 1" } else { "0 = 1" });
                }
                Condition::In { column, values, negate } => {
                    let column = sql.grammar.wrap(column);
                    let placeholders: Vec<_> = values.iter().map(|v| sql.bind(v.clone())).collect();
                    let keyword = if *negate { "NOT IN" } else { "IN" };
                    sql.push(&format!("{column} {keyword} ({})", placeholders.join(", ")));
                }
            }
        }
        Ok(())
    }

    fn compile_insert(&self, rows: &[Row]) -> Result<(String, Vec<Value>)> {
        let table = self.wrapped_table()?;

        // Column superset, in the order columns are first seen.
        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }

        let mut sql = Sql::new(self.grammar());
        let wrapped: Vec<_> = columns.iter().map(|c| sql.grammar.wrap(c)).collect();
        sql.push(&format!("INSERT INTO {table} ({}) VALUES ", wrapped.join(", ")));

        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            let placeholders: Vec<_> = columns
                .iter()
                .map(|c| sql.bind(row.get(*c).cloned().unwrap_or(Value::Null)))
                .collect();
            sql.push(&format!("({})", placeholders.join(", ")));
        }
        Ok(sql.finish())
    }

    fn compile_update(&self, values: &Row) -> Result<(String, Vec<Value>)> {
        let table = self.wrapped_table()?;
        if values.is_empty() {
            return Err(Error::InvalidArgument("No data provided for update".into()));
        }

        let mut sql = Sql::new(self.grammar());
        let sets: Vec<_> = values
            .iter()
            .map(|(column, value)| {
                let column = sql.grammar.wrap(column);
                format!("{column} = {}", sql.bind(value.clone()))
            })
            .collect();
        sql.push(&format!("UPDATE {table} SET {}", sets.join(", ")));
        self.compile_wheres(&mut sql)?;
        Ok(sql.finish())
    }

    fn compile_delete(&self) -> Result<(String, Vec<Value>)> {
        let mut sql = Sql::new(self.grammar());
        sql.push("DELETE FROM ");
        sql.push(&self.wrapped_table()?);
        self.compile_wheres(&mut sql)?;
        Ok(sql.finish())
    }

    // ── Execution ────────────────────────────────────────────────────────────

    pub fn get(&self) -> Result<Vec<Row>> {
        let (sql, bindings) = self.to_sql()?;
        self.run(&sql, Vec::new, || self.connection.select(&sql, &bindings))
    }

    pub fn first(&self) -> Result<Option<Row>> {
        let rows = self.clone().limit(1).get()?;
        Ok(rows.into_iter().next())
    }

    pub fn count(&self) -> Result<u64> {
        let grammar = self.grammar();
        let mut sql = Sql::new(grammar);
        sql.push(&format!("SELECT COUNT(*) AS {} FROM ", grammar.wrap("aggregate")));
        sql.push(&self.wrapped_table()?);
        self.compile_wheres(&mut sql)?;
        let (sql, bindings) = sql.finish();

        self.run(&sql, || 0, || {
            let rows = self.connection.select(&sql, &bindings)?;
            Ok(rows.first().and_then(|row| row.get("aggregate")).map_or(0, aggregate))
        })
    }

    /// Inserts one object or an array of objects.
    ///
    /// Rows may have different keys. Every row gets the union of all columns
    /// and missing values are inserted as `NULL`.
    pub fn insert(&self, data: impl Into<Value>) -> Result<bool> {
        let rows = rows_from(data.into())?;
        let (sql, bindings) = self.compile_insert(&rows)?;
        self.run(&sql, || false, || self.connection.statement(&sql, &bindings).map(|_| true))
    }

    /// Updates the matching rows and returns how many changed.
    pub fn update(&self, values: impl Into<Value>) -> Result<u64> {
        let Value::Object(values) = values.into() else {
            return Err(Error::InvalidArgument("Update values must be an object".into()));
        };
        let (sql, bindings) = self.compile_update(&values)?;
        self.run(&sql, || 0, || self.connection.statement(&sql, &bindings))
    }

    /// Deletes the matching rows and returns how many were removed.
    pub fn delete(&self) -> Result<u64> {
        let (sql, bindings) = self.compile_delete()?;
        self.run(&sql, || 0, || self.connection.statement(&sql, &bindings))
    }

    fn run<T>(
        &self,
        sql: &str,
        fallback: impl FnOnce() -> T,
        execute: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        debug!(sql, "executing query");
        match execute() {
            Ok(value) => Ok(value),
            Err(err) if self.silent => {
                warn!(sql, error = %err, "query failed in silent mode");
                Ok(fallback())
            }
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("grammar", &self.grammar())
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("wheres", &self.wheres.len())
            .field("silent", &self.silent)
            .finish_non_exhaustive()
    }
}

/// SQL text under construction plus the bindings its placeholders refer to.
struct Sql {
    grammar: Grammar,
    text: String,
    bindings: Vec<Value>,
}

impl Sql {
    fn new(grammar: Grammar) -> Self {
        Self { grammar, text: String::new(), bindings: Vec::new() }
    }

    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    /// Records a binding and returns its placeholder.
    fn bind(&mut self, value: Value) -> String {
        self.bindings.push(value);
        self.grammar.placeholder(self.bindings.len())
    }

    fn finish(self) -> (String, Vec<Value>) {
        (self.text, self.bindings)
    }
}

fn rows_from(data: Value) -> Result<Vec<Row>> {
    let rows = match data {
        Value::Object(row) => vec![row],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(Error::InvalidArgument(format!("Insert rows must be objects, got {other}"))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => return Err(Error::InvalidArgument(format!("Cannot insert {other}"))),
    };

    if rows.iter().all(|row| row.is_empty()) {
        return Err(Error::InvalidArgument("No data provided for insert".into()));
    }
    Ok(rows)
}

fn aggregate(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_i64().map(|i| i.max(0) as u64)).unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
