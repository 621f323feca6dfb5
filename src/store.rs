//! Typed record store: a thin persistence layer mapping an ordered list of
//! typed field declarations onto one SQLite table.
//!
//! Each field kind owns its storage encoding (boolean as integer, timestamps
//! and JSON as text), so the domain layer above never constructs raw query
//! text or sees storage representations.

use std::marker::PhantomData;

use chrono::NaiveDateTime;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;

use crate::error::{Error, Result};

/// Storage format for timestamps. The fractional part is omitted when zero,
/// and accepted optionally when parsing.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// The closed set of storable field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Timestamp,
    Json,
}

impl FieldKind {
    fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Json => "text",
            FieldKind::Integer | FieldKind::Boolean => "integer",
            FieldKind::Timestamp => "timestamp",
        }
    }
}

/// One column declaration: name, kind and an optional constraint qualifier.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub qualifier: Option<&'static str>,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            qualifier: None,
        }
    }

    pub const fn with_qualifier(
        name: &'static str,
        kind: FieldKind,
        qualifier: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            qualifier: Some(qualifier),
        }
    }

    fn create_desc(&self) -> String {
        match self.qualifier {
            Some(qualifier) => format!("{} {} {}", self.name, self.kind.sql_type(), qualifier),
            None => format!("{} {}", self.name, self.kind.sql_type()),
        }
    }
}

/// An in-memory cell value, before encoding / after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    fn encode(&self) -> Result<SqlValue> {
        Ok(match self {
            Value::Null => SqlValue::Null,
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Boolean(b) => SqlValue::Integer(*b as i64),
            Value::Timestamp(ts) => SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
            Value::Json(v) => SqlValue::Text(serde_json::to_string(v)?),
        })
    }

    fn decode(kind: FieldKind, raw: SqlValue) -> Result<Value> {
        Ok(match (kind, raw) {
            (_, SqlValue::Null) => Value::Null,
            (FieldKind::Text, SqlValue::Text(s)) => Value::Text(s),
            (FieldKind::Integer, SqlValue::Integer(i)) => Value::Integer(i),
            (FieldKind::Boolean, SqlValue::Integer(i)) => Value::Boolean(i != 0),
            (FieldKind::Timestamp, SqlValue::Text(s)) => Value::Timestamp(
                NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
                    .map_err(|e| Error::schema(format!("bad stored timestamp {s:?}: {e}")))?,
            ),
            (FieldKind::Json, SqlValue::Text(s)) => Value::Json(serde_json::from_str(&s)?),
            (kind, other) => {
                return Err(Error::schema(format!(
                    "stored value {other:?} does not decode as {kind:?}"
                )))
            }
        })
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(Error::schema(format!("expected text, got {other:?}"))),
        }
    }

    pub fn into_opt_text(self) -> Result<Option<String>> {
        match self {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            other => Err(Error::schema(format!("expected text or null, got {other:?}"))),
        }
    }

    pub fn into_boolean(self) -> Result<bool> {
        match self {
            Value::Boolean(b) => Ok(b),
            other => Err(Error::schema(format!("expected boolean, got {other:?}"))),
        }
    }

    pub fn into_timestamp(self) -> Result<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Ok(ts),
            other => Err(Error::schema(format!("expected timestamp, got {other:?}"))),
        }
    }

    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            Value::Json(v) => Ok(v),
            other => Err(Error::schema(format!("expected json, got {other:?}"))),
        }
    }
}

/// Sort direction for `order_by` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// Field name / value pairs, used both for inserted values and for
/// equality-conjunction `where` filters.
pub type Pairs = [(&'static str, Value)];

/// Implemented once per table: the schema, and the decoding of one full row
/// into the table's fixed record type.
pub trait TableRecord: Sized {
    const TABLE: &'static str;

    fn fields() -> &'static [Field];

    /// Build a record from one decoded row. `values` holds exactly one
    /// `Value` per schema field, in declaration order.
    fn from_row(values: Vec<Value>) -> Result<Self>;
}

/// Handle to one declared table. Construction creates the backing table when
/// it does not exist yet; an existing table is left untouched (schema
/// migration is out of scope).
pub struct Table<R: TableRecord> {
    _record: PhantomData<R>,
}

impl<R: TableRecord> Table<R> {
    pub fn create(conn: &Connection) -> Result<Self> {
        let columns = R::fields()
            .iter()
            .map(Field::create_desc)
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {} ({})", R::TABLE, columns),
            [],
        )?;
        Ok(Self {
            _record: PhantomData,
        })
    }

    fn field(&self, name: &str) -> Result<&'static Field> {
        R::fields()
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| Error::schema(format!("unknown field {name:?} in table {}", R::TABLE)))
    }

    fn encoded(&self, pairs: &Pairs) -> Result<Vec<SqlValue>> {
        pairs
            .iter()
            .map(|(name, value)| {
                self.field(name)?;
                value.encode()
            })
            .collect()
    }

    fn where_clause(&self, where_: &Pairs) -> String {
        if where_.is_empty() {
            return String::new();
        }
        let conditions = where_
            .iter()
            .map(|(name, _)| format!("{name} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(" WHERE {conditions}")
    }

    fn order_clause(&self, order_by: &[(&'static str, Direction)]) -> Result<String> {
        if order_by.is_empty() {
            return Ok(String::new());
        }
        let terms = order_by
            .iter()
            .map(|(name, direction)| {
                self.field(name)?;
                Ok(format!("{name} {}", direction.sql()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(" ORDER BY {}", terms.join(", ")))
    }

    pub fn insert(&self, conn: &Connection, values: &Pairs) -> Result<()> {
        let params = self.encoded(values)?;
        let columns = values
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        let marks = vec!["?"; values.len()].join(", ");
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                R::TABLE,
                columns,
                marks
            ),
            rusqlite::params_from_iter(params),
        )?;
        Ok(())
    }

    /// Update every row matching the equality conjunction `where_`. An empty
    /// `where_` updates every row in the table.
    pub fn update(&self, conn: &Connection, values: &Pairs, where_: &Pairs) -> Result<usize> {
        let mut params = self.encoded(values)?;
        params.extend(self.encoded(where_)?);
        let sets = values
            .iter()
            .map(|(name, _)| format!("{name} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {}{}",
            R::TABLE,
            sets,
            self.where_clause(where_)
        );
        let changed = conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(changed)
    }

    /// Full-record mode: select every column, decode each through its field
    /// kind and assemble the table's record type.
    pub fn get(
        &self,
        conn: &Connection,
        where_: &Pairs,
        order_by: &[(&'static str, Direction)],
    ) -> Result<Vec<R>> {
        let columns = R::fields()
            .iter()
            .map(|field| field.name)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            columns,
            R::TABLE,
            self.where_clause(where_),
            self.order_clause(order_by)?
        );
        let params = self.encoded(where_)?;

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(R::fields().len());
            for (idx, field) in R::fields().iter().enumerate() {
                let raw: SqlValue = row.get(idx)?;
                values.push(Value::decode(field.kind, raw)?);
            }
            records.push(R::from_row(values)?);
        }
        Ok(records)
    }

    /// Column-subset mode: returns raw storage values without decoding.
    pub fn get_columns(
        &self,
        conn: &Connection,
        columns: &[&'static str],
        where_: &Pairs,
        order_by: &[(&'static str, Direction)],
    ) -> Result<Vec<Vec<SqlValue>>> {
        for name in columns {
            self.field(name)?;
        }
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            columns.join(", "),
            R::TABLE,
            self.where_clause(where_),
            self.order_clause(order_by)?
        );
        let params = self.encoded(where_)?;

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut raw = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                raw.push(row.get::<_, SqlValue>(idx)?);
            }
            out.push(raw);
        }
        Ok(out)
    }

    pub fn count(&self, conn: &Connection, where_: &Pairs) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            R::TABLE,
            self.where_clause(where_)
        );
        let params = self.encoded(where_)?;
        let count = conn.query_row(&sql, rusqlite::params_from_iter(params), |row| row.get(0))?;
        Ok(count)
    }
}
