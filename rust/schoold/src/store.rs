//! Data-store collaborator.
//!
//! Assemblies only talk to [`DataStore`]: select with filter predicates,
//! insert, update. There is no embedding of related tables; joins happen in
//! memory through `group.rs`. Rows come back as JSON objects and are parsed
//! into typed structs with [`fetch`] before any assembly logic touches them.

use crate::error::StoreError;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub type Row = Map<String, Value>;

/// Columns holding JSON arrays, serialized as text in SQLite.
const ARRAY_COLUMNS: &[(&str, &str)] = &[("exams", "classes"), ("syllabus", "chapters")];

fn is_array_column(table: &str, column: &str) -> bool {
    ARRAY_COLUMNS
        .iter()
        .any(|(t, c)| *t == table && *c == column)
}

#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, Value),
    /// Case-insensitive LIKE pattern (`%` and `_` wildcards).
    ILike(&'static str, String),
    Gte(&'static str, Value),
    Lte(&'static str, Value),
    In(&'static str, Vec<Value>),
    /// Array column shares at least one value with the set.
    Overlaps(&'static str, Vec<Value>),
    /// Array column contains every value of the set.
    Contains(&'static str, Vec<Value>),
}

impl Filter {
    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(c, _)
            | Filter::ILike(c, _)
            | Filter::Gte(c, _)
            | Filter::Lte(c, _)
            | Filter::In(c, _)
            | Filter::Overlaps(c, _)
            | Filter::Contains(c, _) => c,
        }
    }

    pub fn any_of<S: AsRef<str>>(column: &'static str, values: &[S]) -> Filter {
        Filter::In(
            column,
            values.iter().map(|v| Value::from(v.as_ref())).collect(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Select {
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    pub filters: Vec<Filter>,
    /// Ascending sort keys, applied in order.
    pub order: Vec<&'static str>,
}

impl Select {
    pub fn from(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn columns(mut self, columns: &[&'static str]) -> Self {
        self.columns = columns.to_vec();
        self
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn order_by(mut self, column: &'static str) -> Self {
        self.order.push(column);
        self
    }
}

pub trait DataStore {
    fn select(&self, query: &Select) -> Result<Vec<Row>, StoreError>;
    fn insert(&self, table: &'static str, rows: &[Row]) -> Result<usize, StoreError>;
    fn update(
        &self,
        table: &'static str,
        patch: &Row,
        filters: &[Filter],
    ) -> Result<usize, StoreError>;
}

/// Runs `query` and parses each row into `T`.
pub fn fetch<T: DeserializeOwned>(
    store: &dyn DataStore,
    query: Select,
) -> Result<Vec<T>, StoreError> {
    let table = query.table;
    store
        .select(&query)?
        .into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::RowShape {
                table: table.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

pub fn fetch_one<T: DeserializeOwned>(
    store: &dyn DataStore,
    query: Select,
) -> Result<Option<T>, StoreError> {
    Ok(fetch(store, query)?.into_iter().next())
}

fn check_ident(s: &str) -> Result<&str, StoreError> {
    let valid = !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(s)
    } else {
        Err(StoreError::InvalidIdentifier(s.to_string()))
    }
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(v.to_string()),
    }
}

fn from_sql(table: &str, column: &str, v: SqlValue) -> Result<Value, StoreError> {
    Ok(match v {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) if is_array_column(table, column) => serde_json::from_str(&s)?,
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(_) => Value::Null,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Appends ` WHERE ...` for `filters`, pushing bound values onto `args`.
fn push_where(
    sql: &mut String,
    args: &mut Vec<SqlValue>,
    table: &str,
    filters: &[Filter],
) -> Result<(), StoreError> {
    let mut clauses = Vec::with_capacity(filters.len());
    for f in filters {
        let col = check_ident(f.column())?;
        let clause = match f {
            Filter::Eq(_, Value::Null) => format!("{col} IS NULL"),
            Filter::Eq(_, v) => {
                args.push(to_sql(v));
                format!("{col} = ?")
            }
            Filter::ILike(_, pattern) => {
                args.push(SqlValue::Text(pattern.to_lowercase()));
                format!("LOWER({col}) LIKE ?")
            }
            Filter::Gte(_, v) => {
                args.push(to_sql(v));
                format!("{col} >= ?")
            }
            Filter::Lte(_, v) => {
                args.push(to_sql(v));
                format!("{col} <= ?")
            }
            Filter::In(_, vs) if vs.is_empty() => "0".to_string(),
            Filter::In(_, vs) => {
                args.extend(vs.iter().map(to_sql));
                format!("{col} IN ({})", placeholders(vs.len()))
            }
            Filter::Overlaps(_, vs) | Filter::Contains(_, vs) => {
                if !is_array_column(table, col) {
                    return Err(StoreError::NotAnArrayColumn {
                        table: table.to_string(),
                        column: col.to_string(),
                    });
                }
                if vs.is_empty() {
                    // The empty set overlaps nothing and is contained in everything.
                    let always = matches!(f, Filter::Contains(..));
                    (if always { "1" } else { "0" }).to_string()
                } else if matches!(f, Filter::Overlaps(..)) {
                    args.extend(vs.iter().map(to_sql));
                    format!(
                        "EXISTS (SELECT 1 FROM json_each({col}) WHERE json_each.value IN ({}))",
                        placeholders(vs.len())
                    )
                } else {
                    let mut parts = Vec::with_capacity(vs.len());
                    for v in vs {
                        args.push(to_sql(v));
                        parts.push(format!(
                            "EXISTS (SELECT 1 FROM json_each({col}) WHERE json_each.value = ?)"
                        ));
                    }
                    parts.join(" AND ")
                }
            }
        };
        clauses.push(clause);
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    Ok(())
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl DataStore for SqliteStore<'_> {
    fn select(&self, query: &Select) -> Result<Vec<Row>, StoreError> {
        let table = check_ident(query.table)?;
        let cols = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|c| check_ident(c))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };
        let mut sql = format!("SELECT {cols} FROM {table}");
        let mut args: Vec<SqlValue> = Vec::new();
        push_where(&mut sql, &mut args, table, &query.filters)?;
        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|c| check_ident(c).map(|c| format!("{c} ASC")))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        tracing::trace!(%sql, "select");

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let raw = stmt
            .query_map(params_from_iter(args), |r| {
                (0..names.len())
                    .map(|i| r.get::<_, SqlValue>(i))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(raw.len());
        for values in raw {
            let mut row = Row::new();
            for (name, v) in names.iter().zip(values) {
                row.insert(name.clone(), from_sql(table, name, v)?);
            }
            out.push(row);
        }
        Ok(out)
    }

    fn insert(&self, table: &'static str, rows: &[Row]) -> Result<usize, StoreError> {
        let table = check_ident(table)?;
        let mut n = 0;
        for row in rows {
            let cols = row
                .keys()
                .map(|k| check_ident(k))
                .collect::<Result<Vec<_>, _>>()?;
            let sql = format!(
                "INSERT INTO {table}({}) VALUES({})",
                cols.join(", "),
                placeholders(cols.len())
            );
            n += self
                .conn
                .execute(&sql, params_from_iter(row.values().map(to_sql)))?;
        }
        Ok(n)
    }

    fn update(
        &self,
        table: &'static str,
        patch: &Row,
        filters: &[Filter],
    ) -> Result<usize, StoreError> {
        let table = check_ident(table)?;
        if patch.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<SqlValue> = Vec::new();
        let mut sets = Vec::with_capacity(patch.len());
        for (k, v) in patch {
            sets.push(format!("{} = ?", check_ident(k)?));
            args.push(to_sql(v));
        }
        let mut sql = format!("UPDATE {table} SET {}", sets.join(", "));
        push_where(&mut sql, &mut args, table, filters)?;
        Ok(self.conn.execute(&sql, params_from_iter(args))?)
    }
}

/// Builds a [`Row`] from `key => value` pairs.
#[macro_export]
macro_rules! row {
    ($($k:expr => $v:expr),* $(,)?) => {{
        let mut r = $crate::store::Row::new();
        $( r.insert(String::from($k), serde_json::json!($v)); )*
        r
    }};
}
