//! Parameters and rows exchanged with the worker.
//!
//! Everything that crosses the channel is owned: parameters are
//! [`rusqlite::types::Value`]s and rows carry their column names.

use crate::{DatabaseError, DatabaseResult};
use rusqlite::types::{FromSql, Value, ValueRef};
use std::sync::Arc;

/// Result of a `run`: rows changed and the last inserted rowid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    pub changes: usize,
    pub last_insert_id: i64,
}

/// Conversion into an owned SQL parameter.
pub trait IntoParam {
    fn into_param(self) -> Value;
}

impl IntoParam for Value {
    fn into_param(self) -> Value {
        self
    }
}

impl IntoParam for &str {
    fn into_param(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoParam for String {
    fn into_param(self) -> Value {
        Value::Text(self)
    }
}

impl IntoParam for &String {
    fn into_param(self) -> Value {
        Value::Text(self.clone())
    }
}

impl IntoParam for i64 {
    fn into_param(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoParam for i32 {
    fn into_param(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl IntoParam for u32 {
    fn into_param(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl IntoParam for usize {
    fn into_param(self) -> Value {
        Value::Integer(i64::try_from(self).unwrap_or(i64::MAX))
    }
}

impl IntoParam for bool {
    fn into_param(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl IntoParam for f64 {
    fn into_param(self) -> Value {
        Value::Real(self)
    }
}

impl IntoParam for Vec<u8> {
    fn into_param(self) -> Value {
        Value::Blob(self)
    }
}

impl IntoParam for &[u8] {
    fn into_param(self) -> Value {
        Value::Blob(self.to_vec())
    }
}

impl<T: IntoParam> IntoParam for Option<T> {
    fn into_param(self) -> Value {
        self.map(IntoParam::into_param).unwrap_or(Value::Null)
    }
}

/// Build a `Vec<Value>` of positional parameters.
///
/// ```ignore
/// db.run("INSERT INTO t (a, b) VALUES (?1, ?2)", sql_params![name, 42]).await?;
/// ```
#[macro_export]
macro_rules! sql_params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($param:expr),+ $(,)?) => {
        vec![$($crate::IntoParam::into_param($param)),+]
    };
}

/// One result row, detached from the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of a column.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Typed value of a column by name.
    pub fn get<T: FromSql>(&self, column: &str) -> DatabaseResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| DatabaseError::InvalidData(format!("no column named {column}")))?;
        T::column_result(ValueRef::from(value))
            .map_err(|e| DatabaseError::InvalidData(format!("column {column}: {e}")))
    }

    /// Typed value of a column by position.
    pub fn get_index<T: FromSql>(&self, index: usize) -> DatabaseResult<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| DatabaseError::InvalidData(format!("no column at index {index}")))?;
        T::column_result(ValueRef::from(value))
            .map_err(|e| DatabaseError::InvalidData(format!("column {index}: {e}")))
    }
}

/// Typed view over a [`Row`].
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> DatabaseResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> DatabaseResult<Self> {
        Ok(row.clone())
    }
}

macro_rules! scalar_from_row {
    ($($ty:ty),*) => {
        $(impl FromRow for $ty {
            fn from_row(row: &Row) -> DatabaseResult<Self> {
                row.get_index(0)
            }
        })*
    };
}

scalar_from_row!(i64, i32, bool, f64, String, Vec<u8>);

impl<T: FromSql> FromRow for Option<T> {
    fn from_row(row: &Row) -> DatabaseResult<Self> {
        row.get_index(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(
            Arc::new(vec!["id".into(), "name".into(), "blob".into(), "missing".into()]),
            vec![
                Value::Integer(7),
                Value::Text("alpha".into()),
                Value::Blob(vec![1, 2]),
                Value::Null,
            ],
        )
    }

    #[test]
    fn test_get_by_name_and_index() {
        let row = row();
        assert_eq!(row.get::<i64>("id").unwrap(), 7);
        assert_eq!(row.get::<String>("name").unwrap(), "alpha");
        assert_eq!(row.get::<Vec<u8>>("blob").unwrap(), vec![1, 2]);
        assert_eq!(row.get::<Option<String>>("missing").unwrap(), None);
        assert_eq!(row.get_index::<String>(1).unwrap(), "alpha");
    }

    #[test]
    fn test_get_wrong_type_or_column() {
        let row = row();
        assert!(matches!(row.get::<i64>("name"), Err(DatabaseError::InvalidData(_))));
        assert!(matches!(row.get::<i64>("nope"), Err(DatabaseError::InvalidData(_))));
    }

    #[test]
    fn test_params_macro() {
        let maybe: Option<&str> = None;
        let params = sql_params!["a", 1i64, true, maybe, vec![9u8]];
        assert_eq!(
            params,
            vec![
                Value::Text("a".into()),
                Value::Integer(1),
                Value::Integer(1),
                Value::Null,
                Value::Blob(vec![9]),
            ]
        );
        assert!(sql_params![].is_empty());
    }
}
