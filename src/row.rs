//! The row model: the universal unit of flow.
//!
//! A [`Row`] is an unordered mapping from column name to a dynamically
//! typed [`Value`]. Rows have value semantics: operations that need to
//! diverge from their input copy the row rather than mutate shared state.
//! Both types serialize untagged, so a stream of rows round-trips through
//! newline-delimited JSON without any schema declaration.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// A dynamically typed column value.
///
/// Values of the same kind compare naturally; integers and floats compare
/// numerically against each other, so `1 == 1.0` as in the dynamic-language
/// systems this engine interoperates with. Distinct kinds otherwise compare
/// by a fixed rank, which makes the ordering total and lets key tuples of
/// mixed columns sort deterministically. Floats use `total_cmp`, so even
/// NaN has a place in the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The absence of a value; serializes as JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// A string.
    Str(String),
    /// A list of values, e.g. a `[longitude, latitude]` coordinate pair.
    List(Vec<Value>),
}

impl Value {
    /// A short name for the kind of this value, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::List(_) => 4,
        }
    }

    /// The numeric reading of this value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The string reading of this value, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Str(a), Str(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::List(value.into_iter().map(Value::Float).collect())
    }
}

/// The projection of a row onto an ordered sequence of columns.
///
/// Key tuples compare lexicographically; they are what Sort orders by and
/// what Reduce and Join group by.
pub type KeyTuple = SmallVec<[Value; 4]>;

/// One record of a stream: column name to [`Value`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of columns in this row.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the row has the named column.
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// The value of the named column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// The value of the named column, or [`Error::MissingColumn`].
    pub fn require(&self, column: &str) -> Result<&Value> {
        self.0
            .get(column)
            .ok_or_else(|| Error::MissingColumn(column.to_owned()))
    }

    /// The named column as a string, or a missing-column / type error.
    pub fn require_str(&self, column: &str) -> Result<&str> {
        let value = self.require(column)?;
        value.as_str().ok_or_else(|| Error::Type {
            column: column.to_owned(),
            expected: "string",
            found: value.kind(),
        })
    }

    /// The named column as a float, or a missing-column / type error.
    pub fn require_f64(&self, column: &str) -> Result<f64> {
        let value = self.require(column)?;
        value.as_f64().ok_or_else(|| Error::Type {
            column: column.to_owned(),
            expected: "number",
            found: value.kind(),
        })
    }

    /// Sets a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Removes a column, returning its value if it was present.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Iterates the columns of this row in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Projects this row onto the given columns as a [`KeyTuple`].
    ///
    /// Projecting a column the row does not have is a caller error and
    /// surfaces as [`Error::MissingColumn`].
    pub fn key(&self, columns: &[String]) -> Result<KeyTuple> {
        columns
            .iter()
            .map(|column| self.require(column).map(Value::clone))
            .collect()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

/// Builds a [`Row`] from `column => value` pairs.
///
/// ```
/// use tablestream::{row, Value};
///
/// let row = row! { "doc_id" => 1, "text" => "hello" };
/// assert_eq!(row.get("doc_id"), Some(&Value::Int(1)));
/// ```
#[macro_export]
macro_rules! row {
    ($($column:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut row = $crate::Row::new();
        $(row.set($column, $value);)*
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_order_is_total() {
        let values = [
            Value::Null,
            Value::Bool(false),
            Value::Int(-3),
            Value::Float(2.5),
            Value::Str("a".to_owned()),
            Value::List(vec![Value::Int(1)]),
        ];
        for (i, a) in values.iter().enumerate() {
            for (j, b) in values.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j));
            }
        }
    }

    #[test]
    fn numbers_compare_across_kinds() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert!(Value::Int(1) < Value::Float(1.5));
        assert!(Value::Float(2.0) > Value::Int(1));
    }

    #[test]
    fn key_projects_in_column_order() {
        let row = row! { "a" => 1, "b" => "x" };
        let key = row.key(&["b".to_owned(), "a".to_owned()]).unwrap();
        assert_eq!(key.as_slice(), &[Value::from("x"), Value::Int(1)]);
        assert!(matches!(
            row.key(&["missing".to_owned()]),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn rows_round_trip_through_json() {
        let row = row! { "id" => 7, "point" => vec![37.5, 55.7], "text" => "hi" };
        let line = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&line).unwrap();
        assert_eq!(row, back);
    }
}
