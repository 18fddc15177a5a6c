//! Per-row transformation, and the library of stock mappers.
//!
//! A [`Mapper`] consumes one row and produces zero or more rows; [`Map`]
//! concatenates the produced rows in input order. Map introduces no
//! ordering, grouping, or materialization, so it is safe anywhere in a
//! pipeline and costs O(1) memory per input row.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

use crate::error::{Error, Result};
use crate::graph::Sources;
use crate::operators::{one_input, Operation, RowStream};
use crate::row::{Row, Value};

/// A per-row transform: one row in, zero or more rows out.
pub trait Mapper {
    /// Transforms one row.
    fn map(&self, row: Row) -> Result<Vec<Row>>;
}

/// Applies a [`Mapper`] to every row of the input stream.
pub struct Map {
    mapper: Box<dyn Mapper>,
}

impl Map {
    /// A map operation around the given mapper.
    pub fn new(mapper: impl Mapper + 'static) -> Self {
        Map {
            mapper: Box::new(mapper),
        }
    }
}

impl Operation for Map {
    fn apply<'a>(
        &'a self,
        inputs: Vec<RowStream<'a>>,
        _sources: &'a Sources,
    ) -> Result<RowStream<'a>> {
        Ok(Box::new(MapRows {
            mapper: &*self.mapper,
            input: one_input(inputs, "map"),
            produced: Vec::new().into_iter(),
            done: false,
        }))
    }
}

struct MapRows<'a> {
    mapper: &'a dyn Mapper,
    input: RowStream<'a>,
    produced: std::vec::IntoIter<Row>,
    done: bool,
}

impl Iterator for MapRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(row) = self.produced.next() {
                return Some(Ok(row));
            }
            match self.input.next()? {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(row) => match self.mapper.map(row) {
                    Ok(rows) => self.produced = rows.into_iter(),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
            }
        }
    }
}

/// Yields every row unchanged.
pub struct Identity;

impl Mapper for Identity {
    fn map(&self, row: Row) -> Result<Vec<Row>> {
        Ok(vec![row])
    }
}

/// Strips ASCII punctuation from a string column.
pub struct FilterPunctuation {
    column: String,
}

impl FilterPunctuation {
    /// Strips punctuation from `column`.
    pub fn new(column: impl Into<String>) -> Self {
        FilterPunctuation {
            column: column.into(),
        }
    }
}

impl Mapper for FilterPunctuation {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let text = row.require_str(&self.column)?;
        let cleaned: String = text.chars().filter(|c| !c.is_ascii_punctuation()).collect();
        row.set(&*self.column, cleaned);
        Ok(vec![row])
    }
}

/// Lowercases a string column.
pub struct LowerCase {
    column: String,
}

impl LowerCase {
    /// Lowercases `column`.
    pub fn new(column: impl Into<String>) -> Self {
        LowerCase {
            column: column.into(),
        }
    }
}

impl Mapper for LowerCase {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let lowered = row.require_str(&self.column)?.to_lowercase();
        row.set(&*self.column, lowered);
        Ok(vec![row])
    }
}

/// Splits a string column into several rows, one per token.
///
/// Tokens are trimmed and empty tokens are discarded, so adjacent
/// separators and leading or trailing whitespace never produce empty-text
/// rows.
pub struct Split {
    column: String,
    separator: Option<char>,
}

impl Split {
    /// Splits `column` on runs of whitespace.
    pub fn whitespace(column: impl Into<String>) -> Self {
        Split {
            column: column.into(),
            separator: None,
        }
    }

    /// Splits `column` on an explicit separator character.
    pub fn on(column: impl Into<String>, separator: char) -> Self {
        Split {
            column: column.into(),
            separator: Some(separator),
        }
    }
}

impl Mapper for Split {
    fn map(&self, row: Row) -> Result<Vec<Row>> {
        let text = row.require_str(&self.column)?.to_owned();
        let tokens: Vec<&str> = match self.separator {
            None => text.split_whitespace().collect(),
            Some(sep) => text
                .split(sep)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .collect(),
        };
        Ok(tokens
            .into_iter()
            .map(|token| {
                let mut split = row.clone();
                split.set(&*self.column, token);
                split
            })
            .collect())
    }
}

/// Multiplies several numeric columns into a result column.
pub struct Product {
    columns: Vec<String>,
    result_column: String,
}

impl Product {
    /// Multiplies `columns` into `result_column`.
    pub fn new(columns: &[&str], result_column: impl Into<String>) -> Self {
        Product {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            result_column: result_column.into(),
        }
    }
}

impl Mapper for Product {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let mut product = Value::Int(1);
        for column in &self.columns {
            product = numeric_mul(&product, row.require(column)?, column)?;
        }
        row.set(&*self.result_column, product);
        Ok(vec![row])
    }
}

/// Divides one numeric column by another into a result column.
pub struct Divide {
    numerator: String,
    denominator: String,
    result_column: String,
}

impl Divide {
    /// Computes `numerator / denominator` into `result_column`.
    pub fn new(
        numerator: impl Into<String>,
        denominator: impl Into<String>,
        result_column: impl Into<String>,
    ) -> Self {
        Divide {
            numerator: numerator.into(),
            denominator: denominator.into(),
            result_column: result_column.into(),
        }
    }
}

impl Mapper for Divide {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let numerator = row.require_f64(&self.numerator)?;
        let denominator = row.require_f64(&self.denominator)?;
        if denominator == 0.0 {
            return Err(Error::Arithmetic(format!(
                "division by zero in column `{}`",
                self.denominator
            )));
        }
        row.set(&*self.result_column, numerator / denominator);
        Ok(vec![row])
    }
}

/// Keeps only rows satisfying a predicate.
pub struct Filter {
    condition: Box<dyn Fn(&Row) -> bool>,
}

impl Filter {
    /// Keeps rows for which `condition` returns true.
    pub fn new(condition: impl Fn(&Row) -> bool + 'static) -> Self {
        Filter {
            condition: Box::new(condition),
        }
    }
}

impl Mapper for Filter {
    fn map(&self, row: Row) -> Result<Vec<Row>> {
        if (self.condition)(&row) {
            Ok(vec![row])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Keeps only the named columns of each row.
pub struct Project {
    columns: Vec<String>,
}

impl Project {
    /// Keeps exactly `columns`; every named column must be present.
    pub fn new(columns: &[&str]) -> Self {
        Project {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
        }
    }
}

impl Mapper for Project {
    fn map(&self, row: Row) -> Result<Vec<Row>> {
        let projected = self
            .columns
            .iter()
            .map(|column| Ok((column.clone(), row.require(column)?.clone())))
            .collect::<Result<Row>>()?;
        Ok(vec![projected])
    }
}

/// Computes `ln(numerator) - ln(denominator)` into a result column.
pub struct LogTransform {
    numerator: String,
    denominator: String,
    result_column: String,
}

impl LogTransform {
    /// Computes the log-ratio of two numeric columns.
    pub fn new(
        numerator: impl Into<String>,
        denominator: impl Into<String>,
        result_column: impl Into<String>,
    ) -> Self {
        LogTransform {
            numerator: numerator.into(),
            denominator: denominator.into(),
            result_column: result_column.into(),
        }
    }

    fn ln(&self, row: &Row, column: &str) -> Result<f64> {
        let value = row.require_f64(column)?;
        if value <= 0.0 {
            return Err(Error::Arithmetic(format!(
                "logarithm of non-positive value {value} in column `{column}`"
            )));
        }
        Ok(value.ln())
    }
}

impl Mapper for LogTransform {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let ratio = self.ln(&row, &self.numerator)? - self.ln(&row, &self.denominator)?;
        row.set(&*self.result_column, ratio);
        Ok(vec![row])
    }
}

/// Keeps rows whose string column has more than `n` characters.
pub struct LongerThanN {
    column: String,
    n: usize,
}

impl LongerThanN {
    /// Keeps rows where `column` is longer than `n` characters.
    pub fn new(column: impl Into<String>, n: usize) -> Self {
        LongerThanN {
            column: column.into(),
            n,
        }
    }
}

impl Mapper for LongerThanN {
    fn map(&self, row: Row) -> Result<Vec<Row>> {
        if row.require_str(&self.column)?.chars().count() > self.n {
            Ok(vec![row])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Keeps rows whose numeric column is at least `n`.
pub struct AtLeastNTimes {
    column: String,
    n: i64,
}

impl AtLeastNTimes {
    /// Keeps rows where `column` is at least `n`.
    pub fn new(column: impl Into<String>, n: i64) -> Self {
        AtLeastNTimes {
            column: column.into(),
            n,
        }
    }
}

impl Mapper for AtLeastNTimes {
    fn map(&self, row: Row) -> Result<Vec<Row>> {
        if *row.require(&self.column)? >= Value::Int(self.n) {
            Ok(vec![row])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Great-circle distance in kilometers between two coordinate columns.
///
/// Coordinates are `[longitude, latitude]` pairs in degrees; the earth
/// radius is fixed at 6373 km.
pub struct Haversine {
    result_column: String,
    first_point: String,
    second_point: String,
}

impl Haversine {
    const EARTH_RADIUS_KM: f64 = 6373.0;

    /// Computes the distance between `first_point` and `second_point`.
    pub fn new(
        result_column: impl Into<String>,
        first_point: impl Into<String>,
        second_point: impl Into<String>,
    ) -> Self {
        Haversine {
            result_column: result_column.into(),
            first_point: first_point.into(),
            second_point: second_point.into(),
        }
    }

    fn coordinate(row: &Row, column: &str) -> Result<(f64, f64)> {
        let value = row.require(column)?;
        if let Value::List(values) = value {
            if let [lon, lat] = values.as_slice() {
                if let (Some(lon), Some(lat)) = (lon.as_f64(), lat.as_f64()) {
                    return Ok((lon.to_radians(), lat.to_radians()));
                }
            }
        }
        Err(Error::Type {
            column: column.to_owned(),
            expected: "[longitude, latitude] pair",
            found: value.kind(),
        })
    }
}

impl Mapper for Haversine {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let (lon1, lat1) = Self::coordinate(&row, &self.first_point)?;
        let (lon2, lat2) = Self::coordinate(&row, &self.second_point)?;

        let arg = ((lat2 - lat1) / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
        let distance = 2.0 * arg.sqrt().asin() * Self::EARTH_RADIUS_KM;

        row.set(&*self.result_column, distance);
        Ok(vec![row])
    }
}

/// Splits a timestamp column into weekday-abbreviation and hour columns.
pub struct HourWeekday {
    column: String,
    weekday_column: String,
    hour_column: String,
}

impl HourWeekday {
    /// Derives `weekday_column` (`Mon`..`Sun`) and `hour_column` from
    /// the timestamp in `column`.
    pub fn new(
        column: impl Into<String>,
        weekday_column: impl Into<String>,
        hour_column: impl Into<String>,
    ) -> Self {
        HourWeekday {
            column: column.into(),
            weekday_column: weekday_column.into(),
            hour_column: hour_column.into(),
        }
    }
}

impl Mapper for HourWeekday {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let timestamp = parse_timestamp(&row, &self.column)?;
        let weekday = match timestamp.weekday() {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        };
        row.set(&*self.weekday_column, weekday);
        row.set(&*self.hour_column, i64::from(timestamp.hour()));
        Ok(vec![row])
    }
}

/// Difference between two timestamp columns, in hours.
pub struct TimeDiff {
    result_column: String,
    start_column: String,
    end_column: String,
}

impl TimeDiff {
    /// Computes `end_column - start_column` in hours into `result_column`.
    pub fn new(
        result_column: impl Into<String>,
        start_column: impl Into<String>,
        end_column: impl Into<String>,
    ) -> Self {
        TimeDiff {
            result_column: result_column.into(),
            start_column: start_column.into(),
            end_column: end_column.into(),
        }
    }
}

impl Mapper for TimeDiff {
    fn map(&self, mut row: Row) -> Result<Vec<Row>> {
        let start = parse_timestamp(&row, &self.start_column)?;
        let end = parse_timestamp(&row, &self.end_column)?;
        let elapsed = end - start;
        let seconds = elapsed.num_seconds() as f64 + f64::from(elapsed.subsec_nanos()) / 1e9;
        row.set(&*self.result_column, seconds / 3600.0);
        Ok(vec![row])
    }
}

/// Timestamps arrive as compact ISO-8601 strings such as
/// `20171020T112238.723000`, with an optional fractional part.
fn parse_timestamp(row: &Row, column: &str) -> Result<NaiveDateTime> {
    let text = row.require_str(column)?;
    NaiveDateTime::parse_from_str(text, "%Y%m%dT%H%M%S%.f")
        .map_err(|e| Error::other(format!("invalid timestamp in column `{column}`: {e}")))
}

pub(crate) fn numeric_add(a: &Value, b: &Value, column: &str) -> Result<Value> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or_else(|| {
            Error::Arithmetic(format!("integer overflow while summing column `{column}`"))
        }),
        _ => numeric_pair(a, b, column).map(|(a, b)| Value::Float(a + b)),
    }
}

pub(crate) fn numeric_mul(a: &Value, b: &Value, column: &str) -> Result<Value> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or_else(|| {
            Error::Arithmetic(format!("integer overflow while multiplying column `{column}`"))
        }),
        _ => numeric_pair(a, b, column).map(|(a, b)| Value::Float(a * b)),
    }
}

fn numeric_pair(a: &Value, b: &Value, column: &str) -> Result<(f64, f64)> {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::Type {
            column: column.to_owned(),
            expected: "number",
            found: if a.as_f64().is_none() { a.kind() } else { b.kind() },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn split_discards_empty_tokens() {
        let mapper = Split::whitespace("text");
        let rows = mapper.map(row! { "text" => "  a  b " }).unwrap();
        assert_eq!(
            rows,
            vec![row! { "text" => "a" }, row! { "text" => "b" }]
        );
        assert!(mapper.map(row! { "text" => "   " }).unwrap().is_empty());

        let mapper = Split::on("text", ';');
        let rows = mapper.map(row! { "text" => "a;; b ;" }).unwrap();
        assert_eq!(
            rows,
            vec![row! { "text" => "a" }, row! { "text" => "b" }]
        );
    }

    #[test]
    fn divide_rejects_zero_denominator() {
        let mapper = Divide::new("a", "b", "ratio");
        let err = mapper.map(row! { "a" => 1, "b" => 0 }).unwrap_err();
        assert!(matches!(err, Error::Arithmetic(_)));
    }

    #[test]
    fn hour_weekday_handles_missing_fraction() {
        let mapper = HourWeekday::new("ts", "weekday", "hour");
        let rows = mapper.map(row! { "ts" => "20221120T000000" }).unwrap();
        assert_eq!(rows[0].get("weekday"), Some(&Value::from("Sun")));
        assert_eq!(rows[0].get("hour"), Some(&Value::Int(0)));
    }

    #[test]
    fn punctuation_filter_matches_ascii_set() {
        let mapper = FilterPunctuation::new("text");
        let rows = mapper
            .map(row! { "text" => "hello, my little WORLD!" })
            .unwrap();
        assert_eq!(
            rows[0].get("text"),
            Some(&Value::from("hello my little WORLD"))
        );
    }
}
