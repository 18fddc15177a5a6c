//! Grouped aggregation, and the library of stock reducers.
//!
//! [`Reduce`] requires its input sorted ascending by the grouping keys; it
//! walks the stream through the [`SortedGroups`] cursor, invoking the
//! [`Reducer`] once per maximal equal-key run and concatenating the
//! results in group order. The engine never buffers a whole group itself;
//! how much of one a reducer retains is the reducer's own business.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fnv::FnvHashMap;

use crate::error::Result;
use crate::graph::Sources;
use crate::groupby::{GroupRows, SortedGroups};
use crate::operators::map::numeric_add;
use crate::operators::{one_input, Operation, RowStream};
use crate::row::{Row, Value};

/// A per-group aggregation: the group's rows in, zero or more rows out.
///
/// The group iterator is single-pass and yields rows in stream order. A
/// reducer that needs the group key columns in its output should copy them
/// from the first row it reads, as every row of the group agrees on them.
pub trait Reducer {
    /// Aggregates one group.
    fn reduce(
        &self,
        key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>>;
}

/// Applies a [`Reducer`] to every equal-key run of a sorted stream.
///
/// With an empty key tuple the entire stream forms a single group.
pub struct Reduce {
    reducer: Box<dyn Reducer>,
    keys: Vec<String>,
}

impl Reduce {
    /// A reduce operation grouping by `keys`.
    pub fn new(reducer: impl Reducer + 'static, keys: &[&str]) -> Self {
        Reduce {
            reducer: Box::new(reducer),
            keys: keys.iter().map(|k| (*k).to_owned()).collect(),
        }
    }
}

impl Operation for Reduce {
    fn apply<'a>(
        &'a self,
        inputs: Vec<RowStream<'a>>,
        _sources: &'a Sources,
    ) -> Result<RowStream<'a>> {
        Ok(Box::new(ReduceRows {
            reducer: &*self.reducer,
            keys: &self.keys,
            groups: SortedGroups::new(one_input(inputs, "reduce"), &self.keys),
            produced: Vec::new().into_iter(),
            done: false,
        }))
    }
}

struct ReduceRows<'a> {
    reducer: &'a dyn Reducer,
    keys: &'a [String],
    groups: SortedGroups<'a>,
    produced: std::vec::IntoIter<Row>,
    done: bool,
}

impl Iterator for ReduceRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(row) = self.produced.next() {
                return Some(Ok(row));
            }
            match self.groups.advance() {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Ok(Some(_key)) => {
                    let mut rows = GroupRows::new(&mut self.groups);
                    match self.reducer.reduce(self.keys, &mut rows) {
                        Ok(produced) => self.produced = produced.into_iter(),
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

/// Copies the group key columns out of a representative row.
fn key_columns_of(key_columns: &[String], row: &Row) -> Result<Row> {
    key_columns
        .iter()
        .map(|column| Ok((column.clone(), row.require(column)?.clone())))
        .collect()
}

/// Yields only the first row of each group.
pub struct First;

impl Reducer for First {
    fn reduce(
        &self,
        _key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        Ok(rows.next().transpose()?.into_iter().collect())
    }
}

/// Yields the `n` rows of each group with the largest values in a column.
///
/// Output is ordered by descending value; ties keep their input order, and
/// only `n` rows are retained at any moment.
pub struct TopN {
    column: String,
    n: usize,
}

impl TopN {
    /// Keeps the top `n` rows of each group by `column`.
    pub fn new(column: impl Into<String>, n: usize) -> Self {
        TopN {
            column: column.into(),
            n,
        }
    }
}

struct Ranked {
    value: Value,
    index: usize,
    row: Row,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Among equal values, a later row ranks lower, so the earliest
        // rows survive eviction.
        self.value
            .cmp(&other.value)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl Reducer for TopN {
    fn reduce(
        &self,
        _key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        if self.n == 0 {
            for row in rows {
                row?;
            }
            return Ok(Vec::new());
        }
        let mut heap: BinaryHeap<std::cmp::Reverse<Ranked>> = BinaryHeap::with_capacity(self.n);
        for (index, row) in rows.enumerate() {
            let row = row?;
            let ranked = Ranked {
                value: row.require(&self.column)?.clone(),
                index,
                row,
            };
            if heap.len() < self.n {
                heap.push(std::cmp::Reverse(ranked));
            } else if heap.peek().is_some_and(|least| ranked > least.0) {
                heap.pop();
                heap.push(std::cmp::Reverse(ranked));
            }
        }
        let mut top: Vec<Ranked> = heap.into_iter().map(|reversed| reversed.0).collect();
        top.sort_by(|a, b| b.cmp(a));
        Ok(top.into_iter().map(|ranked| ranked.row).collect())
    }
}

/// Counts the rows of each group into a result column, keyed output.
pub struct Count {
    column: String,
}

impl Count {
    /// Counts group rows into `column`.
    pub fn new(column: impl Into<String>) -> Self {
        Count {
            column: column.into(),
        }
    }
}

impl Reducer for Count {
    fn reduce(
        &self,
        key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        let Some(first) = rows.next().transpose()? else {
            return Ok(Vec::new());
        };
        let mut counted = key_columns_of(key_columns, &first)?;
        let mut count: i64 = 1;
        for row in rows {
            row?;
            count += 1;
        }
        counted.set(&*self.column, count);
        Ok(vec![counted])
    }
}

/// Counts the rows of the whole group, ignoring the key columns.
///
/// Typically used with an empty key tuple to count an entire stream.
pub struct CountRows {
    column: String,
}

impl CountRows {
    /// Counts group rows into `column`.
    pub fn new(column: impl Into<String>) -> Self {
        CountRows {
            column: column.into(),
        }
    }
}

impl Reducer for CountRows {
    fn reduce(
        &self,
        _key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        let mut count: i64 = 0;
        for row in rows {
            row?;
            count += 1;
        }
        let mut counted = Row::new();
        counted.set(&*self.column, count);
        Ok(vec![counted])
    }
}

/// Sums a numeric column over each group.
pub struct Sum {
    column: String,
}

impl Sum {
    /// Sums `column` over the group, writing the total back to it.
    pub fn new(column: impl Into<String>) -> Self {
        Sum {
            column: column.into(),
        }
    }
}

impl Reducer for Sum {
    fn reduce(
        &self,
        key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        let Some(first) = rows.next().transpose()? else {
            return Ok(Vec::new());
        };
        let mut summed = key_columns_of(key_columns, &first)?;
        let mut total = first.require(&self.column)?.clone();
        for row in rows {
            total = numeric_add(&total, row?.require(&self.column)?, &self.column)?;
        }
        summed.set(&*self.column, total);
        Ok(vec![summed])
    }
}

/// Averages a numeric column over each group.
pub struct Mean {
    column: String,
}

impl Mean {
    /// Averages `column` over the group, writing the mean back to it.
    pub fn new(column: impl Into<String>) -> Self {
        Mean {
            column: column.into(),
        }
    }
}

impl Reducer for Mean {
    fn reduce(
        &self,
        key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        let Some(first) = rows.next().transpose()? else {
            return Ok(Vec::new());
        };
        let mut averaged = key_columns_of(key_columns, &first)?;
        let mut total = first.require_f64(&self.column)?;
        let mut count = 1usize;
        for row in rows {
            total += row?.require_f64(&self.column)?;
            count += 1;
        }
        averaged.set(&*self.column, total / count as f64);
        Ok(vec![averaged])
    }
}

/// Relative frequency of each distinct word within the group.
///
/// One output row per distinct word, in first-occurrence order, carrying
/// the group key columns, the word, and its share of the group.
pub struct TermFrequency {
    words_column: String,
    result_column: String,
}

impl TermFrequency {
    /// Computes per-word frequencies of `words_column` into
    /// `result_column`.
    pub fn new(words_column: impl Into<String>, result_column: impl Into<String>) -> Self {
        TermFrequency {
            words_column: words_column.into(),
            result_column: result_column.into(),
        }
    }
}

impl Reducer for TermFrequency {
    fn reduce(
        &self,
        key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        frequencies(key_columns, rows, &self.words_column, &self.result_column, |_| Ok(1.0))
    }
}

/// Relative frequency of each distinct word, weighted by a count column.
///
/// Like [`TermFrequency`], but each row contributes its pre-aggregated
/// count instead of one occurrence.
pub struct TermFrequencyFromCounts {
    words_column: String,
    count_column: String,
    result_column: String,
}

impl TermFrequencyFromCounts {
    /// Computes per-word frequencies weighted by `count_column`.
    pub fn new(
        words_column: impl Into<String>,
        count_column: impl Into<String>,
        result_column: impl Into<String>,
    ) -> Self {
        TermFrequencyFromCounts {
            words_column: words_column.into(),
            count_column: count_column.into(),
            result_column: result_column.into(),
        }
    }
}

impl Reducer for TermFrequencyFromCounts {
    fn reduce(
        &self,
        key_columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<Vec<Row>> {
        frequencies(key_columns, rows, &self.words_column, &self.result_column, |row| {
            row.require_f64(&self.count_column)
        })
    }
}

fn frequencies(
    key_columns: &[String],
    rows: &mut dyn Iterator<Item = Result<Row>>,
    words_column: &str,
    result_column: &str,
    weight: impl Fn(&Row) -> Result<f64>,
) -> Result<Vec<Row>> {
    let Some(first) = rows.next().transpose()? else {
        return Ok(Vec::new());
    };
    let common = key_columns_of(key_columns, &first)?;

    // (first-occurrence index, accumulated weight) per distinct word.
    let mut weights: FnvHashMap<String, (usize, f64)> = FnvHashMap::default();
    let mut total = 0.0;
    let mut tally = |row: &Row| -> Result<()> {
        let word = row.require_str(words_column)?;
        let contribution = weight(row)?;
        total += contribution;
        let next_index = weights.len();
        weights.entry(word.to_owned()).or_insert((next_index, 0.0)).1 += contribution;
        Ok(())
    };

    tally(&first)?;
    for row in rows {
        tally(&row?)?;
    }

    let mut ordered: Vec<(String, (usize, f64))> = weights.into_iter().collect();
    ordered.sort_by_key(|(_, (index, _))| *index);
    Ok(ordered
        .into_iter()
        .map(|(word, (_, accumulated))| {
            let mut out = common.clone();
            out.set(words_column, word);
            out.set(result_column, accumulated / total);
            out
        })
        .collect())
}
