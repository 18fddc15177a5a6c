//! Ready-made pipelines composed from the stock operations.
//!
//! These are the canonical clients of the engine: word counting, TF-IDF
//! inverted indexing, pointwise mutual information, and per-hour average
//! road speeds. Each function only composes a [`Graph`]; nothing executes
//! until the caller runs it.

use std::path::PathBuf;

use crate::graph::Graph;
use crate::operators::{
    AtLeastNTimes, Count, CountRows, Divide, FilterPunctuation, First, Haversine, HourWeekday,
    Joiner, LogTransform, LongerThanN, LowerCase, Product, Project, Split, Sum, TermFrequency,
    TermFrequencyFromCounts, TimeDiff, TopN,
};

/// Where a pipeline reads its rows from.
pub enum Input {
    /// A named supplier passed to `run`.
    Source(String),
    /// A file of newline-delimited JSON rows.
    File(PathBuf),
}

impl Input {
    /// Rows from the supplier registered under `name`.
    pub fn source(name: impl Into<String>) -> Self {
        Input::Source(name.into())
    }

    /// Rows from a newline-delimited JSON file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Input::File(path.into())
    }

    fn graph(&self) -> Graph {
        match self {
            Input::Source(name) => Graph::from_named_source(name.clone()),
            Input::File(path) => Graph::from_file(path.clone()),
        }
    }
}

/// Counts the words of a text column across all rows.
///
/// Output rows carry the word and its count, ordered by ascending count
/// and then word.
pub fn word_count_graph(input: Input, text_column: &str, count_column: &str) -> Graph {
    input
        .graph()
        .map(FilterPunctuation::new(text_column))
        .map(LowerCase::new(text_column))
        .map(Split::whitespace(text_column))
        .sort(&[text_column])
        .reduce(Count::new(count_column), &[text_column])
        .sort(&[count_column, text_column])
}

/// Scores every word/document pair with TF-IDF, keeping the top three
/// documents per word.
pub fn inverted_index_graph(
    input: Input,
    doc_column: &str,
    text_column: &str,
    result_column: &str,
) -> Graph {
    let reader = input.graph();

    let split = reader
        .map(FilterPunctuation::new(text_column))
        .map(LowerCase::new(text_column))
        .map(Split::whitespace(text_column));

    let doc_count = reader.reduce(CountRows::new("doc_ctr"), &[]);

    let idf = split
        .sort(&[doc_column, text_column])
        .reduce(First, &[doc_column, text_column])
        .sort(&[text_column])
        .reduce(Count::new("doc_text_ctr"), &[text_column])
        .join(Joiner::inner(), &doc_count, &[])
        .map(LogTransform::new("doc_ctr", "doc_text_ctr", "idf"));

    let tf = split
        .sort(&[doc_column])
        .reduce(TermFrequency::new(text_column, "tf"), &[doc_column])
        .sort(&[text_column]);

    idf.join(Joiner::inner(), &tf, &[text_column])
        .map(Product::new(&["idf", "tf"], result_column))
        .map(Project::new(&[doc_column, text_column, result_column]))
        .sort(&[text_column, doc_column])
        .reduce(TopN::new(result_column, 3), &[text_column])
}

/// Ranks, for every document, its top ten words by pointwise mutual
/// information against the whole corpus.
///
/// Only words longer than four characters occurring at least twice in
/// their document participate.
pub fn pmi_graph(input: Input, doc_column: &str, text_column: &str, result_column: &str) -> Graph {
    let split = input
        .graph()
        .map(FilterPunctuation::new(text_column))
        .map(LowerCase::new(text_column))
        .map(Split::whitespace(text_column))
        .map(LongerThanN::new(text_column, 4))
        .sort(&[doc_column, text_column])
        .reduce(Count::new("ctr"), &[doc_column, text_column])
        .map(AtLeastNTimes::new("ctr", 2));

    let tf = split
        .sort(&[doc_column])
        .reduce(
            TermFrequencyFromCounts::new(text_column, "ctr", "tf"),
            &[doc_column],
        )
        .sort(&[text_column]);

    let tf_combined = split
        .sort(&[text_column])
        .reduce(Sum::new("ctr"), &[text_column])
        .reduce(TermFrequencyFromCounts::new(text_column, "ctr", "tf_combined"), &[]);

    tf.sort(&[text_column])
        .join(Joiner::inner(), &tf_combined, &[text_column])
        .map(LogTransform::new("tf", "tf_combined", result_column))
        .map(Project::new(&[doc_column, text_column, result_column]))
        .sort(&[doc_column])
        .reduce(TopN::new(result_column, 10), &[doc_column])
}

/// Column names for [`average_speed_graph`].
pub struct SpeedColumns {
    /// Traversal start timestamp.
    pub enter_time: String,
    /// Traversal end timestamp.
    pub leave_time: String,
    /// Edge identifier shared by both inputs.
    pub edge_id: String,
    /// `[longitude, latitude]` of the edge start.
    pub start: String,
    /// `[longitude, latitude]` of the edge end.
    pub end: String,
    /// Output weekday column.
    pub weekday: String,
    /// Output hour column.
    pub hour: String,
    /// Output speed column, in km/h.
    pub speed: String,
}

impl Default for SpeedColumns {
    fn default() -> Self {
        SpeedColumns {
            enter_time: "enter_time".to_owned(),
            leave_time: "leave_time".to_owned(),
            edge_id: "edge_id".to_owned(),
            start: "start".to_owned(),
            end: "end".to_owned(),
            weekday: "weekday".to_owned(),
            hour: "hour".to_owned(),
            speed: "speed".to_owned(),
        }
    }
}

/// Average road speed in km/h per (weekday, hour).
///
/// `time_input` holds per-traversal enter/leave times keyed by edge;
/// `length_input` holds the edge geometry. Total distance and total time
/// are aggregated separately per (weekday, hour) and divided at the end,
/// so every traversal contributes proportionally to its length.
pub fn average_speed_graph(
    time_input: Input,
    length_input: Input,
    columns: &SpeedColumns,
) -> Graph {
    let enter_time = columns.enter_time.as_str();
    let leave_time = columns.leave_time.as_str();
    let edge_id = columns.edge_id.as_str();
    let start = columns.start.as_str();
    let end = columns.end.as_str();
    let weekday = columns.weekday.as_str();
    let hour = columns.hour.as_str();
    let speed = columns.speed.as_str();

    let times = time_input
        .graph()
        .map(HourWeekday::new(enter_time, weekday, hour))
        .map(TimeDiff::new("diff", enter_time, leave_time))
        .map(Project::new(&[edge_id, weekday, hour, "diff"]))
        .sort(&[edge_id]);

    let lengths = length_input
        .graph()
        .map(Haversine::new("length", start, end))
        .map(Project::new(&[edge_id, "length"]))
        .sort(&[edge_id]);

    let total_length = times
        .join(Joiner::inner(), &lengths, &[edge_id])
        .sort(&[weekday, hour])
        .reduce(Sum::new("length"), &[weekday, hour]);

    let total_time = times
        .join(Joiner::inner(), &lengths, &[edge_id])
        .sort(&[weekday, hour])
        .reduce(Sum::new("diff"), &[weekday, hour]);

    total_time
        .join(Joiner::inner(), &total_length, &[weekday, hour])
        .map(Divide::new("length", "diff", speed))
        .map(Project::new(&[hour, speed, weekday]))
}
