//! The operations a graph node can perform, and the contract they share.
//!
//! Every operation consumes zero or more input streams plus the named
//! sources of the current run, and produces one lazy output stream. The
//! concrete operations live in the submodules: [`map`], [`reduce`],
//! [`sort`] and [`join`], with the two source operations defined here.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BoxError, Error, Result};
use crate::graph::Sources;
use crate::row::Row;

pub mod join;
pub mod map;
pub mod reduce;
pub mod sort;

pub use join::{Join, JoinKind, Joiner};
pub use map::{
    AtLeastNTimes, Divide, Filter, FilterPunctuation, Haversine, HourWeekday, Identity,
    LogTransform, LongerThanN, LowerCase, Map, Mapper, Product, Project, Split, TimeDiff,
};
pub use reduce::{
    Count, CountRows, First, Mean, Reduce, Reducer, Sum, TermFrequency, TermFrequencyFromCounts,
    TopN,
};
pub use sort::{ExternalSort, SortOptions};

/// A single-pass, lazy stream of rows.
///
/// Streams are not restartable; an error item aborts the stream, and
/// every adapter in this crate stops producing after yielding one.
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// The uniform contract of a graph node.
///
/// An operation is handed its parents' output streams (in parent order)
/// together with the named sources of the current run, and returns its own
/// output stream. Producing an output row must not force input rows beyond
/// what that row requires; all I/O and computation happen while the
/// returned stream is consumed.
pub trait Operation {
    /// Applies the operation to its input streams.
    ///
    /// The required input arity is fixed per operation: sources take none,
    /// `Map`/`Reduce`/`Sort` take one, `Join` takes two (the second being
    /// the right side). Implementations panic when handed the wrong number
    /// of streams, since only a malformed graph can do that.
    fn apply<'a>(
        &'a self,
        inputs: Vec<RowStream<'a>>,
        sources: &'a Sources,
    ) -> Result<RowStream<'a>>;
}

pub(crate) fn one_input<'a>(mut inputs: Vec<RowStream<'a>>, operation: &str) -> RowStream<'a> {
    match (inputs.pop(), inputs.is_empty()) {
        (Some(input), true) => input,
        _ => panic!("{operation} takes exactly one input stream"),
    }
}

pub(crate) fn two_inputs<'a>(
    mut inputs: Vec<RowStream<'a>>,
    operation: &str,
) -> (RowStream<'a>, RowStream<'a>) {
    match (inputs.pop(), inputs.pop(), inputs.is_empty()) {
        (Some(right), Some(left), true) => (left, right),
        _ => panic!("{operation} takes exactly two input streams"),
    }
}

/// Reads rows from a named supplier passed to `run`.
///
/// The supplier is looked up in the run's [`Sources`] and called anew on
/// every execution, so a graph can be re-run against fresh data.
pub struct IteratorSource {
    name: String,
}

impl IteratorSource {
    /// A source reading from the supplier registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        IteratorSource { name: name.into() }
    }
}

impl Operation for IteratorSource {
    fn apply<'a>(
        &'a self,
        _inputs: Vec<RowStream<'a>>,
        sources: &'a Sources,
    ) -> Result<RowStream<'a>> {
        let supplier = sources
            .get(&self.name)
            .ok_or_else(|| Error::MissingSource(self.name.clone()))?;
        Ok(supplier())
    }
}

/// A function turning one line of a source file into a row.
pub type LineParser = dyn Fn(&str) -> Result<Row, BoxError> + Send + Sync;

/// The default line parser: one JSON object per line.
pub fn json_line_parser(line: &str) -> Result<Row, BoxError> {
    let row = serde_json::from_str(line)?;
    Ok(row)
}

/// Reads rows from a line-delimited file through a parser.
///
/// The file is opened when the output stream is created and the handle is
/// owned by the stream, so it is released as soon as the stream terminates
/// or is dropped.
pub struct FileSource {
    path: PathBuf,
    parser: Box<LineParser>,
}

impl FileSource {
    /// A file source parsing each line as a JSON object.
    pub fn json(path: impl Into<PathBuf>) -> Self {
        FileSource::with_parser(path, json_line_parser)
    }

    /// A file source with a caller-supplied line parser.
    pub fn with_parser(
        path: impl Into<PathBuf>,
        parser: impl Fn(&str) -> Result<Row, BoxError> + Send + Sync + 'static,
    ) -> Self {
        FileSource {
            path: path.into(),
            parser: Box::new(parser),
        }
    }
}

impl Operation for FileSource {
    fn apply<'a>(
        &'a self,
        _inputs: Vec<RowStream<'a>>,
        _sources: &'a Sources,
    ) -> Result<RowStream<'a>> {
        debug!(path = %self.path.display(), "opening source file");
        let file = File::open(&self.path).map_err(|source| Error::SourceIo {
            path: self.path.clone(),
            source,
        })?;
        Ok(Box::new(FileRows {
            path: &self.path,
            parser: &*self.parser,
            lines: BufReader::new(file).lines(),
            line: 0,
            done: false,
        }))
    }
}

struct FileRows<'a> {
    path: &'a Path,
    parser: &'a LineParser,
    lines: Lines<BufReader<File>>,
    line: u64,
    done: bool,
}

impl Iterator for FileRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(source) => {
                self.done = true;
                return Some(Err(Error::SourceIo {
                    path: self.path.to_owned(),
                    source,
                }));
            }
        };
        self.line += 1;
        match (self.parser)(&line) {
            Ok(row) => Some(Ok(row)),
            Err(source) => {
                self.done = true;
                Some(Err(Error::SourceParse {
                    path: self.path.to_owned(),
                    line: self.line,
                    source,
                }))
            }
        }
    }
}
