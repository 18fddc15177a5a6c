//! Stable external sort by a key tuple.
//!
//! Input is buffered up to a configured row count. When the whole stream
//! fits in one buffer it is sorted and emitted directly; otherwise each
//! full buffer is stably sorted and spilled to an anonymous temporary
//! file as newline-delimited JSON, and the sorted runs are k-way merged
//! through a min-heap keyed by `(key tuple, run index)`. Runs are created
//! in input order and each run preserves input order among equal keys, so
//! the heap ordering makes the merge stable end to end.
//!
//! Spill files are created with [`tempfile::tempfile`], so the operating
//! system reclaims them as soon as the stream drops its handles, on
//! success, abandonment, and failure alike.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::Sources;
use crate::operators::{one_input, Operation, RowStream};
use crate::row::{KeyTuple, Row};

/// Tuning knobs for the external sort.
#[derive(Debug, Clone)]
pub struct SortOptions {
    /// Rows buffered in memory before a run is spilled to disk.
    pub chunk_size: usize,
    /// Directory for spill files; the system temp directory when `None`.
    pub spill_dir: Option<PathBuf>,
}

impl Default for SortOptions {
    fn default() -> Self {
        SortOptions {
            chunk_size: 100_000,
            spill_dir: None,
        }
    }
}

/// Sorts a stream into stable ascending order of a key tuple.
pub struct ExternalSort {
    keys: Vec<String>,
    options: SortOptions,
}

impl ExternalSort {
    /// A sort by `keys` with default [`SortOptions`].
    pub fn new(keys: &[&str]) -> Self {
        ExternalSort::with_options(keys, SortOptions::default())
    }

    /// A sort by `keys` with explicit options.
    pub fn with_options(keys: &[&str], options: SortOptions) -> Self {
        ExternalSort {
            keys: keys.iter().map(|k| (*k).to_owned()).collect(),
            options,
        }
    }
}

impl Operation for ExternalSort {
    fn apply<'a>(
        &'a self,
        inputs: Vec<RowStream<'a>>,
        _sources: &'a Sources,
    ) -> Result<RowStream<'a>> {
        Ok(Box::new(SortRows {
            op: self,
            state: SortState::Pending(one_input(inputs, "sort")),
        }))
    }
}

struct SortRows<'a> {
    op: &'a ExternalSort,
    state: SortState<'a>,
}

enum SortState<'a> {
    /// Input not yet consumed; nothing happens until the first pull.
    Pending(RowStream<'a>),
    /// The whole input fit in one buffer.
    Memory(std::vec::IntoIter<(KeyTuple, Row)>),
    /// Merging spilled runs.
    Merge(KWayMerge),
    Done,
}

impl Iterator for SortRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                SortState::Done => return None,
                SortState::Memory(rows) => {
                    return match rows.next() {
                        Some((_, row)) => Some(Ok(row)),
                        None => {
                            self.state = SortState::Done;
                            None
                        }
                    };
                }
                SortState::Merge(merge) => {
                    return match merge.next_row(&self.op.keys) {
                        Ok(Some(row)) => Some(Ok(row)),
                        Ok(None) => {
                            self.state = SortState::Done;
                            None
                        }
                        Err(e) => {
                            self.state = SortState::Done;
                            Some(Err(e))
                        }
                    };
                }
                SortState::Pending(_) => {
                    let SortState::Pending(input) =
                        std::mem::replace(&mut self.state, SortState::Done)
                    else {
                        unreachable!()
                    };
                    match consume(self.op, input) {
                        Ok(state) => self.state = state,
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}

/// Drains the input, returning either an in-memory run or a merge over
/// spilled runs.
fn consume<'a>(op: &ExternalSort, mut input: RowStream<'a>) -> Result<SortState<'a>> {
    let chunk = op.options.chunk_size.max(1);
    let mut buffer: Vec<(KeyTuple, Row)> = Vec::new();
    let mut runs: Vec<RunReader> = Vec::new();

    loop {
        while buffer.len() < chunk {
            match input.next() {
                None => return finish(op, buffer, runs),
                Some(Err(e)) => return Err(e),
                Some(Ok(row)) => {
                    let key = row.key(&op.keys)?;
                    buffer.push((key, row));
                }
            }
        }
        // The buffer is full; only spill once we know more input follows,
        // so an input of exactly one chunk never touches disk.
        match input.next() {
            None => return finish(op, buffer, runs),
            Some(Err(e)) => return Err(e),
            Some(Ok(row)) => {
                buffer.sort_by(|a, b| a.0.cmp(&b.0));
                runs.push(spill(&buffer, &op.options)?);
                debug!(rows = buffer.len(), run = runs.len(), "spilled sorted run");
                buffer.clear();
                let key = row.key(&op.keys)?;
                buffer.push((key, row));
            }
        }
    }
}

fn finish<'a>(
    op: &ExternalSort,
    mut buffer: Vec<(KeyTuple, Row)>,
    mut runs: Vec<RunReader>,
) -> Result<SortState<'a>> {
    buffer.sort_by(|a, b| a.0.cmp(&b.0));
    if runs.is_empty() {
        return Ok(SortState::Memory(buffer.into_iter()));
    }
    if !buffer.is_empty() {
        runs.push(spill(&buffer, &op.options)?);
        debug!(rows = buffer.len(), run = runs.len(), "spilled final run");
    }
    debug!(runs = runs.len(), "merging sorted runs");
    KWayMerge::start(runs, &op.keys).map(SortState::Merge)
}

fn spill(buffer: &[(KeyTuple, Row)], options: &SortOptions) -> Result<RunReader> {
    let file = match &options.spill_dir {
        Some(dir) => tempfile::tempfile_in(dir),
        None => tempfile::tempfile(),
    }
    .map_err(Error::SpillIo)?;

    let mut writer = BufWriter::new(file);
    for (_, row) in buffer {
        serde_json::to_writer(&mut writer, row)
            .map_err(io::Error::from)
            .map_err(Error::SpillIo)?;
        writer.write_all(b"\n").map_err(Error::SpillIo)?;
    }
    let mut file = writer
        .into_inner()
        .map_err(|e| Error::SpillIo(e.into_error()))?;
    file.seek(SeekFrom::Start(0)).map_err(Error::SpillIo)?;
    Ok(RunReader {
        lines: BufReader::new(file).lines(),
    })
}

struct RunReader {
    lines: Lines<BufReader<File>>,
}

impl RunReader {
    fn next_entry(&mut self, keys: &[String]) -> Result<Option<(KeyTuple, Row)>> {
        let Some(line) = self.lines.next() else {
            return Ok(None);
        };
        let line = line.map_err(Error::SpillIo)?;
        let row: Row = serde_json::from_str(&line)
            .map_err(io::Error::from)
            .map_err(Error::SpillIo)?;
        let key = row.key(keys)?;
        Ok(Some((key, row)))
    }
}

struct MergeEntry {
    key: KeyTuple,
    run: usize,
    row: Row,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // The run index breaks key ties in favor of earlier input,
        // which is what makes the merge stable.
        self.key
            .cmp(&other.key)
            .then_with(|| self.run.cmp(&other.run))
    }
}

struct KWayMerge {
    runs: Vec<RunReader>,
    heap: BinaryHeap<Reverse<MergeEntry>>,
}

impl KWayMerge {
    fn start(mut runs: Vec<RunReader>, keys: &[String]) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(runs.len());
        for (run, reader) in runs.iter_mut().enumerate() {
            if let Some((key, row)) = reader.next_entry(keys)? {
                heap.push(Reverse(MergeEntry { key, run, row }));
            }
        }
        Ok(KWayMerge { runs, heap })
    }

    fn next_row(&mut self, keys: &[String]) -> Result<Option<Row>> {
        let Some(Reverse(entry)) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some((key, row)) = self.runs[entry.run].next_entry(keys)? {
            self.heap.push(Reverse(MergeEntry {
                key,
                run: entry.run,
                row,
            }));
        }
        Ok(Some(entry.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Sources;
    use crate::row;

    fn sorted(op: &ExternalSort, rows: Vec<Row>) -> Vec<Row> {
        let stream: RowStream<'static> = Box::new(rows.into_iter().map(Ok));
        op.apply(vec![stream], &Sources::new())
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn sorts_in_memory_without_spilling() {
        let op = ExternalSort::new(&["k"]);
        let rows = vec![row! { "k" => 3 }, row! { "k" => 1 }, row! { "k" => 2 }];
        let out = sorted(&op, rows);
        assert_eq!(
            out,
            vec![row! { "k" => 1 }, row! { "k" => 2 }, row! { "k" => 3 }]
        );
    }

    #[test]
    fn spilling_preserves_stability() {
        let op = ExternalSort::with_options(
            &["k"],
            SortOptions {
                chunk_size: 2,
                spill_dir: None,
            },
        );
        let rows = vec![
            row! { "k" => 2, "tag" => 0 },
            row! { "k" => 1, "tag" => 1 },
            row! { "k" => 1, "tag" => 2 },
            row! { "k" => 2, "tag" => 3 },
            row! { "k" => 1, "tag" => 4 },
        ];
        let out = sorted(&op, rows);
        assert_eq!(
            out,
            vec![
                row! { "k" => 1, "tag" => 1 },
                row! { "k" => 1, "tag" => 2 },
                row! { "k" => 1, "tag" => 4 },
                row! { "k" => 2, "tag" => 0 },
                row! { "k" => 2, "tag" => 3 },
            ]
        );
    }

    #[test]
    fn chunk_sized_input_stays_in_memory() {
        let op = ExternalSort::with_options(
            &["k"],
            SortOptions {
                chunk_size: 3,
                spill_dir: None,
            },
        );
        let rows = vec![row! { "k" => 2 }, row! { "k" => 3 }, row! { "k" => 1 }];
        let out = sorted(&op, rows);
        assert_eq!(
            out,
            vec![row! { "k" => 1 }, row! { "k" => 2 }, row! { "k" => 3 }]
        );
    }
}
