//! Splitting a key-sorted stream into maximal runs of equal keys.
//!
//! [`SortedGroups`] is the grouping cursor shared by Reduce and Join. It
//! walks a stream one group at a time, hands out each group as a lazy
//! iterator, and verifies while doing so that the key tuples never
//! decrease between groups. A decreasing transition means the upstream
//! contract (a stream sorted by the grouping keys) was violated, and
//! surfaces as [`Error::UnsortedInput`].
//!
//! The cursor is deliberately not an `Iterator`: each group borrows the
//! cursor, and a new group may only be requested once the previous one has
//! been consumed or abandoned. [`SortedGroups::advance`] enforces this by
//! draining whatever is left of the current group.

use crate::error::{Error, Result};
use crate::operators::RowStream;
use crate::row::{KeyTuple, Row};

/// A cursor over the maximal equal-key runs of a sorted stream.
///
/// With an empty key tuple the whole stream is treated as one group, per
/// the Reduce contract.
pub struct SortedGroups<'a> {
    rows: RowStream<'a>,
    keys: &'a [String],
    /// Key of the group currently being read; `None` before the first
    /// `advance` and after exhaustion.
    current: Option<KeyTuple>,
    /// First row of the current group, not yet handed out.
    pending: Option<Row>,
    /// First row of the *next* group, observed while finishing this one.
    lookahead: Option<(KeyTuple, Row)>,
    started: bool,
}

impl<'a> SortedGroups<'a> {
    /// Wraps a stream that is sorted ascending by `keys`.
    pub fn new(rows: RowStream<'a>, keys: &'a [String]) -> Self {
        SortedGroups {
            rows,
            keys,
            current: None,
            pending: None,
            lookahead: None,
            started: false,
        }
    }

    /// Finishes the current group and starts the next one, returning its
    /// key, or `None` once the stream is exhausted.
    pub fn advance(&mut self) -> Result<Option<KeyTuple>> {
        if self.keys.is_empty() {
            return self.advance_whole_stream();
        }

        // Drain whatever the consumer left of the current group.
        while let Some(row) = self.next_in_group() {
            row?;
        }

        let (key, row) = match self.lookahead.take() {
            Some(next) => next,
            None => match self.rows.next() {
                None => {
                    self.current = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.current = None;
                    return Err(e);
                }
                Some(Ok(row)) => (row.key(self.keys)?, row),
            },
        };

        if let Some(prev) = &self.current {
            if key < *prev {
                self.current = None;
                return Err(Error::UnsortedInput {
                    keys: self.keys.to_vec(),
                });
            }
        }
        self.current = Some(key.clone());
        self.pending = Some(row);
        Ok(Some(key))
    }

    fn advance_whole_stream(&mut self) -> Result<Option<KeyTuple>> {
        if !self.started {
            self.started = true;
            self.current = Some(KeyTuple::new());
            return Ok(Some(KeyTuple::new()));
        }
        while let Some(row) = self.rows.next() {
            row?;
        }
        self.current = None;
        Ok(None)
    }

    /// The next row of the current group, or `None` at the group boundary.
    pub fn next_in_group(&mut self) -> Option<Result<Row>> {
        if let Some(row) = self.pending.take() {
            return Some(Ok(row));
        }
        let current = self.current.as_ref()?;
        if self.keys.is_empty() {
            return self.rows.next();
        }
        if self.lookahead.is_some() {
            return None;
        }
        match self.rows.next() {
            None => None,
            Some(Err(e)) => {
                self.current = None;
                Some(Err(e))
            }
            Some(Ok(row)) => match row.key(self.keys) {
                Err(e) => {
                    self.current = None;
                    Some(Err(e))
                }
                Ok(key) if key == *current => Some(Ok(row)),
                Ok(key) => {
                    self.lookahead = Some((key, row));
                    None
                }
            },
        }
    }
}

/// The current group of a [`SortedGroups`] cursor, as a plain iterator.
///
/// This is the shape reducers and joiners consume: a single-pass iterator
/// over the rows of one group.
pub struct GroupRows<'g, 'a> {
    groups: &'g mut SortedGroups<'a>,
}

impl<'g, 'a> GroupRows<'g, 'a> {
    /// Borrows the cursor's current group.
    pub fn new(groups: &'g mut SortedGroups<'a>) -> Self {
        GroupRows { groups }
    }
}

impl Iterator for GroupRows<'_, '_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.groups.next_in_group()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn stream(rows: Vec<Row>) -> RowStream<'static> {
        Box::new(rows.into_iter().map(Ok))
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn groups_contiguous_runs() {
        let keys = keys(&["k"]);
        let rows = vec![
            row! { "k" => 1, "v" => "a" },
            row! { "k" => 1, "v" => "b" },
            row! { "k" => 2, "v" => "c" },
        ];
        let mut groups = SortedGroups::new(stream(rows), &keys);

        let first = groups.advance().unwrap().unwrap();
        assert_eq!(first.as_slice(), &[crate::Value::Int(1)]);
        let members: Vec<Row> = GroupRows::new(&mut groups).map(Result::unwrap).collect();
        assert_eq!(members.len(), 2);

        let second = groups.advance().unwrap().unwrap();
        assert_eq!(second.as_slice(), &[crate::Value::Int(2)]);
        let members: Vec<Row> = GroupRows::new(&mut groups).map(Result::unwrap).collect();
        assert_eq!(members, vec![row! { "k" => 2, "v" => "c" }]);

        assert!(groups.advance().unwrap().is_none());
    }

    #[test]
    fn advance_drains_an_abandoned_group() {
        let keys = keys(&["k"]);
        let rows = vec![
            row! { "k" => 1, "v" => "a" },
            row! { "k" => 1, "v" => "b" },
            row! { "k" => 2, "v" => "c" },
        ];
        let mut groups = SortedGroups::new(stream(rows), &keys);
        groups.advance().unwrap().unwrap();
        // Read nothing from the first group; the cursor skips it.
        let key = groups.advance().unwrap().unwrap();
        assert_eq!(key.as_slice(), &[crate::Value::Int(2)]);
    }

    #[test]
    fn decreasing_keys_are_rejected() {
        let keys = keys(&["k"]);
        let rows = vec![row! { "k" => 2 }, row! { "k" => 1 }];
        let mut groups = SortedGroups::new(stream(rows), &keys);
        groups.advance().unwrap().unwrap();
        assert!(matches!(
            groups.advance(),
            Err(Error::UnsortedInput { .. })
        ));
    }

    #[test]
    fn empty_key_tuple_yields_one_group() {
        let keys: Vec<String> = Vec::new();
        let rows = vec![row! { "k" => 2 }, row! { "k" => 1 }];
        let mut groups = SortedGroups::new(stream(rows), &keys);
        let key = groups.advance().unwrap().unwrap();
        assert!(key.is_empty());
        assert_eq!(GroupRows::new(&mut groups).count(), 2);
        assert!(groups.advance().unwrap().is_none());
    }
}
