//! Sorted-merge join over two key-sorted streams.
//!
//! Both inputs advance through the [`SortedGroups`] cursor, yielding one
//! maximal equal-key run at a time. The merge loop compares the current
//! group keys: equal keys hand both groups to the strategy's combine
//! step, while a key present on only one side is handled by that side's
//! pass-through-or-drop rule. The group on the inner side of the cross
//! product is materialized, since it is re-iterated once per outer row;
//! the outer side stays lazy.
//!
//! When two groups combine, each output row starts as a copy of the inner
//! row and absorbs the outer row's columns. A collision on a non-join
//! column renames both values with the configured suffixes. The [`Right`]
//! strategy iterates the physical right side as the outer loop and swaps
//! the suffix meaning, so `_1` always labels the caller's left input.
//!
//! [`Right`]: JoinKind::Right

use tracing::trace;

use crate::error::Result;
use crate::graph::Sources;
use crate::groupby::SortedGroups;
use crate::operators::{two_inputs, Operation, RowStream};
use crate::row::{KeyTuple, Row};

/// Which rows a join keeps when a key is present on only one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep only matching keys.
    Inner,
    /// Keep everything; unmatched rows pass through unchanged.
    Outer,
    /// Keep matches and unmatched left rows.
    Left,
    /// Keep matches and unmatched right rows.
    Right,
}

impl JoinKind {
    fn passes_left(self) -> bool {
        matches!(self, JoinKind::Outer | JoinKind::Left)
    }

    fn passes_right(self) -> bool {
        matches!(self, JoinKind::Outer | JoinKind::Right)
    }
}

/// A join strategy: a [`JoinKind`] plus the collision suffixes.
pub struct Joiner {
    kind: JoinKind,
    left_suffix: String,
    right_suffix: String,
}

impl Joiner {
    /// An inner join.
    pub fn inner() -> Self {
        Joiner::new(JoinKind::Inner)
    }

    /// A full outer join.
    pub fn outer() -> Self {
        Joiner::new(JoinKind::Outer)
    }

    /// A left join.
    pub fn left() -> Self {
        Joiner::new(JoinKind::Left)
    }

    /// A right join.
    pub fn right() -> Self {
        Joiner::new(JoinKind::Right)
    }

    /// A join of the given kind with the default `_1`/`_2` suffixes.
    pub fn new(kind: JoinKind) -> Self {
        Joiner {
            kind,
            left_suffix: "_1".to_owned(),
            right_suffix: "_2".to_owned(),
        }
    }

    /// Replaces the collision suffixes; `left` labels the caller's left
    /// input regardless of the join kind.
    pub fn suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_suffix = left.into();
        self.right_suffix = right.into();
        self
    }
}

/// Joins two streams sorted ascending by the join-key tuple.
pub struct Join {
    joiner: Joiner,
    keys: Vec<String>,
}

impl Join {
    /// A join by `keys` with the given strategy.
    pub fn new(joiner: Joiner, keys: &[&str]) -> Self {
        Join {
            joiner,
            keys: keys.iter().map(|k| (*k).to_owned()).collect(),
        }
    }
}

impl Operation for Join {
    fn apply<'a>(
        &'a self,
        inputs: Vec<RowStream<'a>>,
        _sources: &'a Sources,
    ) -> Result<RowStream<'a>> {
        let (left, right) = two_inputs(inputs, "join");
        Ok(Box::new(JoinRows {
            joiner: &self.joiner,
            keys: &self.keys,
            left: SortedGroups::new(left, &self.keys),
            right: SortedGroups::new(right, &self.keys),
            left_key: None,
            right_key: None,
            state: JoinState::Advance {
                left: true,
                right: true,
            },
        }))
    }
}

/// Which physical input a state is draining.
#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

enum JoinState {
    /// Advance the flagged cursors, then dispatch on the new keys.
    Advance { left: bool, right: bool },
    /// Emit the cross product of a lazy outer group with a materialized
    /// inner group. `outer` of `None` means the next outer row is due.
    Cross {
        outer_side: Side,
        outer: Option<Row>,
        inner: Vec<Row>,
        at: usize,
    },
    /// Pass one side's current group through unchanged, then advance the
    /// flagged cursors.
    Pass {
        side: Side,
        advance: (bool, bool),
    },
    /// Emit already-materialized rows, then advance the flagged cursors.
    Emit {
        rows: std::vec::IntoIter<Row>,
        advance: (bool, bool),
    },
    Done,
}

struct JoinRows<'a> {
    joiner: &'a Joiner,
    keys: &'a [String],
    left: SortedGroups<'a>,
    right: SortedGroups<'a>,
    left_key: Option<KeyTuple>,
    right_key: Option<KeyTuple>,
    state: JoinState,
}

impl Iterator for JoinRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, JoinState::Done) {
                JoinState::Done => return None,

                JoinState::Advance { left, right } => {
                    if left {
                        match self.left.advance() {
                            Ok(key) => self.left_key = key,
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    if right {
                        match self.right.advance() {
                            Ok(key) => self.right_key = key,
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    trace!(left = ?self.left_key, right = ?self.right_key, "join step");
                    match (&self.left_key, &self.right_key) {
                        (None, None) => return None,
                        (Some(_), None) => self.state = self.left_only((true, false)),
                        (None, Some(_)) => self.state = self.right_only((false, true)),
                        (Some(l), Some(r)) => {
                            self.state = match l.cmp(r) {
                                std::cmp::Ordering::Less => self.left_only((true, false)),
                                std::cmp::Ordering::Greater => self.right_only((false, true)),
                                std::cmp::Ordering::Equal => match self.matching() {
                                    Ok(state) => state,
                                    Err(e) => return Some(Err(e)),
                                },
                            };
                        }
                    }
                }

                JoinState::Cross {
                    outer_side,
                    outer,
                    inner,
                    at,
                } => {
                    let outer = match outer {
                        Some(row) => Some(row),
                        None => match self.side(outer_side).next_in_group() {
                            None => None,
                            Some(Ok(row)) => Some(row),
                            Some(Err(e)) => return Some(Err(e)),
                        },
                    };
                    match outer {
                        None => {
                            self.state = JoinState::Advance {
                                left: true,
                                right: true,
                            };
                        }
                        Some(outer_row) => {
                            let combined = self.combine(outer_side, &outer_row, &inner[at]);
                            let exhausted_inner = at + 1 == inner.len();
                            self.state = JoinState::Cross {
                                outer_side,
                                outer: (!exhausted_inner).then_some(outer_row),
                                inner,
                                at: if exhausted_inner { 0 } else { at + 1 },
                            };
                            return Some(Ok(combined));
                        }
                    }
                }

                JoinState::Pass { side, advance } => match self.side(side).next_in_group() {
                    Some(Ok(row)) => {
                        self.state = JoinState::Pass { side, advance };
                        return Some(Ok(row));
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => {
                        self.state = JoinState::Advance {
                            left: advance.0,
                            right: advance.1,
                        };
                    }
                },

                JoinState::Emit { mut rows, advance } => match rows.next() {
                    Some(row) => {
                        self.state = JoinState::Emit { rows, advance };
                        return Some(Ok(row));
                    }
                    None => {
                        self.state = JoinState::Advance {
                            left: advance.0,
                            right: advance.1,
                        };
                    }
                },
            }
        }
    }
}

impl<'a> JoinRows<'a> {
    fn side(&mut self, side: Side) -> &mut SortedGroups<'a> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// The state for a group present only on the left.
    fn left_only(&self, advance: (bool, bool)) -> JoinState {
        if self.joiner.kind.passes_left() {
            JoinState::Pass {
                side: Side::Left,
                advance,
            }
        } else {
            // Dropped; the next advance drains the group.
            JoinState::Advance {
                left: advance.0,
                right: advance.1,
            }
        }
    }

    /// The state for a group present only on the right.
    fn right_only(&self, advance: (bool, bool)) -> JoinState {
        if self.joiner.kind.passes_right() {
            JoinState::Pass {
                side: Side::Right,
                advance,
            }
        } else {
            JoinState::Advance {
                left: advance.0,
                right: advance.1,
            }
        }
    }

    /// The state for a key present on both sides.
    ///
    /// The inner side is materialized here. With a non-empty key tuple
    /// both groups are necessarily non-empty; with an empty key tuple
    /// (whole-stream joins) either side may turn out empty, in which case
    /// the remaining side falls back to its one-sided rule.
    fn matching(&mut self) -> Result<JoinState> {
        let (outer_side, inner_side) = match self.joiner.kind {
            JoinKind::Right => (Side::Right, Side::Left),
            _ => (Side::Left, Side::Right),
        };

        let mut inner = Vec::new();
        while let Some(row) = self.side(inner_side).next_in_group() {
            inner.push(row?);
        }

        let first_outer = match self.side(outer_side).next_in_group() {
            None => None,
            Some(row) => Some(row?),
        };

        Ok(match (first_outer, inner.is_empty()) {
            (Some(outer), false) => JoinState::Cross {
                outer_side,
                outer: Some(outer),
                inner,
                at: 0,
            },
            (Some(first), true) => {
                // Only the outer side has rows; its first row is already
                // consumed, so re-emit it ahead of the rest of the group.
                let passes = match outer_side {
                    Side::Left => self.joiner.kind.passes_left(),
                    Side::Right => self.joiner.kind.passes_right(),
                };
                if passes {
                    let mut rows = vec![first];
                    while let Some(row) = self.side(outer_side).next_in_group() {
                        rows.push(row?);
                    }
                    JoinState::Emit {
                        rows: rows.into_iter(),
                        advance: (true, true),
                    }
                } else {
                    JoinState::Advance {
                        left: true,
                        right: true,
                    }
                }
            }
            (None, false) => {
                let passes = match inner_side {
                    Side::Left => self.joiner.kind.passes_left(),
                    Side::Right => self.joiner.kind.passes_right(),
                };
                if passes {
                    JoinState::Emit {
                        rows: inner.into_iter(),
                        advance: (true, true),
                    }
                } else {
                    JoinState::Advance {
                        left: true,
                        right: true,
                    }
                }
            }
            (None, true) => JoinState::Advance {
                left: true,
                right: true,
            },
        })
    }

    /// The combine primitive: a copy of the inner row absorbs the outer
    /// row's columns, renaming non-join-key collisions with the strategy's
    /// suffixes.
    fn combine(&self, outer_side: Side, outer: &Row, inner: &Row) -> Row {
        let (outer_suffix, inner_suffix) = match outer_side {
            Side::Left => (&self.joiner.left_suffix, &self.joiner.right_suffix),
            Side::Right => (&self.joiner.right_suffix, &self.joiner.left_suffix),
        };
        let mut combined = inner.clone();
        for (column, value) in outer.columns() {
            if !combined.contains(column) {
                combined.set(column, value.clone());
            } else if !self.keys.iter().any(|key| key == column) {
                if let Some(inner_value) = combined.remove(column) {
                    combined.set(format!("{column}{outer_suffix}"), value.clone());
                    combined.set(format!("{column}{inner_suffix}"), inner_value);
                }
            }
        }
        combined
    }
}
