//! Immutable graph composition and execution.
//!
//! A [`Graph`] is a handle to a node in a directed acyclic graph of
//! operations. Builder methods never mutate the receiver: each returns a
//! new graph whose parents include the old one, so a partially built
//! pipeline can be shared between divergent downstream pipelines by
//! cloning the handle. Graphs are built bottom-up from sources, which
//! makes cycles structurally impossible.
//!
//! Nothing executes at composition time. [`Graph::run`] walks the DAG,
//! obtains each parent's stream recursively, and hands them to this
//! node's operation; rows start flowing only when the terminal stream is
//! consumed. Shared parents re-execute once per consumer: streams are
//! single-pass, so sharing one would require buffering, and the engine
//! never buffers behind your back.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::operators::{
    ExternalSort, FileSource, IteratorSource, Join, Joiner, Map, Mapper, Operation, Reduce,
    Reducer, RowStream, SortOptions,
};
use crate::row::Row;

/// The named row suppliers for one or more graph executions.
///
/// Each supplier is a zero-argument callable returning a fresh stream, and
/// is called anew on every run that reaches the corresponding source node,
/// so the same `Sources` can back repeated runs.
#[derive(Default)]
pub struct Sources {
    suppliers: HashMap<String, Box<dyn Fn() -> RowStream<'static>>>,
}

impl Sources {
    /// An empty set of sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a supplier under `name`.
    pub fn supply(
        mut self,
        name: impl Into<String>,
        supplier: impl Fn() -> RowStream<'static> + 'static,
    ) -> Self {
        self.suppliers.insert(name.into(), Box::new(supplier));
        self
    }

    /// Registers a fixed set of rows under `name`; each run receives a
    /// fresh copy.
    pub fn rows(self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.supply(name, move || Box::new(rows.clone().into_iter().map(Ok)))
    }

    pub(crate) fn get(&self, name: &str) -> Option<&(dyn Fn() -> RowStream<'static>)> {
        self.suppliers.get(name).map(|supplier| &**supplier)
    }
}

struct Node {
    operation: Box<dyn Operation>,
    parents: Vec<Graph>,
}

/// A handle to one node of an immutable operation DAG.
///
/// Cloning is cheap and shares structure: clone a graph wherever a
/// pipeline forks, and keep composing both branches independently.
#[derive(Clone)]
pub struct Graph {
    node: Rc<Node>,
}

impl Graph {
    /// A graph around an arbitrary [`Operation`] with explicit parents.
    ///
    /// The builder methods below cover the stock operations; this is the
    /// seam for plugging in a custom one.
    pub fn from_operation(operation: impl Operation + 'static, parents: Vec<Graph>) -> Self {
        Graph {
            node: Rc::new(Node {
                operation: Box::new(operation),
                parents,
            }),
        }
    }

    /// A source reading from the named supplier of each run's [`Sources`].
    pub fn from_named_source(name: impl Into<String>) -> Self {
        Graph::from_operation(IteratorSource::new(name), Vec::new())
    }

    /// A source reading a file of newline-delimited JSON rows.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Graph::from_operation(FileSource::json(path), Vec::new())
    }

    /// A source reading a file through a caller-supplied line parser.
    pub fn from_file_source(source: FileSource) -> Self {
        Graph::from_operation(source, Vec::new())
    }

    /// Extends this graph with a per-row [`Mapper`].
    pub fn map(&self, mapper: impl Mapper + 'static) -> Self {
        Graph::from_operation(Map::new(mapper), vec![self.clone()])
    }

    /// Extends this graph with a grouped [`Reducer`].
    ///
    /// The input reaching the reduce node must be sorted ascending by
    /// `keys`; an empty `keys` treats the whole stream as one group.
    pub fn reduce(&self, reducer: impl Reducer + 'static, keys: &[&str]) -> Self {
        Graph::from_operation(Reduce::new(reducer, keys), vec![self.clone()])
    }

    /// Extends this graph with a stable external sort by `keys`.
    pub fn sort(&self, keys: &[&str]) -> Self {
        Graph::from_operation(ExternalSort::new(keys), vec![self.clone()])
    }

    /// Extends this graph with a sort using explicit [`SortOptions`].
    pub fn sort_with(&self, keys: &[&str], options: SortOptions) -> Self {
        Graph::from_operation(ExternalSort::with_options(keys, options), vec![self.clone()])
    }

    /// Extends this graph with a sorted-merge join against `right`.
    ///
    /// Both this graph's stream and `right`'s must be sorted ascending by
    /// `keys` when they reach the join node.
    pub fn join(&self, joiner: Joiner, right: &Graph, keys: &[&str]) -> Self {
        Graph::from_operation(Join::new(joiner, keys), vec![self.clone(), right.clone()])
    }

    /// Executes the graph, returning the terminal stream.
    ///
    /// Every parent's stream is obtained recursively with the same
    /// `sources`, then this node's operation is applied. Running the same
    /// graph twice produces two independent streams; no state carries
    /// over between runs.
    pub fn run<'a>(&'a self, sources: &'a Sources) -> Result<RowStream<'a>> {
        let mut inputs = Vec::with_capacity(self.node.parents.len());
        for parent in &self.node.parents {
            inputs.push(parent.run(sources)?);
        }
        self.node.operation.apply(inputs, sources)
    }

    /// Executes the graph and collects the terminal stream.
    pub fn collect(&self, sources: &Sources) -> Result<Vec<Row>> {
        debug!("running graph to completion");
        self.run(sources)?.collect()
    }
}
