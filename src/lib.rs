//! Tablestream is a declarative computational-graph engine for streams of
//! tabular records.
//!
//! Programs are written in a collection-oriented style: starting from one
//! or more sources, a pipeline of `map`, `reduce`, `sort` and `join` steps
//! is composed into an immutable [`Graph`]. Composition never executes
//! anything; running the graph against a set of named [`Sources`] produces
//! a lazy stream of [`Row`]s, and work happens only as that stream is
//! pulled, one row at a time.
//!
//! The engine is single-threaded and cooperative. Sort is a stable
//! external sort that spills to temporary files when its input exceeds a
//! configured buffer, so pipelines keep bounded memory on inputs larger
//! than RAM. Reduce and Join consume key-sorted streams and verify the
//! ordering as they group, failing fast when an upstream forgot to sort.
//!
//! # Examples
//!
//! ```
//! use tablestream::operators::{Count, LowerCase, Split};
//! use tablestream::{row, Graph, Sources};
//!
//! let graph = Graph::from_named_source("docs")
//!     .map(LowerCase::new("text"))
//!     .map(Split::whitespace("text"))
//!     .sort(&["text"])
//!     .reduce(Count::new("count"), &["text"]);
//!
//! let sources = Sources::new().rows(
//!     "docs",
//!     vec![row! { "text" => "Flows and flows" }],
//! );
//!
//! let counted = graph.collect(&sources).unwrap();
//! assert_eq!(
//!     counted,
//!     vec![
//!         row! { "text" => "and", "count" => 1 },
//!         row! { "text" => "flows", "count" => 2 },
//!     ]
//! );
//! ```
//!
//! Because graphs are immutable and cheaply cloneable, a common prefix
//! can feed several divergent pipelines, and the same graph can be re-run
//! against fresh sources; each run owns its own streams, file handles and
//! spill files.

#![forbid(missing_docs)]

pub mod algorithms;
pub mod error;
pub mod graph;
pub mod groupby;
pub mod operators;
pub mod row;

pub use error::{Error, Result};
pub use graph::{Graph, Sources};
pub use row::{KeyTuple, Row, Value};
