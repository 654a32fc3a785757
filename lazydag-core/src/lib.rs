//! LazyDAG Core
//!
//! This crate provides a lazy evaluation graph with memoized results.
//! It implements:
//!
//! - Registration of values and operations as vertices of a DAG
//! - Demand-driven evaluation with shared-ancestor detection
//! - Reference-counted caching, with a move-instead-of-copy fast path for
//!   values nobody else holds
//! - Incremental reclamation of vertices whose futures were dropped
//!
//! The value type is opaque to the graph: the host supplies an allocator
//! and a copier when creating it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `lazy`: The graph handle and the futures consumers hold
//! - `graph`: Vertex store, evaluation engine and deletion engine
//! - `operation`: The operation trait and a closure-backed implementation
//! - `config`: Graph settings
//!
//! # Example
//!
//! ```rust
//! use lazydag_core::{FnOperation, OperationDag};
//!
//! let mut dag = OperationDag::<i64>::cloning();
//!
//! let x = dag.add_value(5);
//! let y = dag.add_value(2);
//! let add = FnOperation::new("add", 2, |out: &mut i64, rest: &[&i64]| {
//!     *out += *rest[0];
//!     Ok(())
//! });
//! let inc = FnOperation::new("increment", 1, |out: &mut i64, _: &[&i64]| {
//!     *out += 1;
//!     Ok(())
//! });
//!
//! let sum = dag.add_operation(add, &[&x, &y]);
//! let mut total = dag.add_operation(inc, &[&sum]);
//! assert_eq!(*total.get().unwrap(), 8);
//!
//! // The intermediate is no longer needed by anyone but `total`.
//! drop(sum);
//! assert_eq!(*total.get().unwrap(), 8);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod lazy;
pub mod operation;

pub use config::DagConfig;
pub use error::{DagError, OperationError, Result};
pub use graph::{DagSnapshot, VertexId, VertexSnapshot};
pub use lazy::{LazyFuture, OperationDag};
pub use operation::{FnOperation, Operation};
