//! Operation Graph
//!
//! This module implements the vertex store and the engines that evaluate and
//! reclaim it.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Value vertices wrap pre-existing values and have no parents
//! - Operation vertices apply an operation to the values of their parents
//! - Edges point from parent to child: if B is computed from A, there is an
//!   edge from A to B
//!
//! A vertex can only name vertices that already exist as parents, so the
//! graph cannot contain a cycle and creation order is a topological order.
//!
//! # Design Decisions
//!
//! 1. Vertices live in a table indexed by id, and adjacency is stored as id
//!    lists in both directions. Removing a vertex means emptying its slot and
//!    patching the lists of its neighbours.
//!
//! 2. A vertex never owns its value outright. It observes it weakly, and
//!    pins it only when the value must outlive its consumers. Value vertices
//!    are always pinned.
//!
//! 3. The store is plain mutable data without locks. Exclusive access is
//!    provided by the [`OperationDag`](crate::OperationDag) that owns it.

mod evaluate;
mod export;
mod reclaim;
mod store;
mod vertex;

pub use export::{DagSnapshot, VertexSnapshot};
pub(crate) use store::VertexStore;
pub use vertex::VertexId;
pub(crate) use vertex::VertexList;
