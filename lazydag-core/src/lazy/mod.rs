//! Consumer Handles
//!
//! This module holds the public face of the graph: the [`OperationDag`]
//! that owns the vertex store, and the [`LazyFuture`]s handed out for each
//! registered vertex.
//!
//! # Concepts
//!
//! ## Registration
//!
//! Registering a value or an operation only records structure. An operation
//! vertex names the futures whose values it consumes, in argument order.
//!
//! ## Materialization
//!
//! Asking a future for its value computes whatever is missing between the
//! vertex and the nearest available values. Results shared by several
//! consumers are computed once.
//!
//! ## Release
//!
//! Dropping a future marks its vertex. The graph reclaims marked vertices as
//! soon as no surviving future can need them, keeping the values a survivor
//! needs instead of the chain that produced them.
//!
//! # Threading
//!
//! A graph and its futures are `!Send`: every access happens on the thread
//! that created the graph. Values returned by `get` can be shared further as
//! the host sees fit.

mod dag;
mod future;

pub use dag::OperationDag;
pub use future::LazyFuture;
