//! Operations
//!
//! An operation is the unit of work attached to an operation vertex. The
//! graph hands it its inputs in a fixed shape:
//!
//! - `output` arrives already initialized. For a vertex with parents it is a
//!   disposable copy of the first parent's value, so reduction-style
//!   operations can accumulate into it without allocating a second buffer.
//!   For a vertex without parents it is a freshly allocated instance.
//! - `parents` holds read-only views of the remaining parents (parent 1
//!   onwards), in registration order.
//!
//! Operations must be deterministic: a failed evaluation can be retried, and
//! the retry re-invokes every operation that did not complete.

use std::fmt;

use crate::error::OperationError;

/// A computation with a fixed number of inputs.
pub trait Operation<T> {
    /// Number of parent futures this operation must be registered with.
    fn num_arguments(&self) -> usize;

    /// Compute the vertex value into `output`.
    fn execute(&self, output: &mut T, parents: &[&T]) -> Result<(), OperationError>;

    /// Human-readable name used in logs, errors and graph dumps.
    fn name(&self) -> &str {
        "operation"
    }
}

type ExecuteFn<T> = dyn Fn(&mut T, &[&T]) -> Result<(), OperationError>;

/// An operation backed by a closure.
///
/// ```
/// use lazydag_core::FnOperation;
///
/// let add = FnOperation::new("add", 2, |out: &mut i64, rest: &[&i64]| {
///     *out += *rest[0];
///     Ok(())
/// });
/// # let _ = add;
/// ```
pub struct FnOperation<T> {
    name: String,
    arity: usize,
    execute: Box<ExecuteFn<T>>,
}

impl<T> FnOperation<T> {
    /// Create an operation named `name` taking `arity` parents.
    pub fn new<F>(name: impl Into<String>, arity: usize, execute: F) -> Self
    where
        F: Fn(&mut T, &[&T]) -> Result<(), OperationError> + 'static,
    {
        Self {
            name: name.into(),
            arity,
            execute: Box::new(execute),
        }
    }
}

impl<T> Operation<T> for FnOperation<T> {
    fn num_arguments(&self) -> usize {
        self.arity
    }

    fn execute(&self, output: &mut T, parents: &[&T]) -> Result<(), OperationError> {
        (self.execute)(output, parents)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T> fmt::Debug for FnOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
