//! Operation DAG
//!
//! The graph handle owns the vertex store. Consumers register values and
//! operations through it and receive a [`LazyFuture`] for each.
//!
//! # Ownership
//!
//! The handle is the single owner of the store and is neither `Clone` nor
//! `Send`. Futures keep a non-owning back reference so that dropping one can
//! report its vertex for reclamation. A future dropped while the store is in
//! use (for example by an operation releasing state during `execute`) is
//! queued and applied on the next entry into the graph.

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::future::LazyFuture;
use crate::config::DagConfig;
use crate::error::{DagError, Result};
use crate::graph::{DagSnapshot, VertexId, VertexList, VertexStore};
use crate::operation::Operation;

/// State shared between a graph and its futures.
pub(crate) struct DagShared<T> {
    pub(crate) store: RefCell<VertexStore<T>>,
    /// Vertices whose futures were dropped while the store was borrowed.
    released: RefCell<Vec<VertexId>>,
}

impl<T> DagShared<T> {
    /// Run `f` with exclusive access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut VertexStore<T>) -> Result<R>) -> Result<R> {
        let mut store = self
            .store
            .try_borrow_mut()
            .map_err(|_| DagError::Reentrant)?;
        self.apply_released(&mut store);
        f(&mut store)
    }

    /// Report that the future for `id` was dropped.
    pub fn release(&self, id: VertexId) {
        match self.store.try_borrow_mut() {
            Ok(mut store) => {
                self.apply_released(&mut store);
                mark(&mut store, id);
            }
            Err(_) => self.released.borrow_mut().push(id),
        }
    }

    fn apply_released(&self, store: &mut VertexStore<T>) {
        let released = std::mem::take(&mut *self.released.borrow_mut());
        for id in released {
            mark(store, id);
        }
    }
}

fn mark<T>(store: &mut VertexStore<T>, id: VertexId) {
    if let Err(err) = store.mark_for_deletion(id) {
        warn!(vertex = %id, error = %err, "dag.reclaim.failed");
    }
}

/// A lazily evaluated operation graph over values of type `T`.
///
/// # Example
///
/// ```
/// use lazydag_core::{FnOperation, OperationDag};
///
/// let mut dag = OperationDag::<i64>::cloning();
/// let x = dag.add_value(5);
/// let y = dag.add_value(2);
/// let add = FnOperation::new("add", 2, |out: &mut i64, rest: &[&i64]| {
///     *out += *rest[0];
///     Ok(())
/// });
/// let mut sum = dag.add_operation(add, &[&x, &y]);
///
/// assert_eq!(*sum.get().unwrap(), 7);
/// ```
pub struct OperationDag<T> {
    shared: Rc<DagShared<T>>,
}

impl<T: 'static> OperationDag<T> {
    /// Create a graph with the default configuration.
    ///
    /// `allocator` produces a fresh empty value; `copier` deep-copies its
    /// second argument into its first.
    pub fn new<A, C>(allocator: A, copier: C) -> Self
    where
        A: Fn() -> T + 'static,
        C: Fn(&mut T, &T) + 'static,
    {
        Self::with_config(DagConfig::default(), allocator, copier)
    }

    /// Create a graph with an explicit configuration.
    pub fn with_config<A, C>(config: DagConfig, allocator: A, copier: C) -> Self
    where
        A: Fn() -> T + 'static,
        C: Fn(&mut T, &T) + 'static,
    {
        let store = VertexStore::new(config, Box::new(allocator), Box::new(copier));
        Self {
            shared: Rc::new(DagShared {
                store: RefCell::new(store),
                released: RefCell::new(Vec::new()),
            }),
        }
    }

    fn store_mut(&self) -> RefMut<'_, VertexStore<T>> {
        let mut store = self
            .shared
            .store
            .try_borrow_mut()
            .expect("graph is already in use; operations must not re-enter it");
        self.shared.apply_released(&mut store);
        store
    }

    fn future(&self, vertex: VertexId) -> LazyFuture<T> {
        LazyFuture::new(Rc::downgrade(&self.shared), vertex)
    }

    /// Register an existing value.
    pub fn add_value(&mut self, value: T) -> LazyFuture<T> {
        self.add_value_shared(Rc::new(value))
    }

    /// Register a value that is already shared elsewhere.
    pub fn add_value_shared(&mut self, value: Rc<T>) -> LazyFuture<T> {
        let id = self.store_mut().add_value(value);
        self.future(id)
    }

    /// Register `operation` over the values of `parents`.
    ///
    /// Nothing is computed until the returned future (or a descendant) is
    /// materialized.
    ///
    /// # Panics
    ///
    /// Panics if `parents.len()` differs from the operation's arity or a
    /// parent future belongs to another graph.
    pub fn add_operation<O>(&mut self, operation: O, parents: &[&LazyFuture<T>]) -> LazyFuture<T>
    where
        O: Operation<T> + 'static,
    {
        let ids: VertexList = parents
            .iter()
            .map(|future| {
                assert!(
                    future.belongs_to(&self.shared),
                    "future for vertex {} belongs to another graph",
                    future.vertex_id()
                );
                future.vertex_id()
            })
            .collect();
        let id = self.store_mut().add_operation(Box::new(operation), ids);
        self.future(id)
    }

    /// Materialize a vertex by id.
    pub fn materialize(&mut self, id: VertexId) -> Result<Rc<T>> {
        self.shared.with_store(|store| store.materialize(id))
    }

    /// Drop the strong hold a vertex has on its value. Value vertices keep
    /// theirs.
    pub fn uncache(&mut self, id: VertexId) -> Result<()> {
        self.shared.with_store(|store| store.uncache(id))
    }

    /// Remove every vertex that can be removed safely. Returns how many were
    /// removed.
    ///
    /// With `avoid_instantiation` unset, chains waiting on an uncomputed
    /// rescue point are resolved by computing it.
    pub fn cleanup(&mut self, avoid_instantiation: bool) -> Result<usize> {
        self.shared.with_store(|store| store.cleanup(avoid_instantiation))
    }

    /// Number of vertices in the registry.
    ///
    /// Like the other inspection methods, this first applies releases queued
    /// while the graph was in use.
    pub fn len(&self) -> usize {
        self.store_mut().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.store_mut().contains(id)
    }

    pub fn config(&self) -> DagConfig {
        *self.store_mut().config()
    }

    /// Current vertex/edge structure, for diagnostics.
    pub fn snapshot(&self) -> DagSnapshot {
        self.store_mut().snapshot()
    }

    /// Current structure as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        self.snapshot().to_dot()
    }
}

impl<T: Default + Clone + 'static> OperationDag<T> {
    /// Graph whose allocator is `T::default` and whose copier is `Clone`.
    pub fn cloning() -> Self {
        Self::cloning_with_config(DagConfig::default())
    }

    pub fn cloning_with_config(config: DagConfig) -> Self {
        Self::with_config(config, T::default, |dst: &mut T, src: &T| dst.clone_from(src))
    }
}

impl<T> fmt::Debug for OperationDag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("OperationDag");
        match self.shared.store.try_borrow() {
            Ok(store) => debug
                .field("vertices", &store.len())
                .field("config", store.config()),
            Err(_) => debug.field("vertices", &"<in use>"),
        };
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FnOperation;

    fn neg() -> FnOperation<i32> {
        FnOperation::new("neg", 1, |out: &mut i32, _: &[&i32]| {
            *out = -*out;
            Ok(())
        })
    }

    #[test]
    fn registration_is_lazy() {
        let mut dag = OperationDag::<i32>::cloning();
        let a = dag.add_value(4);
        let b = dag.add_operation(neg(), &[&a]);

        assert_eq!(dag.len(), 2);
        assert!(!b.is_available());
        assert_eq!(*dag.materialize(b.vertex_id()).unwrap(), -4);
    }

    #[test]
    #[should_panic(expected = "belongs to another graph")]
    fn foreign_futures_are_rejected() {
        let mut first = OperationDag::<i32>::cloning();
        let mut second = OperationDag::<i32>::cloning();
        let a = first.add_value(1);
        second.add_operation(neg(), &[&a]);
    }

    #[test]
    fn uncache_and_cleanup_by_id() {
        let mut dag = OperationDag::<i32>::cloning_with_config(DagConfig {
            reclaim_on_release: false,
            ..DagConfig::default()
        });
        let a = dag.add_value(1);
        let b = dag.add_operation(neg(), &[&a]);
        let b_id = b.vertex_id();

        drop(b);
        assert!(dag.contains(b_id));
        assert_eq!(dag.cleanup(true).unwrap(), 1);
        assert!(!dag.contains(b_id));

        assert!(matches!(dag.uncache(b_id), Err(DagError::UnknownVertex(_))));
        dag.uncache(a.vertex_id()).unwrap();
        assert!(a.is_available());
    }

    #[test]
    fn release_during_evaluation_is_deferred() {
        let mut dag = OperationDag::<i32>::cloning_with_config(DagConfig {
            reclaim_on_release: false,
            ..DagConfig::default()
        });
        let a = dag.add_value(1);
        let held = std::cell::RefCell::new(Some(dag.add_value(2)));
        let held_id = held.borrow().as_ref().map(LazyFuture::vertex_id).unwrap();

        let dropping = FnOperation::new("drop", 1, move |out: &mut i32, _: &[&i32]| {
            held.borrow_mut().take();
            *out += 10;
            Ok(())
        });
        let mut b = dag.add_operation(dropping, &[&a]);

        assert_eq!(*b.get().unwrap(), 11);
        // Queued while the store was borrowed, applied on the next look.
        assert!(dag.snapshot().vertices[held_id.raw()].to_delete);

        dag.cleanup(true).unwrap();
        assert!(!dag.contains(held_id));
    }

    #[test]
    fn queued_release_is_reclaimed_before_inspection() {
        let mut dag = OperationDag::<i32>::cloning();
        let a = dag.add_value(1);
        let held = std::cell::RefCell::new(Some(dag.add_value(2)));
        let held_id = held.borrow().as_ref().map(LazyFuture::vertex_id).unwrap();

        let dropping = FnOperation::new("drop", 1, move |out: &mut i32, _: &[&i32]| {
            held.borrow_mut().take();
            *out += 10;
            Ok(())
        });
        let mut b = dag.add_operation(dropping, &[&a]);

        assert_eq!(*b.get().unwrap(), 11);
        assert!(!dag.contains(held_id));
        assert_eq!(dag.len(), 2);
    }

    #[test]
    fn debug_reports_size() {
        let mut dag = OperationDag::<i32>::cloning();
        let _a = dag.add_value(1);
        assert!(format!("{dag:?}").contains("vertices: 1"));
    }
}
