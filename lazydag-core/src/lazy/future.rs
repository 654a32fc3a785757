//! Lazy Futures
//!
//! A future is the consumer's handle on one vertex. It computes the vertex
//! on first access and keeps the result, so repeated access costs nothing.
//!
//! Dropping a future tells the graph the vertex is no longer wanted. The
//! graph may then reclaim it (and ancestors nobody else needs), but dropping
//! never forces a computation on its own.

use std::fmt;
use std::rc::{Rc, Weak};

use super::dag::DagShared;
use crate::error::{DagError, Result};
use crate::graph::VertexId;

/// Handle to a vertex of an [`OperationDag`](crate::OperationDag).
///
/// Futures are not `Clone`: each one stands for a single claim on its
/// vertex, released when it is dropped.
pub struct LazyFuture<T> {
    dag: Weak<DagShared<T>>,
    vertex: VertexId,
    /// Last value this future materialized.
    value: Option<Rc<T>>,
}

impl<T> LazyFuture<T> {
    pub(crate) fn new(dag: Weak<DagShared<T>>, vertex: VertexId) -> Self {
        Self {
            dag,
            vertex,
            value: None,
        }
    }

    pub(crate) fn belongs_to(&self, dag: &Rc<DagShared<T>>) -> bool {
        std::ptr::eq(self.dag.as_ptr(), Rc::as_ptr(dag))
    }

    /// The vertex this future refers to.
    pub fn vertex_id(&self) -> VertexId {
        self.vertex
    }

    /// The value of the vertex, computing it if needed.
    ///
    /// After the first success the value is kept by the future and handed
    /// out again without consulting the graph.
    pub fn get(&mut self) -> Result<Rc<T>> {
        if let Some(value) = &self.value {
            return Ok(Rc::clone(value));
        }

        let dag = self.dag.upgrade().ok_or(DagError::GraphDropped)?;
        let vertex = self.vertex;
        let value = dag.with_store(|store| store.materialize(vertex))?;
        self.value = Some(Rc::clone(&value));
        Ok(value)
    }

    /// Compute the value now and keep it, without handing it out.
    pub fn materialize(&mut self) -> Result<()> {
        self.get().map(drop)
    }

    /// Whether the value can be obtained without computation.
    pub fn is_available(&self) -> bool {
        if self.value.is_some() {
            return true;
        }
        let Some(dag) = self.dag.upgrade() else {
            return false;
        };
        let available = match dag.store.try_borrow() {
            Ok(store) => store
                .get(self.vertex)
                .is_some_and(|vertex| vertex.object.is_live()),
            Err(_) => false,
        };
        available
    }

    /// Forget the locally kept value.
    ///
    /// The graph may still hold it; otherwise the next [`get`](Self::get)
    /// recomputes it.
    pub fn reset(&mut self) {
        self.value = None;
    }
}

impl<T> Drop for LazyFuture<T> {
    fn drop(&mut self) {
        // The local value is still alive here, so a chain rescue can pin it
        // instead of recomputing.
        if let Some(dag) = self.dag.upgrade() {
            dag.release(self.vertex);
        }
    }
}

impl<T> fmt::Debug for LazyFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFuture")
            .field("vertex", &self.vertex)
            .field("has_value", &self.value.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::OperationDag;
    use crate::operation::FnOperation;
    use std::cell::Cell;

    fn double(calls: &Rc<Cell<usize>>) -> FnOperation<u32> {
        let calls = Rc::clone(calls);
        FnOperation::new("double", 1, move |out: &mut u32, _: &[&u32]| {
            calls.set(calls.get() + 1);
            *out *= 2;
            Ok(())
        })
    }

    #[test]
    fn get_caches_locally() {
        let mut dag = OperationDag::<u32>::cloning();
        let calls = Rc::new(Cell::new(0));
        let a = dag.add_value(3);
        let mut b = dag.add_operation(double(&calls), &[&a]);

        assert!(!b.is_available());
        let first = b.get().unwrap();
        assert!(b.is_available());
        let second = b.get().unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(*second, 6);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reset_forces_recomputation() {
        let mut dag = OperationDag::<u32>::cloning();
        let calls = Rc::new(Cell::new(0));
        let a = dag.add_value(3);
        let mut b = dag.add_operation(double(&calls), &[&a]);

        b.materialize().unwrap();
        b.reset();
        assert!(!b.is_available());

        assert_eq!(*b.get().unwrap(), 6);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn survives_graph_with_local_value() {
        let mut dag = OperationDag::<u32>::cloning();
        let calls = Rc::new(Cell::new(0));
        let a = dag.add_value(3);
        let mut b = dag.add_operation(double(&calls), &[&a]);
        let mut c = dag.add_operation(double(&calls), &[&a]);

        b.materialize().unwrap();
        drop(dag);

        assert_eq!(*b.get().unwrap(), 6);
        assert!(matches!(c.get(), Err(DagError::GraphDropped)));
        assert!(!c.is_available());
    }

    #[test]
    fn drop_marks_vertex() {
        let mut dag = OperationDag::<u32>::cloning_with_config(crate::DagConfig {
            reclaim_on_release: false,
            ..crate::DagConfig::default()
        });
        let a = dag.add_value(3);
        let id = a.vertex_id();

        drop(a);
        let snapshot = dag.snapshot();
        assert!(snapshot.vertices[id.raw()].to_delete);
    }

    #[test]
    fn debug_hides_value() {
        let mut dag = OperationDag::<u32>::cloning();
        let a = dag.add_value(3);
        assert_eq!(
            format!("{a:?}"),
            "LazyFuture { vertex: VertexId(0), has_value: false }"
        );
    }
}
