//! Vertex Store
//!
//! The store is the registry behind a graph: a table of vertices indexed by
//! id, plus the two hooks the engines need to create and duplicate values of
//! an otherwise opaque type.
//!
//! Vertices live in a `Vec` slot per id. Ids are never reused, so a removed
//! vertex leaves an empty slot behind and adjacency is plain index lists.

use std::rc::Rc;

use tracing::debug;

use super::vertex::{Vertex, VertexId, VertexList};
use crate::config::DagConfig;
use crate::error::{DagError, Result};
use crate::operation::Operation;

/// Creates a fresh, empty value.
pub type Allocator<T> = Box<dyn Fn() -> T>;

/// Deep-copies the second argument into the first.
pub type Copier<T> = Box<dyn Fn(&mut T, &T)>;

/// The registry of all vertices in one graph.
pub(crate) struct VertexStore<T> {
    vertices: Vec<Option<Vertex<T>>>,
    len: usize,
    allocator: Allocator<T>,
    copier: Copier<T>,
    config: DagConfig,
}

impl<T> VertexStore<T> {
    pub fn new(config: DagConfig, allocator: Allocator<T>, copier: Copier<T>) -> Self {
        Self {
            vertices: Vec::new(),
            len: 0,
            allocator,
            copier,
            config,
        }
    }

    pub fn config(&self) -> &DagConfig {
        &self.config
    }

    /// Number of vertices currently in the registry.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: VertexId) -> Option<&Vertex<T>> {
        self.vertices.get(id.raw()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: VertexId) -> Option<&mut Vertex<T>> {
        self.vertices.get_mut(id.raw()).and_then(Option::as_mut)
    }

    pub fn vertex(&self, id: VertexId) -> Result<&Vertex<T>> {
        self.get(id).ok_or(DagError::UnknownVertex(id))
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Result<&mut Vertex<T>> {
        self.get_mut(id).ok_or(DagError::UnknownVertex(id))
    }

    /// Iterate over present vertices in increasing id order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &Vertex<T>)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (VertexId::from(i), v)))
    }

    /// Fresh instance from the allocator.
    pub fn allocate(&self) -> T {
        (self.allocator)()
    }

    /// Deep copy of `source` through the copier.
    pub fn duplicate(&self, source: &T) -> T {
        let mut copy = self.allocate();
        (self.copier)(&mut copy, source);
        copy
    }

    fn insert(&mut self, vertex: Vertex<T>) -> VertexId {
        let id = VertexId::from(self.vertices.len());
        self.vertices.push(Some(vertex));
        self.len += 1;
        id
    }

    /// Register an existing value as a value vertex.
    pub fn add_value(&mut self, value: Rc<T>) -> VertexId {
        let id = self.insert(Vertex::value(value));
        debug!(vertex = %id, "dag.register.value");
        id
    }

    /// Register `operation` over `parents`.
    ///
    /// # Panics
    ///
    /// Panics if the parent count does not match the operation's arity or a
    /// parent id is not in the registry.
    pub fn add_operation(
        &mut self,
        operation: Box<dyn Operation<T>>,
        parents: VertexList,
    ) -> VertexId {
        assert_eq!(
            parents.len(),
            operation.num_arguments(),
            "operation `{}` registered with the wrong number of parents",
            operation.name(),
        );
        for &parent in &parents {
            assert!(self.contains(parent), "parent vertex {parent} does not exist");
        }

        let name = operation.name().to_string();
        let id = self.insert(Vertex::operation(operation, parents.clone()));
        for parent in parents {
            if let Some(p) = self.get_mut(parent) {
                p.children.push(id);
            }
        }
        debug!(vertex = %id, operation = %name, "dag.register.operation");
        id
    }

    /// Remove a vertex, detaching it from its parents' child lists.
    ///
    /// The vertex's own children are not touched; callers only remove
    /// vertices whose children are already gone or are being removed with it.
    pub fn remove(&mut self, id: VertexId) -> Option<Vertex<T>> {
        let vertex = self.vertices.get_mut(id.raw())?.take()?;
        self.len -= 1;
        self.detach_from_parents(id, &vertex.parents);
        Some(vertex)
    }

    /// Drop one child listing of `id` from each of `parents`.
    pub fn detach_from_parents(&mut self, id: VertexId, parents: &[VertexId]) {
        for &parent in parents {
            if let Some(p) = self.get_mut(parent) {
                p.remove_child(id);
            }
        }
    }

    /// Release the strong hold an operation vertex has on its value.
    ///
    /// Value vertices always keep their value.
    pub fn uncache(&mut self, id: VertexId) -> Result<()> {
        let vertex = self.vertex_mut(id)?;
        if !vertex.is_value() {
            vertex.object.unpin();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FnOperation;
    use smallvec::smallvec;

    fn store() -> VertexStore<i32> {
        VertexStore::new(
            DagConfig::default(),
            Box::new(|| 0),
            Box::new(|dst: &mut i32, src: &i32| *dst = *src),
        )
    }

    fn op(arity: usize) -> Box<dyn Operation<i32>> {
        Box::new(FnOperation::new("op", arity, |_: &mut i32, _: &[&i32]| Ok(())))
    }

    #[test]
    fn ids_are_sequential() {
        let mut store = store();
        let a = store.add_value(Rc::new(1));
        let b = store.add_value(Rc::new(2));
        let c = store.add_operation(op(2), smallvec![a, b]);

        assert_eq!((a.raw(), b.raw(), c.raw()), (0, 1, 2));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn add_operation_links_children() {
        let mut store = store();
        let a = store.add_value(Rc::new(1));
        let b = store.add_operation(op(2), smallvec![a, a]);

        assert_eq!(store.get(a).unwrap().children.as_slice(), &[b, b]);
        assert_eq!(store.get(b).unwrap().parents.as_slice(), &[a, a]);
    }

    #[test]
    #[should_panic(expected = "wrong number of parents")]
    fn arity_mismatch_panics() {
        let mut store = store();
        let a = store.add_value(Rc::new(1));
        store.add_operation(op(2), smallvec![a]);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn unknown_parent_panics() {
        let mut store = store();
        store.add_operation(op(1), smallvec![VertexId::from(9)]);
    }

    #[test]
    fn remove_detaches_from_parents() {
        let mut store = store();
        let a = store.add_value(Rc::new(1));
        let b = store.add_operation(op(1), smallvec![a]);

        assert!(store.remove(b).is_some());
        assert!(!store.contains(b));
        assert!(store.get(a).unwrap().children.is_empty());
        assert_eq!(store.len(), 1);

        // Ids are never reused.
        let c = store.add_value(Rc::new(3));
        assert_eq!(c.raw(), 2);
    }

    #[test]
    fn duplicate_uses_copier() {
        let store = store();
        assert_eq!(store.duplicate(&42), 42);
    }

    #[test]
    fn uncache_keeps_value_vertices() {
        let mut store = store();
        let a = store.add_value(Rc::new(1));
        let b = store.add_operation(op(1), smallvec![a]);
        store.get_mut(b).unwrap().object.pin(Rc::new(2));

        store.uncache(a).unwrap();
        store.uncache(b).unwrap();

        assert!(store.get(a).unwrap().object.is_pinned());
        assert!(!store.get(b).unwrap().object.is_pinned());
        assert!(matches!(
            store.uncache(VertexId::from(7)),
            Err(DagError::UnknownVertex(_))
        ));
    }
}
