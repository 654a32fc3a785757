//! Graph Vertices
//!
//! This module defines the vertex record that lives in the vertex store and
//! the slot through which a vertex observes (and optionally retains) its
//! materialized value.

use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::operation::Operation;

/// Identifier of a vertex within one graph.
///
/// Ids are handed out in increasing order and a vertex can only name
/// existing vertices as parents, so every parent id is smaller than the ids
/// of its children. Sorting by id is therefore a topological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

impl VertexId {
    /// Get the raw ID value.
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl From<usize> for VertexId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Adjacency list. Arity is small for nearly every operation.
pub(crate) type VertexList = SmallVec<[VertexId; 4]>;

/// How a vertex currently relates to its value.
///
/// `Pinned` holds the value strongly; `Observed` only watches a value that
/// somebody else keeps alive. Because both live in one cell, a pinned value
/// and the value the vertex observes can never diverge.
pub(crate) enum ObjectSlot<T> {
    Empty,
    Observed(Weak<T>),
    Pinned(Rc<T>),
}

impl<T> ObjectSlot<T> {
    /// Strong handle to the value, if anyone still keeps it alive.
    pub fn upgrade(&self) -> Option<Rc<T>> {
        match self {
            ObjectSlot::Empty => None,
            ObjectSlot::Observed(weak) => weak.upgrade(),
            ObjectSlot::Pinned(rc) => Some(Rc::clone(rc)),
        }
    }

    pub fn is_live(&self) -> bool {
        match self {
            ObjectSlot::Empty => false,
            ObjectSlot::Observed(weak) => weak.strong_count() > 0,
            ObjectSlot::Pinned(_) => true,
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self, ObjectSlot::Pinned(_))
    }

    /// Start observing `value` without retaining it. A pinned slot keeps
    /// its pin.
    pub fn observe(&mut self, value: &Rc<T>) {
        if !self.is_pinned() {
            *self = ObjectSlot::Observed(Rc::downgrade(value));
        }
    }

    /// Retain `value` strongly.
    pub fn pin(&mut self, value: Rc<T>) {
        *self = ObjectSlot::Pinned(value);
    }

    /// Drop the strong hold but keep observing the value.
    pub fn unpin(&mut self) {
        if let ObjectSlot::Pinned(rc) = self {
            *self = ObjectSlot::Observed(Rc::downgrade(rc));
        }
    }

    /// Move the value out if this slot is its only holder.
    ///
    /// On success the slot is left empty. `Rc::try_unwrap` guarantees that
    /// nobody else can observe the move.
    pub fn steal(&mut self) -> Option<T> {
        match std::mem::replace(self, ObjectSlot::Empty) {
            ObjectSlot::Pinned(rc) => match Rc::try_unwrap(rc) {
                Ok(value) => Some(value),
                Err(rc) => {
                    *self = ObjectSlot::Pinned(rc);
                    None
                }
            },
            other => {
                *self = other;
                None
            }
        }
    }
}

/// A vertex in the graph.
///
/// A vertex without an operation is a *value vertex*: a leaf wrapping a
/// constant, which is always pinned. Everything else is an *operation
/// vertex* whose value is derived from its parents.
pub(crate) struct Vertex<T> {
    /// The operation computing this vertex, owned by it.
    pub operation: Option<Box<dyn Operation<T>>>,

    /// Parent ids in argument order. Duplicates are allowed when the same
    /// future is passed twice.
    pub parents: VertexList,

    /// Ids of vertices listing this one as a parent, once per listing.
    pub children: VertexList,

    pub object: ObjectSlot<T>,

    /// Set once the future for this vertex has been dropped.
    pub to_delete: bool,
}

impl<T> Vertex<T> {
    /// Create a value vertex holding `value`.
    pub fn value(value: Rc<T>) -> Self {
        Self {
            operation: None,
            parents: VertexList::new(),
            children: VertexList::new(),
            object: ObjectSlot::Pinned(value),
            to_delete: false,
        }
    }

    /// Create an operation vertex over `parents`.
    pub fn operation(operation: Box<dyn Operation<T>>, parents: VertexList) -> Self {
        Self {
            operation: Some(operation),
            parents,
            children: VertexList::new(),
            object: ObjectSlot::Empty,
            to_delete: false,
        }
    }

    pub fn is_value(&self) -> bool {
        self.operation.is_none()
    }

    /// More than one consumer reads this vertex.
    pub fn is_branch_point(&self) -> bool {
        self.children.len() >= 2
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation.as_deref().map(|op| op.name())
    }

    /// Remove one listing of `child`.
    pub fn remove_child(&mut self, child: VertexId) {
        if let Some(pos) = self.children.iter().position(|&c| c == child) {
            self.children.remove(pos);
        }
    }

    /// Turn this vertex into a value vertex retaining `value`.
    ///
    /// The caller is responsible for unlinking it from its former parents.
    pub fn freeze(&mut self, value: Rc<T>) -> VertexList {
        self.operation = None;
        self.object.pin(value);
        std::mem::take(&mut self.parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FnOperation;

    fn noop() -> Box<dyn Operation<i32>> {
        Box::new(FnOperation::new("noop", 0, |_: &mut i32, _: &[&i32]| Ok(())))
    }

    #[test]
    fn vertex_ids_order_by_creation() {
        let first = VertexId::from(1);
        let second = VertexId::from(2);
        assert!(first < second);
        assert_eq!(second.raw(), 2);
        assert_eq!(second.to_string(), "2");
    }

    #[test]
    fn value_vertex_starts_pinned() {
        let vertex = Vertex::value(Rc::new(5));
        assert!(vertex.is_value());
        assert!(vertex.object.is_pinned());
        assert_eq!(vertex.object.upgrade().as_deref(), Some(&5));
    }

    #[test]
    fn operation_vertex_starts_empty() {
        let vertex = Vertex::operation(noop(), VertexList::new());
        assert!(!vertex.is_value());
        assert!(!vertex.object.is_live());
        assert_eq!(vertex.operation_name(), Some("noop"));
    }

    #[test]
    fn observed_slot_follows_holder() {
        let mut slot = ObjectSlot::Empty;
        let value = Rc::new(7);

        slot.observe(&value);
        assert!(slot.is_live());
        assert!(!slot.is_pinned());

        drop(value);
        assert!(!slot.is_live());
        assert!(slot.upgrade().is_none());
    }

    #[test]
    fn observe_keeps_existing_pin() {
        let mut slot = ObjectSlot::Pinned(Rc::new(1));
        slot.observe(&Rc::new(2));
        assert_eq!(slot.upgrade().as_deref(), Some(&1));
    }

    #[test]
    fn unpin_downgrades_to_observation() {
        let value = Rc::new(3);
        let mut slot = ObjectSlot::Empty;
        slot.pin(Rc::clone(&value));

        slot.unpin();
        assert!(!slot.is_pinned());
        assert!(slot.is_live());

        drop(value);
        assert!(!slot.is_live());
    }

    #[test]
    fn steal_only_when_unique() {
        let shared = Rc::new(vec![1, 2, 3]);
        let mut slot = ObjectSlot::Pinned(Rc::clone(&shared));

        assert!(slot.steal().is_none());
        assert!(slot.is_pinned());

        drop(shared);
        assert_eq!(slot.steal(), Some(vec![1, 2, 3]));
        assert!(!slot.is_live());
    }

    #[test]
    fn steal_ignores_observed_values() {
        let value = Rc::new(9);
        let mut slot = ObjectSlot::Empty;
        slot.observe(&value);
        assert!(slot.steal().is_none());
        assert!(slot.is_live());
    }

    #[test]
    fn child_removal_drops_one_listing() {
        let mut vertex = Vertex::value(Rc::new(0));
        let child = VertexId::from(4);
        vertex.children.push(child);
        vertex.children.push(child);

        vertex.remove_child(child);
        assert_eq!(vertex.children.as_slice(), &[child]);
    }

    #[test]
    fn freeze_converts_to_value_vertex() {
        let mut parents = VertexList::new();
        parents.push(VertexId::from(0));
        let mut vertex = Vertex::operation(noop(), parents);

        let former = vertex.freeze(Rc::new(11));
        assert_eq!(former.as_slice(), &[VertexId::from(0)]);
        assert!(vertex.is_value());
        assert!(vertex.parents.is_empty());
        assert!(vertex.object.is_pinned());
    }
}
