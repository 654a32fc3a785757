//! Evaluation Engine
//!
//! Materializing a vertex computes it from the nearest available values,
//! caching along the way so shared work is done once.
//!
//! # Algorithm
//!
//! 1. If the vertex's value is still alive somewhere, hand it out directly.
//! 2. Walk the ancestors backwards in decreasing id order, counting how many
//!    edges from the explored region reach each one. Walking stops at
//!    vertices whose value is alive. Because parents always have smaller ids
//!    than their children, every edge into a vertex has been counted by the
//!    time it is popped, so one pass is enough.
//! 3. Ancestors reached by two or more edges are *branch ancestors*. Each is
//!    materialized (smallest id first) and pinned before the main descent,
//!    so the second path into it finds it cached.
//! 4. Descend from the target. Parent 0 is requested as an owned copy, since
//!    the operation mutates it into the result; the other parents are
//!    requested as shared read-only values. The descent keeps its own frame
//!    stack, so chain length is not limited by the thread's stack.
//! 5. Observe the result from the vertex's slot and return it.
//!
//! Independently of the target, a vertex with two or more children is a
//! *branch point*: whatever it computes is pinned, so a later evaluation of
//! a sibling consumer finds it instead of recomputing. An owned request only
//! steals the pin once every other child already has its value; until then
//! it gets a copy.
//!
//! Slots are only written after the computation for that vertex returned
//! successfully, so a failing operation leaves everything that already
//! completed cached and everything downstream of it uncached. The one value
//! a failure can take with it is a pin stolen by the failing operation
//! itself, which only happens once no other consumer needs it.

use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use tracing::{debug, trace};

use super::store::VertexStore;
use super::vertex::{VertexId, VertexList};
use crate::error::{DagError, Result};

/// Ancestors that need pinning before a descent, plus strong holds on values
/// that must survive the descent.
struct BranchPlan<T> {
    branches: Vec<VertexId>,
    holds: Vec<Rc<T>>,
}

/// A value handed to the vertex that asked for it.
enum Evaluated<T> {
    /// Parent 0: an instance the requester mutates into its result.
    Owned(T),
    Shared(Rc<T>),
}

impl<T> Evaluated<T> {
    fn into_shared(self) -> Rc<T> {
        match self {
            Evaluated::Owned(value) => Rc::new(value),
            Evaluated::Shared(value) => value,
        }
    }
}

/// A vertex whose parents are being gathered.
struct Frame<T> {
    id: VertexId,
    /// The child that asked for an owned instance, `None` for a shared
    /// request.
    owned_by: Option<VertexId>,
    parents: VertexList,
    output: Option<T>,
    inputs: Vec<Rc<T>>,
    next: usize,
}

impl<T> Frame<T> {
    fn deliver(&mut self, value: Evaluated<T>) {
        match value {
            Evaluated::Owned(value) => self.output = Some(value),
            Evaluated::Shared(value) => self.inputs.push(value),
        }
        self.next += 1;
    }

    /// Next parent to evaluate and how to request it.
    fn pending(&self) -> Option<(VertexId, Option<VertexId>)> {
        let parent = *self.parents.get(self.next)?;
        Some((parent, (self.next == 0).then_some(self.id)))
    }
}

impl<T> VertexStore<T> {
    /// Materialize `id` and return a strong handle to its value.
    pub fn materialize(&mut self, id: VertexId) -> Result<Rc<T>> {
        if let Some(value) = self.vertex(id)?.object.upgrade() {
            return Ok(value);
        }

        let BranchPlan { branches, mut holds } = self.branch_ancestors(id)?;
        for ancestor in branches {
            debug!(vertex = %id, ancestor = %ancestor, "dag.materialize.branch");
            let value = self.materialize(ancestor)?;
            self.vertex_mut(ancestor)?.object.pin(Rc::clone(&value));
            holds.push(value);
        }

        let value = self.evaluate(id, None)?.into_shared();
        drop(holds);
        Ok(value)
    }

    /// Find the ancestors of `target` reached along two or more edges.
    ///
    /// Alive ancestors bound the search. An alive ancestor reached twice is
    /// held for the duration of the descent so that the first visit cannot
    /// steal it from under the second.
    fn branch_ancestors(&self, target: VertexId) -> Result<BranchPlan<T>> {
        let mut reached: HashMap<VertexId, usize> = HashMap::new();
        let mut queue = BinaryHeap::new();
        let mut plan = BranchPlan {
            branches: Vec::new(),
            holds: Vec::new(),
        };

        queue.push(target);
        while let Some(current) = queue.pop() {
            let vertex = self.vertex(current)?;

            if current != target {
                let edges = reached.get(&current).copied().unwrap_or(0);
                if let Some(value) = vertex.object.upgrade() {
                    if edges >= 2 {
                        plan.holds.push(value);
                    }
                    continue;
                }
                if edges >= 2 {
                    plan.branches.push(current);
                }
            }

            for &parent in &vertex.parents {
                let edges = reached.entry(parent).or_insert(0);
                if *edges == 0 {
                    queue.push(parent);
                }
                *edges += 1;
            }
        }

        // Discovered in decreasing id order; ancestors go first.
        plan.branches.reverse();
        Ok(plan)
    }

    /// Evaluate `id` for `owned_by` (or as a shared value), computing every
    /// missing ancestor in preorder.
    fn evaluate(&mut self, id: VertexId, owned_by: Option<VertexId>) -> Result<Evaluated<T>> {
        if let Some(value) = self.reuse(id, owned_by)? {
            return Ok(value);
        }

        let mut stack = vec![self.frame(id, owned_by)?];
        loop {
            let frame = stack.last_mut().expect("the target frame is popped last");
            if let Some((parent, owned_by)) = frame.pending() {
                match self.reuse(parent, owned_by)? {
                    Some(value) => frame.deliver(value),
                    None => stack.push(self.frame(parent, owned_by)?),
                }
                continue;
            }

            let frame = stack.pop().expect("the target frame is popped last");
            let value = self.compute(frame)?;
            match stack.last_mut() {
                Some(child) => child.deliver(value),
                None => return Ok(value),
            }
        }
    }

    fn frame(&self, id: VertexId, owned_by: Option<VertexId>) -> Result<Frame<T>> {
        let parents = self.vertex(id)?.parents.clone();
        Ok(Frame {
            id,
            owned_by,
            inputs: Vec::with_capacity(parents.len().saturating_sub(1)),
            parents,
            output: None,
            next: 0,
        })
    }

    /// A value for `id` that needs no computation, if there is one.
    ///
    /// An owned request steals the cached value when stealing is allowed and
    /// the pin is its only holder; otherwise it deep-copies. Value vertices
    /// are always copied.
    fn reuse(
        &mut self,
        id: VertexId,
        owned_by: Option<VertexId>,
    ) -> Result<Option<Evaluated<T>>> {
        let Some(requester) = owned_by else {
            return Ok(self.vertex(id)?.object.upgrade().map(Evaluated::Shared));
        };

        if self.may_steal(id, requester)? {
            if let Some(value) = self.vertex_mut(id)?.object.steal() {
                trace!(vertex = %id, requester = %requester, "dag.evaluate.steal");
                return Ok(Some(Evaluated::Owned(value)));
            }
        }

        match self.vertex(id)?.object.upgrade() {
            Some(value) => {
                trace!(vertex = %id, requester = %requester, "dag.evaluate.copy");
                Ok(Some(Evaluated::Owned(self.duplicate(&value))))
            }
            None => Ok(None),
        }
    }

    /// Whether `requester` may take the cached value of `id` away.
    ///
    /// Every other child must already hold its own value, or it would have
    /// to recompute `id` later.
    fn may_steal(&self, id: VertexId, requester: VertexId) -> Result<bool> {
        let vertex = self.vertex(id)?;
        if !self.config().steal_unique || vertex.is_value() {
            return Ok(false);
        }
        Ok(vertex
            .children
            .iter()
            .filter(|&&child| child != requester)
            .all(|&child| self.get(child).is_some_and(|c| c.object.is_live())))
    }

    /// Run the operation of a frame whose parents are all gathered, and
    /// cache the result.
    ///
    /// A value computed for an owned request is about to be mutated into a
    /// child's result, so the vertex does not observe it. Branch points keep
    /// the computed value pinned and hand out a copy instead.
    fn compute(&mut self, frame: Frame<T>) -> Result<Evaluated<T>> {
        let Frame {
            id,
            owned_by,
            output,
            inputs,
            ..
        } = frame;
        let mut output = match output {
            Some(output) => output,
            None => self.allocate(),
        };

        let vertex = self.vertex(id)?;
        let operation = vertex.operation.as_deref().ok_or(DagError::LostValue(id))?;
        let inputs: Vec<&T> = inputs.iter().map(Rc::as_ref).collect();

        trace!(vertex = %id, operation = operation.name(), "dag.evaluate.execute");
        operation
            .execute(&mut output, &inputs)
            .map_err(|source| DagError::OperationFailed {
                vertex: id,
                operation: operation.name().to_string(),
                source,
            })?;

        let branch_point = vertex.is_branch_point();
        match (owned_by, branch_point) {
            (Some(_), false) => Ok(Evaluated::Owned(output)),
            (Some(_), true) => {
                let copy = self.duplicate(&output);
                self.vertex_mut(id)?.object.pin(Rc::new(output));
                Ok(Evaluated::Owned(copy))
            }
            (None, _) => {
                let value = Rc::new(output);
                let slot = &mut self.vertex_mut(id)?.object;
                if branch_point {
                    slot.pin(Rc::clone(&value));
                } else {
                    slot.observe(&value);
                }
                Ok(Evaluated::Shared(value))
            }
        }
    }
}
