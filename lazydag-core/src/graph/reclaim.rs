//! Deletion Engine
//!
//! Vertices whose futures were dropped are marked, then removed once doing
//! so cannot hurt anyone still holding a future.
//!
//! # Algorithm
//!
//! Marked vertices are visited in decreasing id order, so children are
//! examined before their parents and a removal can make a parent removable
//! within the same pass. For each marked vertex:
//!
//! - **No children**: nothing depends on it. Remove it.
//! - **One child, no parents**: the root of a chain. Follow single children
//!   forward while they are marked and have exactly one child. The first
//!   vertex that breaks the pattern is the *rescue point*: it must stay
//!   computable after the chain is gone, so its value is pinned and the
//!   vertex becomes a value vertex. The chain above it is then removed.
//!   If the rescue point has no value and instantiation is to be avoided,
//!   nothing happens and the chain is retried later. A walk that ends on a
//!   marked leaf (one a rescue earlier in the pass cut loose) takes the
//!   leaf with it instead.
//! - **Anything else**: left alone until its children go away.
//!
//! Passes repeat while they make progress.

use tracing::debug;

use super::store::VertexStore;
use super::vertex::VertexId;
use crate::error::Result;

impl<T> VertexStore<T> {
    /// Mark the vertex behind a dropped future. Unknown ids are ignored.
    pub fn mark_for_deletion(&mut self, id: VertexId) -> Result<()> {
        let Some(vertex) = self.get_mut(id) else {
            return Ok(());
        };
        vertex.to_delete = true;
        debug!(vertex = %id, "dag.reclaim.mark");

        if self.config().reclaim_on_release {
            self.cleanup(true)?;
        }
        Ok(())
    }

    /// Remove every marked vertex that can be removed safely.
    ///
    /// With `avoid_instantiation` set, chains whose rescue point has no
    /// value are skipped instead of computed. Returns the number of
    /// vertices removed.
    pub fn cleanup(&mut self, avoid_instantiation: bool) -> Result<usize> {
        let before = self.len();
        loop {
            let len = self.len();
            let marked: Vec<VertexId> = self
                .iter()
                .filter(|(_, vertex)| vertex.to_delete)
                .map(|(id, _)| id)
                .collect();

            for id in marked.into_iter().rev() {
                if self.contains(id) {
                    self.delete_vertex(id, avoid_instantiation)?;
                }
            }

            if self.len() == len {
                break;
            }
        }
        Ok(before - self.len())
    }

    /// Try to remove one marked vertex, along with the chain it roots.
    fn delete_vertex(&mut self, id: VertexId, avoid_instantiation: bool) -> Result<()> {
        let vertex = self.vertex(id)?;
        match (vertex.children.len(), vertex.parents.len()) {
            (0, _) => {
                self.remove(id);
                debug!(vertex = %id, "dag.reclaim.leaf");
                Ok(())
            }
            (1, 0) => self.delete_chain(id, avoid_instantiation),
            _ => Ok(()),
        }
    }

    fn delete_chain(&mut self, root: VertexId, avoid_instantiation: bool) -> Result<()> {
        let mut chain = vec![root];
        let mut current = root;
        let end = loop {
            let next = self.vertex(current)?.children[0];
            let vertex = self.vertex(next)?;
            if vertex.to_delete && vertex.children.len() == 1 {
                chain.push(next);
                current = next;
            } else {
                break next;
            }
        };

        let end_vertex = self.vertex(end)?;
        if end_vertex.to_delete && end_vertex.children.is_empty() {
            chain.push(end);
        } else {
            let value = match end_vertex.object.upgrade() {
                Some(value) => value,
                None if avoid_instantiation => {
                    debug!(root = %root, rescue = %end, "dag.reclaim.deferred");
                    return Ok(());
                }
                None => self.materialize(end)?,
            };
            let former_parents = self.vertex_mut(end)?.freeze(value);
            self.detach_from_parents(end, &former_parents);
            debug!(root = %root, rescue = %end, "dag.reclaim.rescue");
        }

        for &id in chain.iter().rev() {
            self.remove(id);
        }
        debug!(root = %root, removed = chain.len(), "dag.reclaim.chain");
        Ok(())
    }
}
