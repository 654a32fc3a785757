//! Diagnostic export of the graph structure.
//!
//! Snapshots are plain data, detached from the graph, for external tooling.

use std::fmt::Write as _;

use serde::Serialize;

use super::store::VertexStore;
use super::vertex::VertexId;

/// One vertex as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VertexSnapshot {
    pub id: usize,
    /// Operation name, `None` for value vertices.
    pub operation: Option<String>,
    pub parents: Vec<usize>,
    pub children: Vec<usize>,
    /// A value is alive and reusable without computation.
    pub available: bool,
    /// The vertex holds its value strongly.
    pub pinned: bool,
    pub to_delete: bool,
}

/// The vertex/edge structure of a graph at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DagSnapshot {
    pub vertices: Vec<VertexSnapshot>,
}

impl DagSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render as a Graphviz digraph.
    ///
    /// Available vertices are filled, marked vertices are dashed.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph lazydag {\n");
        for vertex in &self.vertices {
            let label = match &vertex.operation {
                Some(name) => format!("{}: {}", vertex.id, name.replace('"', "\\\"")),
                None => format!("{}: value", vertex.id),
            };
            let mut style = Vec::new();
            if vertex.available {
                style.push("filled");
            }
            if vertex.to_delete {
                style.push("dashed");
            }
            let _ = writeln!(
                out,
                "  v{} [label=\"{}\", style=\"{}\"];",
                vertex.id,
                label,
                style.join(",")
            );
        }
        for vertex in &self.vertices {
            for parent in &vertex.parents {
                let _ = writeln!(out, "  v{} -> v{};", parent, vertex.id);
            }
        }
        out.push_str("}\n");
        out
    }
}

impl<T> VertexStore<T> {
    pub fn snapshot(&self) -> DagSnapshot {
        let ids = |list: &[VertexId]| -> Vec<usize> { list.iter().map(VertexId::raw).collect() };
        DagSnapshot {
            vertices: self
                .iter()
                .map(|(id, vertex)| VertexSnapshot {
                    id: id.raw(),
                    operation: vertex.operation_name().map(str::to_string),
                    parents: ids(vertex.parents.as_slice()),
                    children: ids(vertex.children.as_slice()),
                    available: vertex.object.is_live(),
                    pinned: vertex.object.is_pinned(),
                    to_delete: vertex.to_delete,
                })
                .collect(),
        }
    }
}
