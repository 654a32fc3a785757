//! Graph Configuration
//!
//! Knobs that change how the graph trades memory for recomputation. Every
//! field has a default, so a host can supply a partial JSON document.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for an [`OperationDag`](crate::OperationDag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DagConfig {
    /// Move a cached value out instead of copying it when the cache is its
    /// only holder. Turn off if values are ever observed from another thread.
    pub steal_unique: bool,

    /// Run a conservative cleanup as soon as a future is dropped. When off,
    /// dropped vertices are only marked until [`cleanup`] is called.
    ///
    /// [`cleanup`]: crate::OperationDag::cleanup
    pub reclaim_on_release: bool,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            steal_unique: true,
            reclaim_on_release: true,
        }
    }
}

impl DagConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
