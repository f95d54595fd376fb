//! Tool registry - the static catalogue of SEO tools the gateway exposes.
//!
//! Tools are declarative: a name, a description, a JSON Schema for the
//! arguments, the upstream endpoint they map to, and a builder that turns
//! validated arguments into the upstream request payload. Dispatch is a
//! single name lookup, so "unknown tool" is one uniform code path.

mod catalog;
pub mod format;

use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::Value;

use crate::upstream::Payload;

/// One exposed tool. Immutable for the process lifetime.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Upstream endpoint path, relative to the configured base URL.
    pub endpoint: &'static str,
    /// JSON Schema for the `arguments` object.
    pub schema: Value,
    /// Builds the upstream payload from caller arguments. Errors here are
    /// tool-execution errors (reported as `isError` content), never protocol
    /// faults.
    pub build: fn(&Value) -> Result<Payload, String>,
}

pub struct ToolRegistry {
    ordered: Vec<ToolDef>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    fn new(tools: Vec<ToolDef>) -> Self {
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name, i))
            .collect();
        Self {
            ordered: tools,
            index,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.index.get(name).map(|&i| &self.ordered[i])
    }

    /// Tools in registration order - `tools/list` relies on this being
    /// deterministic.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDef> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

static REGISTRY: LazyLock<ToolRegistry> = LazyLock::new(|| ToolRegistry::new(catalog::catalog()));

pub fn registry() -> &'static ToolRegistry {
    &REGISTRY
}
