use std::any::TypeId;
use std::collections::HashMap;

use super::{Gnp, KernelSum, NearestNeighbor, RangeCount};

/// Metadata describing a registered policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInfo {
    /// Name used for runtime selection
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Whether results equal the exhaustive computation
    pub exact: bool,
}

#[derive(Debug)]
struct PolicyEntry {
    type_id: TypeId,
    description: String,
    exact: bool,
}

/// Registry of the policies available for runtime selection.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    entries: HashMap<String, PolicyEntry>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding every policy shipped with the crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<RangeCount>();
        registry.register::<NearestNeighbor>();
        registry.register::<KernelSum>();
        registry
    }

    /// Register a policy under its name; replaces an entry with the same name.
    pub fn register<G>(&mut self)
    where
        G: Gnp + 'static,
    {
        self.entries.insert(
            G::name().to_string(),
            PolicyEntry {
                type_id: TypeId::of::<G>(),
                description: G::description().to_string(),
                exact: G::is_exact(),
            },
        );
    }

    /// Metadata for the policy registered under `name`.
    pub fn get(&self, name: &str) -> Option<PolicyInfo> {
        self.entries.get(name).map(|entry| PolicyInfo {
            name: name.to_string(),
            description: entry.description.clone(),
            exact: entry.exact,
        })
    }

    /// Whether policy type `G` is registered under its own name.
    pub fn contains<G>(&self) -> bool
    where
        G: Gnp + 'static,
    {
        self.entries
            .get(G::name())
            .is_some_and(|entry| entry.type_id == TypeId::of::<G>())
    }

    /// List all registered policies, sorted by name.
    pub fn list(&self) -> Vec<PolicyInfo> {
        let mut infos: Vec<PolicyInfo> = self
            .entries
            .iter()
            .map(|(name, entry)| PolicyInfo {
                name: name.clone(),
                description: entry.description.clone(),
                exact: entry.exact,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}
