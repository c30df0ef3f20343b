use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use nebula_core::Key;

use crate::definition::{DefinitionId, NodeDefinition};
use crate::error::RegistryError;

/// One definition's entry in a [`NodeRegistry::catalog`] result.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: DefinitionId,
    pub name: String,
    pub category: Key,
    pub description: String,
}

/// A source of definitions a registry can bulk-register from: a plugin's
/// `register(registry)` entry point, or any other closure-like producer of
/// definitions. Declarative registration replaces the teacher's reflection
/// based discovery — see the registry's module docs.
pub trait DefinitionSource {
    fn definitions(&self) -> Vec<NodeDefinition>;
}

/// Maintains the set of [`NodeDefinition`]s and looks them up by id or by
/// category/name/description search.
///
/// Categories are tracked in an `IndexMap` so [`catalog`](Self::catalog)
/// returns them in first-registration order, matching the order a node
/// palette would want to present them in, rather than hash order.
pub struct NodeRegistry {
    definitions: HashMap<DefinitionId, Arc<NodeDefinition>>,
    categories: IndexMap<Key, Vec<DefinitionId>>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            categories: IndexMap::new(),
        }
    }

    /// Register a single definition.
    pub fn register(&mut self, definition: NodeDefinition) -> Result<DefinitionId, RegistryError> {
        let id = definition.id();
        if self.definitions.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }
        self.categories
            .entry(definition.category().clone())
            .or_default()
            .push(id);
        self.definitions.insert(id, Arc::new(definition));
        Ok(id)
    }

    /// Register every definition a [`DefinitionSource`] provides.
    pub fn register_from_source(
        &mut self,
        source: &dyn DefinitionSource,
    ) -> Result<Vec<DefinitionId>, RegistryError> {
        source
            .definitions()
            .into_iter()
            .map(|def| self.register(def))
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: DefinitionId) -> Option<Arc<NodeDefinition>> {
        self.definitions.get(&id).cloned()
    }

    pub fn try_get(&self, id: DefinitionId) -> Result<Arc<NodeDefinition>, RegistryError> {
        self.get(id).ok_or(RegistryError::NotFound(id))
    }

    #[must_use]
    pub fn exists(&self, id: DefinitionId) -> bool {
        self.definitions.contains_key(&id)
    }

    /// All registered definitions.
    #[must_use]
    pub fn definitions(&self) -> Vec<Arc<NodeDefinition>> {
        self.definitions.values().cloned().collect()
    }

    /// Definitions grouped by category, in first-registration order.
    /// `query`, when given, keeps only definitions whose id, name, or
    /// description contains it as a case-insensitive substring.
    #[must_use]
    pub fn catalog(&self, query: Option<&str>) -> Vec<(Key, Vec<CatalogEntry>)> {
        let needle = query.map(str::to_lowercase);
        self.categories
            .iter()
            .filter_map(|(category, ids)| {
                let entries: Vec<CatalogEntry> = ids
                    .iter()
                    .filter_map(|id| self.definitions.get(id))
                    .filter(|def| matches_query(def, needle.as_deref()))
                    .map(|def| CatalogEntry {
                        id: def.id(),
                        name: def.name().to_string(),
                        category: def.category().clone(),
                        description: def.description().to_string(),
                    })
                    .collect();
                if entries.is_empty() {
                    None
                } else {
                    Some((category.clone(), entries))
                }
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn matches_query(def: &NodeDefinition, needle: Option<&str>) -> bool {
    let Some(needle) = needle else {
        return true;
    };
    def.id().to_string().to_lowercase().contains(needle)
        || def.name().to_lowercase().contains(needle)
        || def.description().to_lowercase().contains(needle)
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;
    use pretty_assertions::assert_eq;

    fn def(name: &str, category: &str, description: &str) -> NodeDefinition {
        NodeDefinition::builder(name, Key::new(category).unwrap(), description)
            .callable()
            .input(Socket::data_input("a", "int"))
            .build()
    }

    #[test]
    fn register_then_get_round_trips() {
        let mut reg = NodeRegistry::new();
        let id = reg.register(def("Add", "math", "adds two numbers")).unwrap();
        let fetched = reg.get(id).unwrap();
        assert_eq!(fetched.name(), "Add");
    }

    #[test]
    fn registering_same_definition_twice_fails() {
        let mut reg = NodeRegistry::new();
        let definition = def("Add", "math", "adds two numbers");
        reg.register(definition.clone()).unwrap();

        let err = reg.register(definition).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[test]
    fn catalog_groups_by_category_in_registration_order() {
        let mut reg = NodeRegistry::new();
        reg.register(def("Add", "math", "adds two numbers")).unwrap();
        reg.register(def("Const", "values", "a constant value")).unwrap();
        reg.register(def("Multiply", "math", "multiplies two numbers"))
            .unwrap();

        let catalog = reg.catalog(None);
        let categories: Vec<&str> = catalog.iter().map(|(cat, _)| cat.as_str()).collect();
        assert_eq!(categories, vec!["math", "values"]);
        assert_eq!(catalog[0].1.len(), 2);
    }

    #[test]
    fn catalog_query_filters_case_insensitively() {
        let mut reg = NodeRegistry::new();
        reg.register(def("Add", "math", "adds two numbers")).unwrap();
        reg.register(def("Const", "values", "a constant value")).unwrap();

        let catalog = reg.catalog(Some("CONSTANT"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].1[0].name, "Const");
    }

    #[test]
    fn not_found_for_missing_id() {
        let reg = NodeRegistry::new();
        let err = reg.try_get(DefinitionId::v4()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
