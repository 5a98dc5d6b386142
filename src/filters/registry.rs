//! Registry of process-object types, keyed by metadata id.

use crate::core::error::{GraphError, GraphResult};
use crate::core::node::{Category, NodeMetadata, ProcessObject};
use indexmap::IndexMap;
use std::sync::Arc;

/// Factory function for creating node instances.
pub type FilterFactory = Arc<dyn Fn() -> Box<dyn ProcessObject> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    pub factory: FilterFactory,
    /// Cached so listings need no instance.
    pub metadata: NodeMetadata,
}

/// Every process object the application can create by name.
pub struct FilterRegistry {
    filters: IndexMap<String, RegistryEntry>,
}

impl FilterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            filters: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in nodes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry);
        registry
    }

    /// Register a node type. A later registration under the same id replaces
    /// the earlier one.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn ProcessObject> + Send + Sync + 'static,
    {
        let metadata = factory().metadata();
        self.filters.insert(
            metadata.id.clone(),
            RegistryEntry {
                factory: Arc::new(factory),
                metadata,
            },
        );
    }

    /// Create a new instance of a node type.
    pub fn create(&self, id: &str) -> GraphResult<Box<dyn ProcessObject>> {
        self.filters
            .get(id)
            .map(|entry| (entry.factory)())
            .ok_or_else(|| GraphError::UnknownFilter(id.to_string()))
    }

    pub fn get_metadata(&self, id: &str) -> Option<&NodeMetadata> {
        self.filters.get(id).map(|e| &e.metadata)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    pub fn filter_ids(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(|s| s.as_str())
    }

    /// Search ids, names, descriptions and tags, case-insensitively.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.filters
            .iter()
            .filter(|(_, entry)| {
                let m = &entry.metadata;
                m.id.to_lowercase().contains(&query)
                    || m.name.to_lowercase().contains(&query)
                    || m.description.to_lowercase().contains(&query)
                    || m.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Metadata grouped by category in [`Category::all`] order, each group
    /// sorted by name.
    pub fn grouped_by_category(&self) -> IndexMap<Category, Vec<&NodeMetadata>> {
        let mut grouped: IndexMap<Category, Vec<&NodeMetadata>> = Category::all()
            .iter()
            .map(|&category| (category, Vec::new()))
            .collect();
        for entry in self.filters.values() {
            if let Some(group) = grouped.get_mut(&entry.metadata.category) {
                group.push(&entry.metadata);
            }
        }
        grouped.retain(|_, group| !group.is_empty());
        for group in grouped.values_mut() {
            group.sort_by(|a, b| a.name.cmp(&b.name));
        }
        grouped
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::builtin::PassThrough;

    #[test]
    fn test_register_and_create() {
        let mut registry = FilterRegistry::new();
        registry.register(|| Box::new(PassThrough));

        assert!(registry.contains("pass_through"));
        assert_eq!(registry.create("pass_through").unwrap().metadata().name, "Pass Through");
        assert!(matches!(
            registry.create("nope"),
            Err(GraphError::UnknownFilter(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_builtins() {
        let registry = FilterRegistry::with_builtins();
        for id in [
            "pattern_source",
            "image_file_reader",
            "image_file_writer",
            "pass_through",
            "shift_scale",
            "mean",
            "discrete_gaussian",
            "region_of_interest",
            "rescale_intensity",
        ] {
            assert!(registry.contains(id), "missing {id}");
        }
        assert_eq!(registry.len(), 9);
    }

    #[test]
    fn test_search_and_grouping() {
        let registry = FilterRegistry::with_builtins();
        let smoothing = registry.search("SMOOTH");
        assert!(smoothing.contains(&"mean"));
        assert!(smoothing.contains(&"discrete_gaussian"));
        assert!(registry.search("nonexistent").is_empty());

        let grouped = registry.grouped_by_category();
        let first = grouped.keys().next().copied();
        assert_eq!(first, Some(Category::Source));
        let names: Vec<&str> = grouped[&Category::Neighborhood].iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Discrete Gaussian", "Mean"]);
    }
}
