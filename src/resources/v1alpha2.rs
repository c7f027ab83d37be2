//! Legacy resource registry, keyed by plural name.

use std::collections::HashMap;
use std::sync::Arc;

use query_core::{Query, paginate};
use tracing::debug;

use super::names::{
    CLUSTER_ROLES, NAMESPACES, NODES, S2I_BUILDER_TEMPLATES, S2I_BUILDERS, S2I_RUNS,
    STORAGE_CLASSES, WORKSPACES,
};
use super::{ListResult, ListerSearcher, Searcher};
use crate::objects::{Object, ObjectCache};
use crate::{Error, Result};

/// Resources that only exist at cluster scope.
pub const CLUSTER_RESOURCES: &[&str] = &[
    NODES,
    WORKSPACES,
    NAMESPACES,
    CLUSTER_ROLES,
    STORAGE_CLASSES,
    S2I_BUILDER_TEMPLATES,
];

/// Plural-name keyed registry.
///
/// A namespace given for a [`CLUSTER_RESOURCES`] entry is rejected before any
/// searcher runs.
#[derive(Default)]
pub struct ResourceGetter {
    searchers: HashMap<String, Arc<dyn Searcher>>,
}

impl ResourceGetter {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `searcher` for `resource`.
    #[must_use]
    pub fn with_searcher(mut self, resource: impl Into<String>, searcher: Arc<dyn Searcher>) -> Self {
        self.searchers.insert(resource.into(), searcher);
        self
    }

    /// Registry with the standard searchers over `cache`.
    #[must_use]
    pub fn from_cache(cache: &ObjectCache) -> Self {
        Self::new()
            .with_searcher(
                S2I_BUILDERS,
                ListerSearcher::shared(S2I_BUILDERS, cache.s2i_builders.clone()),
            )
            .with_searcher(S2I_RUNS, ListerSearcher::shared(S2I_RUNS, cache.s2i_runs.clone()))
            .with_searcher(
                S2I_BUILDER_TEMPLATES,
                ListerSearcher::shared(S2I_BUILDER_TEMPLATES, cache.s2i_builder_templates.clone()),
            )
            .with_searcher(
                NAMESPACES,
                ListerSearcher::shared(NAMESPACES, cache.namespaces.clone()),
            )
    }

    fn searcher(&self, resource: &str, namespace: &str) -> Result<&Arc<dyn Searcher>> {
        if !namespace.is_empty() && CLUSTER_RESOURCES.contains(&resource) {
            debug!(resource, namespace, "Cluster resource requested in a namespace");
            return Err(Error::NotSupported(resource.to_string()));
        }
        self.searchers
            .get(resource)
            .ok_or_else(|| Error::NotSupported(resource.to_string()))
    }
}

impl super::ResourceGetter for ResourceGetter {
    fn get(&self, resource: &str, namespace: &str, name: &str) -> Result<Arc<dyn Object>> {
        self.searcher(resource, namespace)?.get(namespace, name)
    }

    fn list(&self, resource: &str, namespace: &str, query: &Query) -> Result<ListResult> {
        let result = self.searcher(resource, namespace)?.search(namespace, query)?;
        Ok(paginate(result, query.limit, query.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{GenericObject, ObjectMeta, Snapshot};
    use crate::resources::ResourceGetter as _;

    fn registry() -> ResourceGetter {
        let cache = ObjectCache::from_snapshot(Snapshot {
            namespaces: vec![
                GenericObject::new(ObjectMeta::named("dev")),
                GenericObject::new(ObjectMeta::named("prod")),
            ],
            s2i_runs: vec![
                GenericObject::new(ObjectMeta::namespaced("dev", "run-1")),
                GenericObject::new(ObjectMeta::namespaced("prod", "run-2")),
            ],
            ..Snapshot::default()
        });
        ResourceGetter::from_cache(&cache)
    }

    #[test]
    fn cluster_resource_with_namespace_is_not_supported() {
        let registry = registry();
        assert!(matches!(
            registry.list(NAMESPACES, "dev", &Query::new()),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            registry.get(NODES, "dev", "node-1"),
            Err(Error::NotSupported(_))
        ));
        assert_eq!(registry.list(NAMESPACES, "", &Query::new()).unwrap().total_count, 2);
    }

    #[test]
    fn unregistered_resource_is_not_supported() {
        let registry = registry();
        assert!(matches!(
            registry.list(NODES, "", &Query::new()),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            registry.list("pods", "dev", &Query::new()),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn namespaced_resources_list_per_namespace_or_everywhere() {
        let registry = registry();
        assert_eq!(registry.list(S2I_RUNS, "dev", &Query::new()).unwrap().total_count, 1);
        assert_eq!(registry.list(S2I_RUNS, "", &Query::new()).unwrap().total_count, 2);
        assert_eq!(registry.get(S2I_RUNS, "prod", "run-2").unwrap().meta().name, "run-2");
        assert!(matches!(
            registry.get(S2I_RUNS, "dev", "run-2"),
            Err(Error::NotFound { .. })
        ));
    }
}
