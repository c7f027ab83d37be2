//! Current resource registry, keyed by group/version/resource.
//!
//! Each entry is registered under exactly one scope. Cluster entries answer
//! only when no namespace is given and namespaced entries only when one is.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use query_core::{Query, paginate};
use tracing::debug;

use super::names::{
    DEVOPS_PROJECTS, GLOBAL_ROLE_BINDINGS, GLOBAL_ROLES, ROLE_BINDINGS, ROLES, USERS,
    WORKSPACE_ROLE_BINDINGS, WORKSPACE_ROLES, WORKSPACE_TEMPLATES, WORKSPACES,
};
use super::{ListResult, ListerSearcher, Searcher};
use crate::objects::{Object, ObjectCache};
use crate::{Error, Result};

/// API group of DevOps projects.
pub const DEVOPS_GROUP: &str = "devops.kubesphere.io";
/// API group of workspaces.
pub const TENANT_GROUP: &str = "tenant.kubesphere.io";
/// API group of users, global and workspace roles.
pub const IAM_GROUP: &str = "iam.kubesphere.io";
/// API group of namespace roles.
pub const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Fully qualified resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionResource {
    /// API group, empty for the core group
    pub group: String,
    /// API version
    pub version: String,
    /// Resource plural
    pub resource: String,
}

impl GroupVersionResource {
    /// Build a triple.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// Scope-aware registry.
#[derive(Default)]
pub struct ResourceGetter {
    cluster: BTreeMap<GroupVersionResource, Arc<dyn Searcher>>,
    namespaced: BTreeMap<GroupVersionResource, Arc<dyn Searcher>>,
}

impl ResourceGetter {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster-scoped searcher.
    #[must_use]
    pub fn with_cluster(mut self, gvr: GroupVersionResource, searcher: Arc<dyn Searcher>) -> Self {
        self.cluster.insert(gvr, searcher);
        self
    }

    /// Register a namespaced searcher.
    #[must_use]
    pub fn with_namespaced(
        mut self,
        gvr: GroupVersionResource,
        searcher: Arc<dyn Searcher>,
    ) -> Self {
        self.namespaced.insert(gvr, searcher);
        self
    }

    /// Registry with the standard searchers over `cache`.
    #[must_use]
    pub fn from_cache(cache: &ObjectCache) -> Self {
        let devops = |r: &str| GroupVersionResource::new(DEVOPS_GROUP, "v1alpha3", r);
        let tenant = |r: &str| GroupVersionResource::new(TENANT_GROUP, "v1alpha1", r);
        let iam = |r: &str| GroupVersionResource::new(IAM_GROUP, "v1alpha2", r);
        let rbac = |r: &str| GroupVersionResource::new(RBAC_GROUP, "v1", r);

        Self::new()
            .with_cluster(
                devops(DEVOPS_PROJECTS),
                ListerSearcher::shared(DEVOPS_PROJECTS, cache.devops_projects.clone()),
            )
            .with_cluster(
                tenant(WORKSPACES),
                ListerSearcher::shared(WORKSPACES, cache.workspaces.clone()),
            )
            .with_cluster(
                tenant(WORKSPACE_TEMPLATES),
                ListerSearcher::shared(WORKSPACE_TEMPLATES, cache.workspace_templates.clone()),
            )
            .with_cluster(
                iam(GLOBAL_ROLES),
                ListerSearcher::shared(GLOBAL_ROLES, cache.global_roles.clone()),
            )
            .with_cluster(
                iam(WORKSPACE_ROLES),
                ListerSearcher::shared(WORKSPACE_ROLES, cache.workspace_roles.clone()),
            )
            .with_cluster(iam(USERS), ListerSearcher::shared(USERS, cache.users.clone()))
            .with_cluster(
                iam(GLOBAL_ROLE_BINDINGS),
                ListerSearcher::shared(GLOBAL_ROLE_BINDINGS, cache.global_role_bindings.clone()),
            )
            .with_cluster(
                iam(WORKSPACE_ROLE_BINDINGS),
                ListerSearcher::shared(
                    WORKSPACE_ROLE_BINDINGS,
                    cache.workspace_role_bindings.clone(),
                ),
            )
            .with_namespaced(rbac(ROLES), ListerSearcher::shared(ROLES, cache.roles.clone()))
            .with_namespaced(
                rbac(ROLE_BINDINGS),
                ListerSearcher::shared(ROLE_BINDINGS, cache.role_bindings.clone()),
            )
    }

    /// Searcher registered for plural `resource` in the requested scope.
    fn try_resource(&self, namespace: &str, resource: &str) -> Result<&Arc<dyn Searcher>> {
        let table = self.table(namespace);
        table
            .iter()
            .find(|(gvr, _)| gvr.resource == resource)
            .map(|(_, searcher)| searcher)
            .ok_or_else(|| {
                debug!(resource, namespace, "No searcher registered in this scope");
                Error::NotSupported(resource.to_string())
            })
    }

    fn try_gvr(&self, namespace: &str, gvr: &GroupVersionResource) -> Result<&Arc<dyn Searcher>> {
        self.table(namespace)
            .get(gvr)
            .ok_or_else(|| Error::NotSupported(gvr.to_string()))
    }

    fn table(&self, namespace: &str) -> &BTreeMap<GroupVersionResource, Arc<dyn Searcher>> {
        if namespace.is_empty() {
            &self.cluster
        } else {
            &self.namespaced
        }
    }

    /// [`super::ResourceGetter::get`] addressed by exact triple.
    pub fn get_by_gvr(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
        name: &str,
    ) -> Result<Arc<dyn Object>> {
        self.try_gvr(namespace, gvr)?.get(namespace, name)
    }

    /// [`super::ResourceGetter::list`] addressed by exact triple.
    pub fn list_by_gvr(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
        query: &Query,
    ) -> Result<ListResult> {
        let result = self.try_gvr(namespace, gvr)?.search(namespace, query)?;
        Ok(paginate(result, query.limit, query.offset))
    }
}

impl super::ResourceGetter for ResourceGetter {
    fn get(&self, resource: &str, namespace: &str, name: &str) -> Result<Arc<dyn Object>> {
        self.try_resource(namespace, resource)?.get(namespace, name)
    }

    fn list(&self, resource: &str, namespace: &str, query: &Query) -> Result<ListResult> {
        let result = self.try_resource(namespace, resource)?.search(namespace, query)?;
        Ok(paginate(result, query.limit, query.offset))
    }
}
