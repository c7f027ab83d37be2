//! Resource query registries
//!
//! Two generations map a resource type to a [`Searcher`] and apply filtering,
//! ordering and pagination uniformly:
//!
//! - [`v1alpha2::ResourceGetter`]: keyed by plural name, with a closed list
//!   of cluster-only resources
//! - [`v1alpha3::ResourceGetter`]: keyed by group/version/resource, each
//!   entry registered under exactly one scope
//!
//! Both are built once at startup and only read afterwards.

mod searcher;
pub mod v1alpha2;
pub mod v1alpha3;

use std::sync::Arc;

use query_core::{Page, Query};

pub use searcher::{ListerSearcher, Searcher};

use crate::Result;
use crate::objects::Object;

/// A page of cached objects.
pub type ListResult = Page<Arc<dyn Object>>;

/// Resource plural names.
pub mod names {
    /// Nodes
    pub const NODES: &str = "nodes";
    /// Namespaces
    pub const NAMESPACES: &str = "namespaces";
    /// Workspaces
    pub const WORKSPACES: &str = "workspaces";
    /// Workspace templates
    pub const WORKSPACE_TEMPLATES: &str = "workspacetemplates";
    /// Cluster roles
    pub const CLUSTER_ROLES: &str = "clusterroles";
    /// Storage classes
    pub const STORAGE_CLASSES: &str = "storageclasses";
    /// Source-to-image builders
    pub const S2I_BUILDERS: &str = "s2ibuilders";
    /// Source-to-image runs
    pub const S2I_RUNS: &str = "s2iruns";
    /// Source-to-image builder templates
    pub const S2I_BUILDER_TEMPLATES: &str = "s2ibuildertemplates";
    /// DevOps projects
    pub const DEVOPS_PROJECTS: &str = "devopsprojects";
    /// Users
    pub const USERS: &str = "users";
    /// Global roles
    pub const GLOBAL_ROLES: &str = "globalroles";
    /// Workspace roles
    pub const WORKSPACE_ROLES: &str = "workspaceroles";
    /// Global role bindings
    pub const GLOBAL_ROLE_BINDINGS: &str = "globalrolebindings";
    /// Workspace role bindings
    pub const WORKSPACE_ROLE_BINDINGS: &str = "workspacerolebindings";
    /// Namespace roles
    pub const ROLES: &str = "roles";
    /// Namespace role bindings
    pub const ROLE_BINDINGS: &str = "rolebindings";
}

/// Read access to cached resources by type.
pub trait ResourceGetter: Send + Sync {
    /// One object. An empty `namespace` addresses cluster scope.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotSupported`] for unknown types or the wrong scope,
    /// [`crate::Error::NotFound`] for missing objects.
    fn get(&self, resource: &str, namespace: &str, name: &str) -> Result<Arc<dyn Object>>;

    /// A filtered, ordered page of objects. `total_count` counts every match
    /// before pagination.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotSupported`] for unknown types or the wrong scope.
    fn list(&self, resource: &str, namespace: &str, query: &Query) -> Result<ListResult>;
}

/// Client representation of the objects on a page.
#[must_use]
pub fn items_json(page: &ListResult) -> Vec<serde_json::Value> {
    page.items.iter().map(|o| o.to_json()).collect()
}
