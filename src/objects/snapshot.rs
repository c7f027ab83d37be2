use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use super::{GenericObject, Lister, Role, RoleBinding, Store, User};
use crate::{Error, Result};

/// Object cache contents as loaded from a YAML file.
///
/// ```yaml
/// users:
///   - metadata: { name: alice }
///     spec: { email: alice@example.com, password: $2a$10$... }
///     status: { state: Active }
/// globalRoles: []
/// devopsProjects: []
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    /// Users
    pub users: Vec<User>,
    /// Global roles
    pub global_roles: Vec<Role>,
    /// Workspace roles
    pub workspace_roles: Vec<Role>,
    /// Namespace roles
    pub roles: Vec<Role>,
    /// Global role bindings
    pub global_role_bindings: Vec<RoleBinding>,
    /// Workspace role bindings
    pub workspace_role_bindings: Vec<RoleBinding>,
    /// Namespace role bindings
    pub role_bindings: Vec<RoleBinding>,
    /// Namespaces
    pub namespaces: Vec<GenericObject>,
    /// Workspaces
    pub workspaces: Vec<GenericObject>,
    /// Workspace templates
    pub workspace_templates: Vec<GenericObject>,
    /// DevOps projects
    pub devops_projects: Vec<GenericObject>,
    /// Source-to-image builders
    pub s2i_builders: Vec<GenericObject>,
    /// Source-to-image runs
    pub s2i_runs: Vec<GenericObject>,
    /// Source-to-image builder templates
    pub s2i_builder_templates: Vec<GenericObject>,
}

impl Snapshot {
    /// Read a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an IO or YAML error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

/// Every typed store the server reads from.
#[derive(Default)]
pub struct ObjectCache {
    /// Users
    pub users: Arc<Store<User>>,
    /// Global roles
    pub global_roles: Arc<Store<Role>>,
    /// Workspace roles
    pub workspace_roles: Arc<Store<Role>>,
    /// Namespace roles
    pub roles: Arc<Store<Role>>,
    /// Global role bindings
    pub global_role_bindings: Arc<Store<RoleBinding>>,
    /// Workspace role bindings
    pub workspace_role_bindings: Arc<Store<RoleBinding>>,
    /// Namespace role bindings
    pub role_bindings: Arc<Store<RoleBinding>>,
    /// Namespaces
    pub namespaces: Arc<Store<GenericObject>>,
    /// Workspaces
    pub workspaces: Arc<Store<GenericObject>>,
    /// Workspace templates
    pub workspace_templates: Arc<Store<GenericObject>>,
    /// DevOps projects
    pub devops_projects: Arc<Store<GenericObject>>,
    /// Source-to-image builders
    pub s2i_builders: Arc<Store<GenericObject>>,
    /// Source-to-image runs
    pub s2i_runs: Arc<Store<GenericObject>>,
    /// Source-to-image builder templates
    pub s2i_builder_templates: Arc<Store<GenericObject>>,
}

impl ObjectCache {
    /// Empty, unsynced cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache populated from `snapshot`.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let cache = Self::new();
        cache.load(snapshot);
        cache
    }

    /// Swap every store to the contents of `snapshot`.
    pub fn load(&self, snapshot: Snapshot) {
        self.users.replace(snapshot.users);
        self.global_roles.replace(snapshot.global_roles);
        self.workspace_roles.replace(snapshot.workspace_roles);
        self.roles.replace(snapshot.roles);
        self.global_role_bindings.replace(snapshot.global_role_bindings);
        self.workspace_role_bindings
            .replace(snapshot.workspace_role_bindings);
        self.role_bindings.replace(snapshot.role_bindings);
        self.namespaces.replace(snapshot.namespaces);
        self.workspaces.replace(snapshot.workspaces);
        self.workspace_templates.replace(snapshot.workspace_templates);
        self.devops_projects.replace(snapshot.devops_projects);
        self.s2i_builders.replace(snapshot.s2i_builders);
        self.s2i_runs.replace(snapshot.s2i_runs);
        self.s2i_builder_templates
            .replace(snapshot.s2i_builder_templates);
        debug!(users = self.users.len(), "Object cache loaded");
    }

    /// Whether every store holds its initial snapshot.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.users.has_synced()
            && self.global_roles.has_synced()
            && self.workspace_roles.has_synced()
            && self.roles.has_synced()
            && self.global_role_bindings.has_synced()
            && self.workspace_role_bindings.has_synced()
            && self.role_bindings.has_synced()
            && self.namespaces.has_synced()
            && self.workspaces.has_synced()
            && self.workspace_templates.has_synced()
            && self.devops_projects.has_synced()
            && self.s2i_builders.has_synced()
            && self.s2i_runs.has_synced()
            && self.s2i_builder_templates.has_synced()
    }

    /// Wait until every store has synced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] if `timeout` elapses first.
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<()> {
        let poll = async {
            let mut ticker = tokio::time::interval(Duration::from_millis(50));
            loop {
                ticker.tick().await;
                if self.has_synced() {
                    break;
                }
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            Error::Upstream(format!(
                "timed out after {timeout:?} waiting for object caches to sync"
            ))
        })?;
        info!("Object caches synced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Selector;

    #[test]
    fn snapshot_parses_camel_case_sections() {
        let snapshot: Snapshot = serde_yaml::from_str(
            r"
users:
  - metadata: { name: alice }
    spec: { password: hash }
    status: { state: Active }
globalRoleBindings:
  - metadata: { name: alice-admin }
    subjects: [{ kind: User, name: alice }]
    roleRef: { kind: GlobalRole, name: platform-admin }
s2iBuilderTemplates:
  - metadata: { name: java }
",
        )
        .unwrap();
        assert_eq!(snapshot.users.len(), 1);
        assert_eq!(snapshot.global_role_bindings.len(), 1);
        assert_eq!(snapshot.s2i_builder_templates.len(), 1);
        assert!(snapshot.devops_projects.is_empty());
    }

    #[tokio::test]
    async fn wait_for_sync_succeeds_once_loaded() {
        // GIVEN: a cache loaded from an empty snapshot
        let cache = ObjectCache::from_snapshot(Snapshot::default());

        // WHEN: startup waits for sync
        let result = cache.wait_for_sync(Duration::from_secs(1)).await;

        // THEN: it returns immediately
        assert!(result.is_ok());
        assert!(cache.users.list("", &Selector::everything()).is_empty());
    }

    #[tokio::test]
    async fn wait_for_sync_times_out_when_never_loaded() {
        // GIVEN: a cache that never received a snapshot
        let cache = ObjectCache::new();

        // WHEN: startup waits briefly
        let result = cache.wait_for_sync(Duration::from_millis(120)).await;

        // THEN: the wait fails as an upstream error
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = Snapshot::from_file(Path::new("/nonexistent/snapshot.yaml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
