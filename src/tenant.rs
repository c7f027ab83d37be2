//! Workspace tenancy queries.

use std::sync::Arc;

use query_core::{Condition, Query, apply, fields};
use tracing::debug;

use crate::authorization::{Attributes, Authorizer, Scope};
use crate::objects::{GenericObject, LABEL_WORKSPACE, Lister, Object, ObjectCache, Selector};
use crate::resources::names::DEVOPS_PROJECTS;
use crate::resources::v1alpha3::{self, DEVOPS_GROUP, GroupVersionResource};
use crate::resources::ListResult;
use crate::{Identity, Result};

/// Lists workspace-owned resources on behalf of a member.
pub struct TenantOperator {
    authorizer: Arc<dyn Authorizer>,
    resources: Arc<v1alpha3::ResourceGetter>,
    devops_projects: Arc<dyn Lister<GenericObject>>,
}

impl TenantOperator {
    /// Operator answering from `resources` and `cache`.
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        resources: Arc<v1alpha3::ResourceGetter>,
        cache: &ObjectCache,
    ) -> Self {
        Self {
            authorizer,
            resources,
            devops_projects: cache.devops_projects.clone(),
        }
    }

    /// DevOps projects of `workspace` visible to `user`.
    ///
    /// A user who may list projects across the workspace sees all of them;
    /// anyone else sees only the projects whose admin namespace grants them
    /// `get`.
    pub fn list_devops_projects(
        &self,
        user: &Identity,
        workspace: &str,
        query: &Query,
    ) -> Result<ListResult> {
        let workspace_wide = self.authorizer.authorize(&Attributes::new(
            user.clone(),
            "list",
            DEVOPS_PROJECTS,
            Scope::Workspace(workspace.to_string()),
        ))?;

        if workspace_wide.is_allowed() {
            let query = query
                .clone()
                .with_condition(fields::WORKSPACE, Condition::exact(workspace));
            let gvr = GroupVersionResource::new(DEVOPS_GROUP, "v1alpha3", DEVOPS_PROJECTS);
            return self.resources.list_by_gvr(&gvr, "", &query);
        }

        let selector = Selector::everything().with_label(LABEL_WORKSPACE, workspace);
        let mut visible = Vec::new();
        for project in self.devops_projects.list("", &selector) {
            let attributes = Attributes::new(
                user.clone(),
                "get",
                DEVOPS_PROJECTS,
                Scope::Namespace(admin_namespace(&project).to_string()),
            )
            .named(project.metadata.name.clone());
            if self.authorizer.authorize(&attributes)?.is_allowed() {
                visible.push(project);
            }
        }
        debug!(
            user = %user.name,
            workspace,
            visible = visible.len(),
            "Listed devops projects by membership"
        );

        let page = apply(visible, query);
        Ok(ListResult {
            total_count: page.total_count,
            items: page.items.into_iter().map(|p| p as Arc<dyn Object>).collect(),
        })
    }
}

/// Namespace administering `project`, defaulting to its own name.
pub(crate) fn admin_namespace(project: &GenericObject) -> &str {
    project
        .status_str("adminNamespace")
        .filter(|ns| !ns.is_empty())
        .unwrap_or(&project.metadata.name)
}
