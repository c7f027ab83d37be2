use std::sync::Arc;

use tracing::debug;

use super::{Attributes, Authorizer, Decision, Scope};
use crate::Result;
use crate::objects::{
    LABEL_WORKSPACE, Lister, ObjectCache, Role, RoleBinding, RoleKind, Selector, SubjectKind,
};

/// Role-based authorizer over cached roles and bindings.
///
/// Global bindings always apply, workspace bindings only within their
/// workspace and namespace bindings only within their namespace. A binding
/// may only reference a role of the same or a broader scope, and a workspace
/// binding only a workspace role of its own workspace; anything else is
/// ignored. Evaluation stops at the first matching rule.
pub struct RbacAuthorizer {
    global_roles: Arc<dyn Lister<Role>>,
    workspace_roles: Arc<dyn Lister<Role>>,
    roles: Arc<dyn Lister<Role>>,
    global_role_bindings: Arc<dyn Lister<RoleBinding>>,
    workspace_role_bindings: Arc<dyn Lister<RoleBinding>>,
    role_bindings: Arc<dyn Lister<RoleBinding>>,
}

impl RbacAuthorizer {
    /// Authorizer reading from `cache`.
    #[must_use]
    pub fn new(cache: &ObjectCache) -> Self {
        Self {
            global_roles: cache.global_roles.clone(),
            workspace_roles: cache.workspace_roles.clone(),
            roles: cache.roles.clone(),
            global_role_bindings: cache.global_role_bindings.clone(),
            workspace_role_bindings: cache.workspace_role_bindings.clone(),
            role_bindings: cache.role_bindings.clone(),
        }
    }

    /// Bindings in effect for `scope`, each with the scope it was found in.
    fn bindings_for(&self, scope: &Scope) -> Vec<(RoleKind, Arc<RoleBinding>)> {
        let everything = Selector::everything();
        let mut bindings: Vec<(RoleKind, Arc<RoleBinding>)> = self
            .global_role_bindings
            .list("", &everything)
            .into_iter()
            .map(|b| (RoleKind::GlobalRole, b))
            .collect();

        match scope {
            Scope::Cluster => {}
            Scope::Workspace(ws) => {
                let selector = Selector::everything().with_label(LABEL_WORKSPACE, ws.as_str());
                bindings.extend(
                    self.workspace_role_bindings
                        .list("", &selector)
                        .into_iter()
                        .map(|b| (RoleKind::WorkspaceRole, b)),
                );
            }
            Scope::Namespace(ns) => {
                bindings.extend(
                    self.role_bindings
                        .list(ns, &everything)
                        .into_iter()
                        .map(|b| (RoleKind::Role, b)),
                );
            }
        }
        bindings
    }

    fn resolve_role(&self, binding_scope: RoleKind, binding: &RoleBinding) -> Option<Arc<Role>> {
        let role_ref = &binding.role_ref;
        if role_ref.kind > binding_scope {
            debug!(
                binding = %binding.metadata.name,
                role = %role_ref.name,
                "Ignoring binding that references a narrower role"
            );
            return None;
        }
        match role_ref.kind {
            RoleKind::GlobalRole => self.global_roles.get_by_key("", &role_ref.name),
            RoleKind::WorkspaceRole => {
                let role = self.workspace_roles.get_by_key("", &role_ref.name)?;
                if binding_scope == RoleKind::WorkspaceRole
                    && role.metadata.workspace() != binding.metadata.workspace()
                {
                    debug!(
                        binding = %binding.metadata.name,
                        role = %role_ref.name,
                        "Ignoring binding that references another workspace's role"
                    );
                    return None;
                }
                Some(role)
            }
            RoleKind::Role => self
                .roles
                .get_by_key(&binding.metadata.namespace, &role_ref.name),
        }
    }
}

fn applies_to(binding: &RoleBinding, attributes: &Attributes) -> bool {
    binding.subjects.iter().any(|subject| match subject.kind {
        SubjectKind::User => subject.name == attributes.user.name,
        SubjectKind::Group => attributes.user.groups.contains(&subject.name),
        SubjectKind::ServiceAccount => false,
    })
}

impl Authorizer for RbacAuthorizer {
    fn authorize(&self, attributes: &Attributes) -> Result<Decision> {
        for (binding_scope, binding) in self.bindings_for(&attributes.scope) {
            if !applies_to(&binding, attributes) {
                continue;
            }
            let Some(role) = self.resolve_role(binding_scope, &binding) else {
                continue;
            };
            let matched = role.rules.iter().any(|rule| {
                rule.allows(
                    &attributes.verb,
                    &attributes.resource,
                    attributes.resource_name.as_deref(),
                )
            });
            if matched {
                debug!(
                    user = %attributes.user.name,
                    verb = %attributes.verb,
                    resource = %attributes.resource,
                    scope = %attributes.scope,
                    binding = %binding.metadata.name,
                    "Allowed"
                );
                return Ok(Decision::allow(format!(
                    "allowed by {:?} {:?} via binding {:?}",
                    role.metadata.name, binding.role_ref.kind, binding.metadata.name
                )));
            }
        }

        debug!(
            user = %attributes.user.name,
            verb = %attributes.verb,
            resource = %attributes.resource,
            scope = %attributes.scope,
            "Denied"
        );
        Ok(Decision::deny(format!(
            "user {:?} cannot {} {} in {}",
            attributes.user.name, attributes.verb, attributes.resource, attributes.scope
        )))
    }
}
