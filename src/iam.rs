//! DevOps project membership and roles.
//!
//! Read-only views over the role bindings and roles of a project's admin
//! namespace.

use std::collections::BTreeMap;
use std::sync::Arc;

use query_core::{Query, apply};
use tracing::{debug, warn};

use crate::objects::{
    ANNOTATION_AGGREGATION_ROLES, ANNOTATION_ROLE, GenericObject, Lister, Object, ObjectCache,
    Role, RoleBinding, RoleKind, Selector, SubjectKind, User,
};
use crate::resources::ListResult;
use crate::resources::names::{ROLES, USERS};
use crate::tenant::admin_namespace;
use crate::{Error, Result};

/// Answers membership questions for DevOps projects.
pub struct AccessOperator {
    users: Arc<dyn Lister<User>>,
    roles: Arc<dyn Lister<Role>>,
    role_bindings: Arc<dyn Lister<RoleBinding>>,
    devops_projects: Arc<dyn Lister<GenericObject>>,
}

impl AccessOperator {
    /// Operator reading from `cache`.
    #[must_use]
    pub fn new(cache: &ObjectCache) -> Self {
        Self {
            users: cache.users.clone(),
            roles: cache.roles.clone(),
            role_bindings: cache.role_bindings.clone(),
            devops_projects: cache.devops_projects.clone(),
        }
    }

    /// Namespace holding the roles of `devops`.
    ///
    /// Unknown projects are addressed by name.
    pub fn namespace_of(&self, devops: &str) -> String {
        self.devops_projects
            .get_by_key("", devops)
            .map_or_else(|| devops.to_string(), |p| admin_namespace(&p).to_string())
    }

    /// Member name to the role bound in `namespace`. The first binding by
    /// name wins.
    fn member_roles(&self, namespace: &str) -> BTreeMap<String, String> {
        let mut members = BTreeMap::new();
        for binding in self.role_bindings.list(namespace, &Selector::everything()) {
            if binding.role_ref.kind != RoleKind::Role {
                continue;
            }
            for subject in binding.subjects.iter().filter(|s| s.kind == SubjectKind::User) {
                members
                    .entry(subject.name.clone())
                    .or_insert_with(|| binding.role_ref.name.clone());
            }
        }
        members
    }

    fn annotated(&self, name: &str, role: &str) -> Option<Arc<User>> {
        let user = self.users.get_by_key("", name)?;
        let mut user = (*user).clone();
        user.metadata
            .annotations
            .insert(ANNOTATION_ROLE.to_string(), role.to_string());
        Some(Arc::new(user))
    }

    /// Users bound to a role in `namespace`, each annotated with that role.
    pub fn list_members(&self, namespace: &str, query: &Query) -> ListResult {
        let members: Vec<Arc<User>> = self
            .member_roles(namespace)
            .iter()
            .filter_map(|(name, role)| self.annotated(name, role))
            .collect();
        debug!(namespace, members = members.len(), "Listed members");

        let page = apply(members, query);
        ListResult {
            total_count: page.total_count,
            items: page.items.into_iter().map(|u| u as Arc<dyn Object>).collect(),
        }
    }

    /// One member of `namespace`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `member` holds no role there.
    pub fn describe_member(&self, namespace: &str, member: &str) -> Result<Arc<User>> {
        self.member_roles(namespace)
            .get(member)
            .and_then(|role| self.annotated(member, role))
            .ok_or_else(|| Error::NotFound {
                kind: USERS.to_string(),
                name: member.to_string(),
            })
    }

    /// Roles defined in `namespace`.
    pub fn list_roles(&self, namespace: &str, query: &Query) -> ListResult {
        let page = apply(self.roles.list(namespace, &Selector::everything()), query);
        ListResult {
            total_count: page.total_count,
            items: page.items.into_iter().map(|r| r as Arc<dyn Object>).collect(),
        }
    }

    /// One role of `namespace`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown role.
    pub fn describe_role(&self, namespace: &str, role: &str) -> Result<Arc<Role>> {
        self.roles
            .get_by_key(namespace, role)
            .ok_or_else(|| Error::NotFound {
                kind: ROLES.to_string(),
                name: role.to_string(),
            })
    }

    /// Template roles the member's role is composed of, ordered by name.
    ///
    /// A member without a role, or whose role names no templates, gets an
    /// empty list.
    pub fn member_role_templates(&self, namespace: &str, member: &str) -> Vec<Arc<Role>> {
        let Some(role) = self
            .member_roles(namespace)
            .remove(member)
            .and_then(|name| self.roles.get_by_key(namespace, &name))
        else {
            return Vec::new();
        };

        let names: Vec<String> = match role.metadata.annotations.get(ANNOTATION_AGGREGATION_ROLES) {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!(role = %role.metadata.name, error = %e, "Unreadable aggregation roles");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let templates: BTreeMap<String, Arc<Role>> = names
            .iter()
            .filter_map(|name| self.roles.get_by_key(namespace, name))
            .map(|template| (template.metadata.name.clone(), template))
            .collect();
        templates.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ObjectMeta, RoleRef, Rule, Snapshot, Subject};
    use query_core::{Condition, fields};
    use serde_json::json;

    fn binding(namespace: &str, name: &str, role: &str, users: &[&str]) -> RoleBinding {
        RoleBinding::new(
            ObjectMeta::namespaced(namespace, name),
            RoleRef {
                kind: RoleKind::Role,
                name: role.to_string(),
            },
            users.iter().map(|u| Subject::user(*u)).collect(),
        )
    }

    fn operator() -> AccessOperator {
        let admin = Role {
            metadata: ObjectMeta::namespaced("proj-a", "admin").with_annotation(
                ANNOTATION_AGGREGATION_ROLES,
                r#"["role-template-view-pipelines","role-template-manage-pipelines","missing"]"#,
            ),
            rules: vec![Rule::new(["*"], ["*"])],
        };
        let template = |name: &str| Role {
            metadata: ObjectMeta::namespaced("proj-a", name),
            rules: vec![Rule::new(["get"], ["pipelines"])],
        };

        let cache = ObjectCache::from_snapshot(Snapshot {
            users: vec![
                User::active("alice", "hash"),
                User::active("bob", "hash"),
                User::active("carol", "hash"),
            ],
            roles: vec![
                admin,
                Role {
                    metadata: ObjectMeta::namespaced("proj-a", "viewer"),
                    rules: vec![Rule::new(["get"], ["*"])],
                },
                template("role-template-view-pipelines"),
                template("role-template-manage-pipelines"),
            ],
            role_bindings: vec![
                binding("proj-a", "admin-alice", "admin", &["alice"]),
                binding("proj-a", "viewer-bob", "viewer", &["bob", "ghost"]),
                binding("proj-b", "viewer-carol", "viewer", &["carol"]),
            ],
            devops_projects: vec![
                GenericObject::new(ObjectMeta::named("proj-a")),
                GenericObject::new(ObjectMeta::named("proj-c"))
                    .with_status(json!({ "adminNamespace": "proj-c-admin" })),
            ],
            ..Snapshot::default()
        });
        AccessOperator::new(&cache)
    }

    fn names(page: &ListResult) -> Vec<String> {
        page.items.iter().map(|o| o.meta().name.clone()).collect()
    }

    #[test]
    fn namespace_follows_admin_namespace() {
        let operator = operator();
        assert_eq!(operator.namespace_of("proj-a"), "proj-a");
        assert_eq!(operator.namespace_of("proj-c"), "proj-c-admin");
        assert_eq!(operator.namespace_of("unknown"), "unknown");
    }

    #[test]
    fn members_carry_their_role() {
        let operator = operator();

        let page = operator.list_members("proj-a", &Query::new());

        // ghost has a binding but no user record
        assert_eq!(names(&page), vec!["alice", "bob"]);
        let bob = page.items[1].to_json();
        assert_eq!(bob["metadata"]["annotations"][ANNOTATION_ROLE], "viewer");
    }

    #[test]
    fn members_are_filtered_and_paged() {
        let operator = operator();
        let query = Query::new()
            .with_condition(fields::NAME, Condition::fuzzy("b"))
            .paged(10, 0);

        let page = operator.list_members("proj-a", &query);

        assert_eq!(page.total_count, 1);
        assert_eq!(names(&page), vec!["bob"]);
    }

    #[test]
    fn describe_member_outside_namespace_is_not_found() {
        let operator = operator();
        assert_eq!(
            operator.describe_member("proj-a", "alice").unwrap().metadata.annotations[ANNOTATION_ROLE],
            "admin"
        );
        assert!(matches!(
            operator.describe_member("proj-a", "carol"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn roles_are_namespace_local() {
        let operator = operator();
        assert_eq!(operator.list_roles("proj-a", &Query::new()).total_count, 4);
        assert_eq!(operator.list_roles("proj-b", &Query::new()).total_count, 0);
        assert!(operator.describe_role("proj-a", "viewer").is_ok());
        assert!(matches!(
            operator.describe_role("proj-b", "viewer"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn role_templates_resolve_through_aggregation_annotation() {
        let operator = operator();

        let templates: Vec<String> = operator
            .member_role_templates("proj-a", "alice")
            .iter()
            .map(|r| r.metadata.name.clone())
            .collect();

        assert_eq!(
            templates,
            vec!["role-template-manage-pipelines", "role-template-view-pipelines"]
        );
        assert!(operator.member_role_templates("proj-a", "bob").is_empty());
        assert!(operator.member_role_templates("proj-a", "nobody").is_empty());
    }
}
