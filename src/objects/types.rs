use std::borrow::Cow;

use query_core::{Condition, Fields, fields};
use serde::{Deserialize, Serialize};

use super::{Object, ObjectMeta};

/// Account state of a [`User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserState {
    /// May log in
    Active,
    /// Administratively disabled
    Disabled,
    /// Locked after too many failed logins
    AuthLimitExceeded,
}

impl UserState {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Disabled => "Disabled",
            Self::AuthLimitExceeded => "AuthLimitExceeded",
        }
    }
}

/// User account spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSpec {
    /// Email address
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Display name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// bcrypt hash; never serialized back to clients
    #[serde(rename = "password", skip_serializing)]
    pub encrypted_password: String,
}

/// User account status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserStatus {
    /// Absent means the account was never activated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<UserState>,
    /// Why the state was set
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// A user account (credential record).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: UserSpec,
    /// Status
    pub status: UserStatus,
}

impl User {
    /// Active user with the given password hash.
    pub fn active(name: impl Into<String>, encrypted_password: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: UserSpec {
                encrypted_password: encrypted_password.into(),
                ..UserSpec::default()
            },
            status: UserStatus {
                state: Some(UserState::Active),
                ..UserStatus::default()
            },
        }
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.spec.email = email.into();
        self
    }

    /// Set the account state.
    #[must_use]
    pub fn with_state(mut self, state: Option<UserState>) -> Self {
        self.status.state = state;
        self
    }
}

impl Fields for User {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn field(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            fields::EMAIL if !self.spec.email.is_empty() => Some(Cow::Borrowed(&self.spec.email)),
            fields::STATE | fields::STATUS => {
                self.status.state.map(|s| Cow::Borrowed(s.as_str()))
            }
            _ => self.metadata.field(field),
        }
    }

    fn matches(&self, field: &str, condition: &Condition) -> bool {
        match field {
            fields::EMAIL | fields::STATE | fields::STATUS => self
                .field(field)
                .is_some_and(|v| condition.matches_value(&v)),
            _ => self.metadata.matches(field, condition),
        }
    }
}

impl Object for User {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// One permission rule of a role. Empty `resource_names` means any name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Rule {
    /// Verbs, `*` for all
    pub verbs: Vec<String>,
    /// Resource plurals, `*` for all
    pub resources: Vec<String>,
    /// Restrict to these object names
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
}

impl Rule {
    /// Rule granting `verbs` on `resources`.
    pub fn new<V, R>(verbs: V, resources: R) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            verbs: verbs.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            resource_names: Vec::new(),
        }
    }

    /// Restrict the rule to named objects.
    #[must_use]
    pub fn for_names<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the rule grants `verb` on `resource` (and `name`, if the rule
    /// restricts names).
    #[must_use]
    pub fn allows(&self, verb: &str, resource: &str, name: Option<&str>) -> bool {
        let verb_ok = self.verbs.iter().any(|v| v == "*" || v == verb);
        let resource_ok = self.resources.iter().any(|r| r == "*" || r == resource);
        let name_ok = self.resource_names.is_empty()
            || name.is_some_and(|n| self.resource_names.iter().any(|r| r == n));
        verb_ok && resource_ok && name_ok
    }
}

/// A set of rules. Used for global, workspace and namespace roles alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Role {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Rules, evaluated in order
    pub rules: Vec<Rule>,
}

impl Fields for Role {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn field(&self, field: &str) -> Option<Cow<'_, str>> {
        self.metadata.field(field)
    }

    fn matches(&self, field: &str, condition: &Condition) -> bool {
        self.metadata.matches(field, condition)
    }
}

impl Object for Role {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Kind of a binding subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectKind {
    /// A user name
    User,
    /// A group name
    Group,
    /// A service account
    ServiceAccount,
}

/// Who a binding applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject kind
    pub kind: SubjectKind,
    /// Subject name
    pub name: String,
}

impl Subject {
    /// User subject
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.into(),
        }
    }

    /// Group subject
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            name: name.into(),
        }
    }
}

/// Scope of a role, broadest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoleKind {
    /// Cluster-wide
    GlobalRole,
    /// One workspace
    WorkspaceRole,
    /// One namespace
    Role,
}

/// Role a binding grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role scope
    pub kind: RoleKind,
    /// Role name
    pub name: String,
}

/// Grants a role to subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Subjects
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Granted role
    pub role_ref: RoleRef,
}

impl RoleBinding {
    /// Binding `role_ref` to `subjects`.
    pub fn new(metadata: ObjectMeta, role_ref: RoleRef, subjects: Vec<Subject>) -> Self {
        Self {
            metadata,
            subjects,
            role_ref,
        }
    }
}

impl Fields for RoleBinding {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn field(&self, field: &str) -> Option<Cow<'_, str>> {
        self.metadata.field(field)
    }

    fn matches(&self, field: &str, condition: &Condition) -> bool {
        self.metadata.matches(field, condition)
    }
}

impl Object for RoleBinding {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Any other cached object, kept with opaque spec and status.
///
/// `status` matches `status.phase`, falling back to `status.state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericObject {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub spec: serde_json::Value,
    /// Status
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub status: serde_json::Value,
}

impl GenericObject {
    /// Object with empty spec and status.
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: serde_json::Value) -> Self {
        self.status = status;
        self
    }

    /// String value at `status.<key>`.
    #[must_use]
    pub fn status_str(&self, key: &str) -> Option<&str> {
        self.status.get(key).and_then(serde_json::Value::as_str)
    }
}

impl Fields for GenericObject {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn field(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            fields::STATUS => self
                .status_str("phase")
                .or_else(|| self.status_str("state"))
                .map(Cow::Borrowed),
            _ => self.metadata.field(field),
        }
    }

    fn matches(&self, field: &str, condition: &Condition) -> bool {
        match field {
            fields::STATUS => self
                .field(field)
                .is_some_and(|v| condition.matches_value(&v)),
            _ => self.metadata.matches(field, condition),
        }
    }
}

impl Object for GenericObject {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
