//! Cached cluster objects
//!
//! A read-only, eventually consistent view of the cluster state the server
//! consumes. Every object exposes its queryable fields through
//! [`query_core::Fields`] so the resource registries can filter and order
//! heterogeneous collections uniformly.

mod snapshot;
mod store;
mod types;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, SecondsFormat, Utc};
use query_core::{Condition, Fields, MatchKind, fields};
use serde::{Deserialize, Serialize};

pub use snapshot::{ObjectCache, Snapshot};
pub use store::{Lister, Selector, Store};
pub use types::{
    GenericObject, Role, RoleBinding, RoleKind, RoleRef, Rule, Subject, SubjectKind, User,
    UserSpec, UserState, UserStatus,
};

/// Label carrying the owning workspace.
pub const LABEL_WORKSPACE: &str = "kubesphere.io/workspace";

/// Annotation carrying a display alias.
pub const ANNOTATION_ALIAS: &str = "kubesphere.io/alias-name";

/// Label naming the identity provider of a linked account.
pub const LABEL_IDENTIFY_PROVIDER: &str = "iam.kubesphere.io/identify-provider";

/// Label carrying the user id at the identity provider.
pub const LABEL_ORIGIN_UID: &str = "iam.kubesphere.io/origin-uid";

/// Role a member holds, set on member listings.
pub const ANNOTATION_ROLE: &str = "iam.kubesphere.io/role";

/// JSON array naming the template roles a role is composed of.
pub const ANNOTATION_AGGREGATION_ROLES: &str = "iam.kubesphere.io/aggregation-roles";

/// Standard object metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name
    pub name: String,
    /// Namespace, empty for cluster-scoped objects
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Creation time
    pub creation_timestamp: DateTime<Utc>,
    /// Labels
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Metadata for a cluster-scoped object.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Metadata for a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::named(name)
        }
    }

    /// Set the creation time.
    #[must_use]
    pub fn created_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = timestamp;
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Owning workspace, if labelled.
    #[must_use]
    pub fn workspace(&self) -> Option<&str> {
        self.labels.get(LABEL_WORKSPACE).map(String::as_str)
    }

    /// Value of a metadata field.
    ///
    /// Timestamps render with a fixed width so they order lexicographically.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            fields::NAME => Some(Cow::Borrowed(&self.name)),
            fields::NAMESPACE if !self.namespace.is_empty() => Some(Cow::Borrowed(&self.namespace)),
            fields::CREATE_TIME | fields::CREATION_TIMESTAMP => Some(Cow::Owned(
                self.creation_timestamp
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            )),
            fields::WORKSPACE => self.workspace().map(Cow::Borrowed),
            fields::ALIAS => self
                .annotations
                .get(ANNOTATION_ALIAS)
                .map(|a| Cow::Borrowed(a.as_str())),
            _ => None,
        }
    }

    /// Match a condition against metadata, including label and annotation
    /// terms.
    #[must_use]
    pub fn matches(&self, field: &str, condition: &Condition) -> bool {
        match field {
            fields::LABEL => matches_map_term(&self.labels, condition),
            fields::ANNOTATION => matches_map_term(&self.annotations, condition),
            _ => self
                .field(field)
                .is_some_and(|value| condition.matches_value(&value)),
        }
    }
}

/// `key=value` compares the value, a bare `key` only checks presence.
fn matches_map_term(map: &BTreeMap<String, String>, condition: &Condition) -> bool {
    match condition.value.split_once('=') {
        Some((key, expected)) => map.get(key).is_some_and(|actual| match condition.kind {
            MatchKind::Exact => actual == expected,
            MatchKind::Fuzzy => actual.contains(expected),
        }),
        None => map.contains_key(condition.value.as_str()),
    }
}

/// A cached cluster object.
pub trait Object: Fields + Debug + Send + Sync {
    /// Object metadata
    fn meta(&self) -> &ObjectMeta;

    /// Wire representation returned to clients.
    fn to_json(&self) -> serde_json::Value;
}
