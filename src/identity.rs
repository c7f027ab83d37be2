//! Authenticated request identity.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// User name assigned to requests without credentials.
pub const ANONYMOUS: &str = "anonymous";

/// Group every identity produced by the chain belongs to.
pub const ALL_AUTHENTICATED: &str = "system:authenticated";

/// Extra key marking an account that has never completed first login.
pub const EXTRA_UNINITIALIZED: &str = "iam.kubesphere.io/uninitialized";

/// Who is making a request.
///
/// Built once per request by the authentication chain and never mutated
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User name
    pub name: String,
    /// Group memberships
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub groups: BTreeSet<String>,
    /// Additional attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl Identity {
    /// Identity carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The identity given to requests without an `Authorization` header.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::named(ANONYMOUS).with_group(ALL_AUTHENTICATED)
    }

    /// Add a group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Append a value under an extra key.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Whether this is the anonymous identity.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.name == ANONYMOUS
    }
}
