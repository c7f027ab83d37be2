//! Authorization
//!
//! Decides whether an identity may perform a verb on a resource within a
//! scope. [`RbacAuthorizer`] aggregates role bindings from the object cache;
//! decisions are recomputed on every call.

mod rbac;

use std::fmt;

use serde::Serialize;

pub use rbac::RbacAuthorizer;

use crate::{Identity, Result};

/// Where an action takes place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum Scope {
    /// Cluster-wide
    Cluster,
    /// Inside a workspace
    Workspace(String),
    /// Inside a namespace
    Namespace(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Workspace(ws) => write!(f, "workspace/{ws}"),
            Self::Namespace(ns) => write!(f, "namespace/{ns}"),
        }
    }
}

/// The action being authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    /// Who
    pub user: Identity,
    /// Verb, e.g. `get` or `list`
    pub verb: String,
    /// Resource plural
    pub resource: String,
    /// Specific object, if any
    pub resource_name: Option<String>,
    /// Where
    pub scope: Scope,
}

impl Attributes {
    /// `user` performing `verb` on `resource` in `scope`.
    pub fn new(
        user: Identity,
        verb: impl Into<String>,
        resource: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            user,
            verb: verb.into(),
            resource: resource.into(),
            resource_name: None,
            scope,
        }
    }

    /// Narrow to one named object.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Permitted
    Allow,
    /// Not permitted
    Deny,
}

/// Verdict plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Allow or deny
    pub verdict: Verdict,
    /// Why
    pub reason: String,
}

impl Decision {
    /// Allow with `reason`
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: reason.into(),
        }
    }

    /// Deny with `reason`
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason: reason.into(),
        }
    }

    /// Whether the action is permitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }
}

/// Makes authorization decisions.
pub trait Authorizer: Send + Sync {
    /// Decide on `attributes`.
    fn authorize(&self, attributes: &Attributes) -> Result<Decision>;
}
