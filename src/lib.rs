//! DevOps API server core
//!
//! Identity, access control and resource queries for a cluster-management API
//! server.
//!
//! # Features
//!
//! - **Authentication chain**: anonymous, bearer token and password
//!   authenticators with login lockout and account-state checks
//! - **RBAC authorization**: global, workspace and namespace role bindings
//! - **Resource queries**: two registry generations (`v1alpha2`, `v1alpha3`)
//!   with uniform filtering, ordering and pagination
//! - **Credential store**: in-process or Redis backed token records
//! - **DevOps project IAM**: read-only members and roles of a project
//!
//! Request flow: [`authentication`] → [`authorization`] → [`resources`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authentication;
pub mod authorization;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod iam;
pub mod identity;
pub mod objects;
pub mod resources;
pub mod server;
pub mod tenant;

pub use error::{Error, Result};
pub use identity::Identity;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
