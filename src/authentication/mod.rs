//! Authentication
//!
//! Turns an inbound request into an [`Identity`]:
//!
//! - [`AnonymousAuthenticator`]: requests without an `Authorization` header
//! - [`BearerTokenAuthenticator`]: `Authorization: Bearer <token>`
//! - [`PasswordAuthenticator`]: username/password logins at the token endpoint
//!
//! [`AuthenticatorChain`] runs the request authenticators in order and stops
//! at the first match.

mod anonymous;
mod bearer;
mod password;
mod token;

use std::sync::Arc;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use tracing::debug;

pub use anonymous::AnonymousAuthenticator;
pub use bearer::{BearerTokenAuthenticator, TokenVerifier};
pub use password::{PasswordAuthenticator, failed_login_key};
pub use token::{Claims, IssuedToken, TokenIssuer, TokenOperator, TokenType, token_key};

use crate::{Identity, Result};

/// Authenticates one inbound request.
#[async_trait::async_trait]
pub trait RequestAuthenticator: Send + Sync + 'static {
    /// `Ok(Some(_))` when the request matched, `Ok(None)` when this
    /// authenticator does not apply, `Err(_)` when it applied and failed.
    async fn authenticate_request(&self, headers: &HeaderMap) -> Result<Option<Identity>>;
}

/// Ordered list of request authenticators.
#[derive(Clone, Default)]
pub struct AuthenticatorChain {
    authenticators: Vec<Arc<dyn RequestAuthenticator>>,
}

impl AuthenticatorChain {
    /// Empty chain; nothing ever matches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an authenticator.
    #[must_use]
    pub fn with(mut self, authenticator: Arc<dyn RequestAuthenticator>) -> Self {
        self.authenticators.push(authenticator);
        self
    }

    /// Number of registered authenticators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authenticators.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }
}

#[async_trait::async_trait]
impl RequestAuthenticator for AuthenticatorChain {
    async fn authenticate_request(&self, headers: &HeaderMap) -> Result<Option<Identity>> {
        let mut first_error = None;
        for authenticator in &self.authenticators {
            match authenticator.authenticate_request(headers).await {
                Ok(Some(identity)) => {
                    debug!(user = %identity.name, "Request authenticated");
                    return Ok(Some(identity));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "Authenticator rejected request");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Token from `Authorization: Bearer <token>`. The scheme is matched
/// case-insensitively.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
