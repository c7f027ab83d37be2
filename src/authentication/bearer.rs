use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::warn;

use super::{RequestAuthenticator, bearer_token};
use crate::{Error, Identity, Result};

/// Checks a bearer token and names its owner.
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    /// Identity the token was issued to.
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Authenticates `Authorization: Bearer <token>` requests.
pub struct BearerTokenAuthenticator {
    verifier: Arc<dyn TokenVerifier>,
}

impl BearerTokenAuthenticator {
    /// Authenticator backed by `verifier`.
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait::async_trait]
impl RequestAuthenticator for BearerTokenAuthenticator {
    async fn authenticate_request(&self, headers: &HeaderMap) -> Result<Option<Identity>> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };

        match self.verifier.verify(token).await {
            Ok(identity) => Ok(Some(Identity::named(identity.name))),
            Err(e @ Error::Upstream(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "Rejected bearer token");
                Err(Error::IncorrectCredential)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    struct StaticVerifier;

    #[async_trait::async_trait]
    impl TokenVerifier for StaticVerifier {
        async fn verify(&self, token: &str) -> Result<Identity> {
            match token {
                "good" => Ok(Identity::named("alice").with_group("devs")),
                "down" => Err(Error::Upstream("store unreachable".into())),
                _ => Err(Error::Internal("signature mismatch".into())),
            }
        }
    }

    fn request(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(authorization).unwrap());
        headers
    }

    fn authenticator() -> BearerTokenAuthenticator {
        BearerTokenAuthenticator::new(Arc::new(StaticVerifier))
    }

    #[tokio::test]
    async fn valid_token_yields_name_only() {
        let identity = authenticator()
            .authenticate_request(&request("Bearer good"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity, Identity::named("alice"));
    }

    #[tokio::test]
    async fn rejected_token_is_incorrect_credential() {
        let result = authenticator().authenticate_request(&request("Bearer forged")).await;
        assert!(matches!(result, Err(Error::IncorrectCredential)));
    }

    #[tokio::test]
    async fn store_failures_are_not_masked() {
        let result = authenticator().authenticate_request(&request("Bearer down")).await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn other_schemes_are_not_matched() {
        let result = authenticator()
            .authenticate_request(&request("Basic YWxpY2U6cHc="))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(authenticator()
            .authenticate_request(&HeaderMap::new())
            .await
            .unwrap()
            .is_none());
    }
}
