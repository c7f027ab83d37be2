//! Access token issuance and verification.
//!
//! Tokens are HS256 JWTs. When access tokens have a finite lifetime each
//! issued token is also recorded in the credential store, so removing the
//! record revokes the token before it expires.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::TokenVerifier;
use crate::cache::{CacheClient, bounded};
use crate::config::AuthenticationOptions;
use crate::{Error, Identity, Result};

/// Credential store key recording an issued token.
#[must_use]
pub fn token_key(username: &str, token: &str) -> String {
    format!("kubesphere:user:{username}:token:{token}")
}

/// `value` with glob metacharacters bracketed so it only matches itself.
///
/// Bracket classes are understood by both the in-process store and Redis.
fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' | '?' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Kind of token carried in the claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Bearer access token
    AccessToken,
}

/// JWT claims of an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User name
    #[serde(rename = "sub")]
    pub username: String,
    /// Token kind
    pub token_type: TokenType,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiry (Unix seconds); absent for non-expiring tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Issuer
    pub iss: String,
}

/// Signs and checks tokens with a shared secret.
pub struct TokenIssuer {
    issuer: String,
    max_age: Duration,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Issuer signing with `secret`. A zero `max_age` issues non-expiring
    /// tokens.
    pub fn new(secret: &str, issuer: impl Into<String>, max_age: Duration) -> Self {
        Self {
            issuer: issuer.into(),
            max_age,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issuer configured from authentication options.
    #[must_use]
    pub fn from_options(options: &AuthenticationOptions) -> Self {
        Self::new(
            &options.jwt_secret,
            options.issuer.clone(),
            options.access_token_max_age,
        )
    }

    /// Lifetime of issued tokens.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Sign a new access token for `username`.
    pub fn issue(&self, username: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let claims = Claims {
            username: username.to_string(),
            token_type: TokenType::AccessToken,
            iat: now,
            exp: (!self.max_age.is_zero()).then(|| now + self.max_age.as_secs()),
            iss: self.issuer.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign token: {e}")))
    }

    /// Check signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;
        if self.max_age.is_zero() {
            validation.required_spec_claims.clear();
        }
        self.decode(token, &validation)
    }

    /// Check the signature only, ignoring expiry and issuer.
    pub fn verify_without_claims_validation(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;
        self.decode(token, &validation)
    }

    fn decode(&self, token: &str, validation: &Validation) -> Result<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Token verification failed");
                Error::IncorrectCredential
            })
    }
}

/// Access token handed back by the token endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    /// The signed token
    pub access_token: String,
    /// Always `"Bearer"`
    pub token_type: String,
    /// Seconds until expiry, omitted for non-expiring tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Issues, verifies and revokes tokens against the credential store.
pub struct TokenOperator {
    issuer: Arc<TokenIssuer>,
    cache: Arc<dyn CacheClient>,
    multiple_login: bool,
    store_timeout: Duration,
}

impl TokenOperator {
    /// Operator using `issuer` and `cache`.
    pub fn new(
        issuer: Arc<TokenIssuer>,
        cache: Arc<dyn CacheClient>,
        options: &AuthenticationOptions,
    ) -> Self {
        Self {
            issuer,
            cache,
            multiple_login: options.multiple_login,
            store_timeout: options.store_timeout,
        }
    }

    /// Issue an access token to `user`.
    ///
    /// With single login, previously issued tokens are revoked first.
    pub async fn issue_to(&self, user: &Identity) -> Result<IssuedToken> {
        let access_token = self.issuer.issue(&user.name)?;
        let max_age = self.issuer.max_age();

        if !max_age.is_zero() {
            if !self.multiple_login {
                self.revoke_all(&user.name).await?;
            }
            bounded(
                self.store_timeout,
                self.cache.set(
                    &token_key(&user.name, &access_token),
                    &access_token,
                    Some(max_age),
                ),
            )
            .await?;
        }

        info!(user = %user.name, "Issued access token");
        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: (!max_age.is_zero()).then(|| max_age.as_secs()),
        })
    }

    /// Remove every recorded token of `username`.
    pub async fn revoke_all(&self, username: &str) -> Result<usize> {
        let pattern = format!("{}*", token_key(&escape_glob(username), ""));
        let keys = bounded(self.store_timeout, self.cache.keys(&pattern)).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = bounded(self.store_timeout, self.cache.del(&keys)).await?;
        debug!(user = %username, count = removed, "Revoked tokens");
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl TokenVerifier for TokenOperator {
    async fn verify(&self, token: &str) -> Result<Identity> {
        let claims = self.issuer.verify(token)?;

        if !self.issuer.max_age().is_zero() {
            let key = token_key(&claims.username, token);
            let recorded = bounded(self.store_timeout, self.cache.exists(&[key])).await?;
            if !recorded {
                debug!(user = %claims.username, "Token not found in credential store");
                return Err(Error::IncorrectCredential);
            }
        }

        Ok(Identity::named(claims.username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SimpleCache;

    fn options(max_age: Duration, multiple_login: bool) -> AuthenticationOptions {
        AuthenticationOptions {
            jwt_secret: "test-secret".to_string(),
            access_token_max_age: max_age,
            multiple_login,
            ..AuthenticationOptions::default()
        }
    }

    fn operator(opts: &AuthenticationOptions) -> (TokenOperator, Arc<SimpleCache>) {
        let cache = Arc::new(SimpleCache::new());
        let issuer = Arc::new(TokenIssuer::from_options(opts));
        let operator = TokenOperator::new(issuer, Arc::clone(&cache) as Arc<dyn CacheClient>, opts);
        (operator, cache)
    }

    #[test]
    fn issued_token_verifies() {
        let issuer = TokenIssuer::new("secret", "kubesphere", Duration::from_secs(60));
        let token = issuer.issue("alice").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.token_type, TokenType::AccessToken);
        assert!(claims.exp.is_some());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = TokenIssuer::new("secret", "kubesphere", Duration::from_secs(60));
        let other = TokenIssuer::new("other", "kubesphere", Duration::from_secs(60));
        let token = other.issue("alice").unwrap();
        assert!(matches!(issuer.verify(&token), Err(Error::IncorrectCredential)));
        assert!(issuer.verify_without_claims_validation(&token).is_err());
        assert!(issuer.verify("not-a-jwt").is_err());
    }

    #[test]
    fn non_expiring_tokens_carry_no_exp() {
        let issuer = TokenIssuer::new("secret", "kubesphere", Duration::ZERO);
        let token = issuer.issue("alice").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert!(claims.exp.is_none());
    }

    #[test]
    fn claims_skipping_verification_ignores_issuer() {
        let foreign = TokenIssuer::new("secret", "someone-else", Duration::from_secs(60));
        let issuer = TokenIssuer::new("secret", "kubesphere", Duration::from_secs(60));
        let token = foreign.issue("alice").unwrap();

        assert!(issuer.verify(&token).is_err());
        let claims = issuer.verify_without_claims_validation(&token).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn issued_tokens_are_recorded_and_revocable() {
        // GIVEN: an operator with finite token lifetime
        let opts = options(Duration::from_secs(3600), true);
        let (operator, _cache) = operator(&opts);

        // WHEN: a token is issued
        let issued = operator.issue_to(&Identity::named("alice")).await.unwrap();
        assert_eq!(issued.expires_in, Some(3600));

        // THEN: it verifies until revoked
        let identity = operator.verify(&issued.access_token).await.unwrap();
        assert_eq!(identity.name, "alice");

        assert_eq!(operator.revoke_all("alice").await.unwrap(), 1);
        assert!(matches!(
            operator.verify(&issued.access_token).await,
            Err(Error::IncorrectCredential)
        ));
    }

    #[test]
    fn glob_metacharacters_are_bracketed() {
        assert_eq!(escape_glob("alice"), "alice");
        assert_eq!(escape_glob("a*b?[c]"), "a[*]b[?][[]c]");
    }

    #[tokio::test]
    async fn revoke_all_matches_the_literal_username() {
        // GIVEN: tokens for "a*" and for a user the unescaped pattern would match
        let opts = options(Duration::from_secs(3600), true);
        let (operator, cache) = operator(&opts);
        cache.set(&token_key("a*", "t1"), "t1", None).await.unwrap();
        cache.set(&token_key("ab", "t2"), "t2", None).await.unwrap();
        cache.set(&token_key("a?", "t3"), "t3", None).await.unwrap();

        // WHEN: every token of "a*" is revoked
        let removed = operator.revoke_all("a*").await.unwrap();

        // THEN: the other users keep theirs
        assert_eq!(removed, 1);
        assert!(cache.get(&token_key("ab", "t2")).await.unwrap().is_some());
        assert!(cache.get(&token_key("a?", "t3")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn single_login_revokes_previous_tokens() {
        // GIVEN: multiple login disabled and a token already held
        let opts = options(Duration::from_secs(3600), false);
        let (operator, cache) = operator(&opts);
        cache
            .set(&token_key("alice", "stale"), "stale", None)
            .await
            .unwrap();

        // WHEN: a new token is issued
        let issued = operator.issue_to(&Identity::named("alice")).await.unwrap();

        // THEN: only the new one is recorded
        let keys = cache.keys(&token_key("alice", "*")).await.unwrap();
        assert_eq!(keys, vec![token_key("alice", &issued.access_token)]);
    }

    #[tokio::test]
    async fn non_expiring_tokens_skip_the_store() {
        let opts = options(Duration::ZERO, true);
        let (operator, cache) = operator(&opts);

        let issued = operator.issue_to(&Identity::named("alice")).await.unwrap();
        assert!(issued.expires_in.is_none());
        assert!(cache.keys("*").await.unwrap().is_empty());
        assert_eq!(operator.verify(&issued.access_token).await.unwrap().name, "alice");
    }
}
