//! Username/password authentication against cached user records.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::cache::{CacheClient, bounded};
use crate::config::AuthenticationOptions;
use crate::identity::EXTRA_UNINITIALIZED;
use crate::objects::{LABEL_IDENTIFY_PROVIDER, LABEL_ORIGIN_UID, Lister, Selector, User, UserState};
use crate::{Error, Identity, Result};

/// Credential store key counting failed logins of `username`.
#[must_use]
pub fn failed_login_key(username: &str) -> String {
    format!("kubesphere:authfailedlog:{username}")
}

fn is_email(username: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s<>]+@[^@\s<>]+$").expect("static regex"))
        .is_match(username)
}

/// Verifies passwords and applies the login lockout.
pub struct PasswordAuthenticator {
    users: Arc<dyn Lister<User>>,
    cache: Arc<dyn CacheClient>,
    max_tries: u32,
    lockout_window: Duration,
    store_timeout: Duration,
}

impl PasswordAuthenticator {
    /// Authenticator over `users`, counting failures in `cache`.
    pub fn new(
        users: Arc<dyn Lister<User>>,
        cache: Arc<dyn CacheClient>,
        options: &AuthenticationOptions,
    ) -> Self {
        Self {
            users,
            cache,
            max_tries: options.authenticate_rate_limiter_max_tries,
            lockout_window: options.authenticate_rate_limiter_duration,
            store_timeout: options.store_timeout,
        }
    }

    /// Check `password` for `username`, which may also be an email address.
    ///
    /// Unknown users, wrong passwords and accounts without a password all
    /// fail with [`Error::IncorrectCredential`].
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Identity> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::IncorrectCredential);
        }

        let Some(user) = self.lookup(username) else {
            debug!(user = %username, "Login for unknown user");
            return Err(Error::IncorrectCredential);
        };
        let name = user.metadata.name.clone();

        match user.status.state {
            Some(UserState::Active) => {}
            Some(UserState::AuthLimitExceeded) => return Err(Error::RateLimitExceeded),
            _ => return Err(Error::AccountNotActive),
        }

        if self.locked_out(&name).await? {
            warn!(user = %name, "Login rejected, too many failed attempts");
            return Err(Error::RateLimitExceeded);
        }

        if user.spec.encrypted_password.is_empty() {
            return Err(Error::IncorrectCredential);
        }

        if !verify_password(password, &user.spec.encrypted_password).await? {
            warn!(user = %name, "Incorrect password");
            self.record_failure(&name).await?;
            return Err(Error::IncorrectCredential);
        }

        self.clear_failures(&name).await?;

        let mut identity = Identity::named(name);
        if let Some(value) = user.metadata.annotations.get(EXTRA_UNINITIALIZED) {
            identity = identity.with_extra(EXTRA_UNINITIALIZED, value.clone());
        }
        Ok(identity)
    }

    /// The single user linked to `uid` at identity provider `idp`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] unless exactly one user matches.
    pub fn find_linked_account(&self, idp: &str, uid: &str) -> Result<Arc<User>> {
        let selector = Selector::everything()
            .with_label(LABEL_IDENTIFY_PROVIDER, idp)
            .with_label(LABEL_ORIGIN_UID, uid);
        let mut users = self.users.list("", &selector);
        if users.len() == 1 {
            if let Some(user) = users.pop() {
                return Ok(user);
            }
        }
        debug!(idp, uid, matches = users.len(), "No unique linked account");
        Err(Error::not_found("users", format!("{idp}/{uid}")))
    }

    fn lookup(&self, username: &str) -> Option<Arc<User>> {
        if is_email(username) {
            self.users
                .list("", &Selector::everything())
                .into_iter()
                .find(|u| u.spec.email == username)
        } else {
            self.users.get_by_key("", username)
        }
    }

    async fn locked_out(&self, name: &str) -> Result<bool> {
        if self.max_tries == 0 {
            return Ok(false);
        }
        let count = bounded(self.store_timeout, self.cache.get(&failed_login_key(name)))
            .await?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        Ok(count >= self.max_tries)
    }

    async fn record_failure(&self, name: &str) -> Result<()> {
        if self.max_tries == 0 {
            return Ok(());
        }
        let key = failed_login_key(name);
        let count = bounded(self.store_timeout, self.cache.incr(&key)).await?;
        if count == 1 && !self.lockout_window.is_zero() {
            bounded(self.store_timeout, self.cache.expire(&key, self.lockout_window)).await?;
        }
        debug!(user = %name, failures = count, "Recorded failed login");
        Ok(())
    }

    async fn clear_failures(&self, name: &str) -> Result<()> {
        if self.max_tries == 0 {
            return Ok(());
        }
        bounded(self.store_timeout, self.cache.del(&[failed_login_key(name)])).await?;
        Ok(())
    }
}

/// bcrypt comparison on the blocking pool. A malformed hash counts as a
/// mismatch.
async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| Error::Internal(format!("password verification task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SimpleCache;
    use crate::objects::{ObjectMeta, Store};

    fn hash(password: &str) -> String {
        bcrypt::hash(password, 4).unwrap()
    }

    fn options(max_tries: u32) -> AuthenticationOptions {
        AuthenticationOptions {
            jwt_secret: "secret".to_string(),
            authenticate_rate_limiter_max_tries: max_tries,
            ..AuthenticationOptions::default()
        }
    }

    fn authenticator(users: Vec<User>, max_tries: u32) -> (PasswordAuthenticator, Arc<SimpleCache>) {
        let store = Arc::new(Store::new());
        store.replace(users);
        let cache = Arc::new(SimpleCache::new());
        let auth = PasswordAuthenticator::new(
            store,
            Arc::clone(&cache) as Arc<dyn CacheClient>,
            &options(max_tries),
        );
        (auth, cache)
    }

    #[test]
    fn email_detection() {
        assert!(is_email("alice@example.com"));
        assert!(!is_email("alice"));
        assert!(!is_email("a@b@c"));
        assert!(!is_email("@example.com"));
    }

    #[tokio::test]
    async fn correct_password_authenticates() {
        let (auth, _) = authenticator(vec![User::active("alice", hash("pw1"))], 0);
        let identity = auth.authenticate("alice", "pw1").await.unwrap();
        assert_eq!(identity, Identity::named("alice"));
    }

    #[tokio::test]
    async fn email_login_resolves_the_account_name() {
        let (auth, _) = authenticator(
            vec![
                User::active("bob", hash("other")).with_email("bob@example.com"),
                User::active("alice", hash("pw1")).with_email("alice@example.com"),
            ],
            0,
        );
        let identity = auth.authenticate("alice@example.com", "pw1").await.unwrap();
        assert_eq!(identity.name, "alice");
    }

    #[tokio::test]
    async fn uninitialized_annotation_is_copied_to_extra() {
        let mut user = User::active("carol", hash("pw"));
        user.metadata = ObjectMeta::named("carol").with_annotation(EXTRA_UNINITIALIZED, "true");
        let (auth, _) = authenticator(vec![user], 0);

        let identity = auth.authenticate("carol", "pw").await.unwrap();
        assert_eq!(identity.extra[EXTRA_UNINITIALIZED], vec!["true"]);
    }

    #[tokio::test]
    async fn account_state_is_checked_before_the_password() {
        let (auth, _) = authenticator(
            vec![
                User::active("locked", hash("pw")).with_state(Some(UserState::AuthLimitExceeded)),
                User::active("disabled", hash("pw")).with_state(Some(UserState::Disabled)),
                User::active("pending", hash("pw")).with_state(None),
            ],
            0,
        );

        assert!(matches!(
            auth.authenticate("locked", "wrong").await,
            Err(Error::RateLimitExceeded)
        ));
        assert!(matches!(
            auth.authenticate("disabled", "pw").await,
            Err(Error::AccountNotActive)
        ));
        assert!(matches!(
            auth.authenticate("pending", "pw").await,
            Err(Error::AccountNotActive)
        ));
    }

    #[tokio::test]
    async fn missing_or_malformed_hash_is_incorrect() {
        let (auth, _) = authenticator(
            vec![User::active("nohash", ""), User::active("garbage", "not-a-bcrypt-hash")],
            0,
        );
        assert!(matches!(
            auth.authenticate("nohash", "pw").await,
            Err(Error::IncorrectCredential)
        ));
        assert!(matches!(
            auth.authenticate("garbage", "pw").await,
            Err(Error::IncorrectCredential)
        ));
    }

    #[tokio::test]
    async fn lockout_after_max_tries() {
        // GIVEN: a lockout after two failures
        let (auth, cache) = authenticator(vec![User::active("alice", hash("pw1"))], 2);

        // WHEN: the wrong password is tried twice
        for _ in 0..2 {
            assert!(matches!(
                auth.authenticate("alice", "bad").await,
                Err(Error::IncorrectCredential)
            ));
        }

        // THEN: even the right password is refused
        assert!(matches!(
            auth.authenticate("alice", "pw1").await,
            Err(Error::RateLimitExceeded)
        ));
        assert_eq!(
            cache.get(&failed_login_key("alice")).await.unwrap().as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn success_clears_failure_counter() {
        let (auth, cache) = authenticator(vec![User::active("alice", hash("pw1"))], 3);

        assert!(auth.authenticate("alice", "bad").await.is_err());
        assert!(auth.authenticate("alice", "pw1").await.is_ok());
        assert!(cache.get(&failed_login_key("alice")).await.unwrap().is_none());
    }

    #[test]
    fn linked_account_requires_exactly_one_match() {
        let linked = |name: &str, uid: &str| {
            let mut user = User::active(name, "");
            user.metadata = ObjectMeta::named(name)
                .with_label(LABEL_IDENTIFY_PROVIDER, "github")
                .with_label(LABEL_ORIGIN_UID, uid);
            user
        };
        let (auth, _) = authenticator(
            vec![linked("alice", "100"), linked("dup-1", "200"), linked("dup-2", "200")],
            0,
        );

        assert_eq!(auth.find_linked_account("github", "100").unwrap().metadata.name, "alice");
        assert!(matches!(
            auth.find_linked_account("github", "200"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            auth.find_linked_account("gitlab", "100"),
            Err(Error::NotFound { .. })
        ));
    }
}
