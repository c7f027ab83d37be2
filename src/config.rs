//! Configuration management

use std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default configuration file name, looked up next to the binary's working
/// directory and under `/etc/kubesphere`.
pub const DEFAULT_CONFIGURATION_FILE_NAME: &str = "kubesphere.yaml";

/// Default configuration directory
pub const DEFAULT_CONFIGURATION_PATH: &str = "/etc/kubesphere";

/// How requests are expected to authenticate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Bearer tokens issued by this server
    #[default]
    Token,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Environment files loaded into the process environment before use.
    pub env_files: Vec<String>,
    /// Listener configuration
    pub server: ServerConfig,
    /// Authentication mode
    pub auth_mode: AuthMode,
    /// Authentication options
    pub authentication: Option<AuthenticationOptions>,
    /// Shared credential store. Absent means in-process.
    pub redis: Option<RedisOptions>,
    /// Source of the cached cluster objects
    pub kubernetes: Option<KubernetesOptions>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_files: Vec::new(),
            server: ServerConfig::default(),
            auth_mode: AuthMode::Token,
            authentication: Some(AuthenticationOptions::default()),
            redis: None,
            kubernetes: Some(KubernetesOptions::default()),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

/// Authentication options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthenticationOptions {
    /// HMAC secret for issued tokens
    // Environment keys arrive lowercased
    #[serde(alias = "jwtsecret")]
    pub jwt_secret: String,
    /// `iss` claim of issued tokens
    pub issuer: String,
    /// Lifetime of access tokens; zero means they never expire
    #[serde(with = "humantime_serde")]
    pub access_token_max_age: Duration,
    /// Allow several live tokens per user
    pub multiple_login: bool,
    /// Failed logins tolerated within the window; zero disables the lockout
    pub authenticate_rate_limiter_max_tries: u32,
    /// Window for counting failed logins
    #[serde(with = "humantime_serde")]
    pub authenticate_rate_limiter_duration: Duration,
    /// Upper bound on any single credential store call
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,
}

impl Default for AuthenticationOptions {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "kubesphere".to_string(),
            access_token_max_age: Duration::from_secs(2 * 60 * 60),
            multiple_login: true,
            authenticate_rate_limiter_max_tries: 10,
            authenticate_rate_limiter_duration: Duration::from_secs(10 * 60),
            store_timeout: Duration::from_secs(3),
        }
    }
}

/// Networked credential store options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisOptions {
    /// Host name; `FAKE` selects the in-process store in debug mode
    pub host: String,
    /// Port
    pub port: u16,
    /// Password, may be empty
    pub password: String,
    /// Database index
    pub db: i64,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 6379,
            password: String::new(),
            db: 0,
        }
    }
}

impl RedisOptions {
    /// Connection URL for the `redis` client
    #[must_use]
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

/// Options for the cluster object cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KubernetesOptions {
    /// YAML snapshot the in-process cache is seeded from
    pub snapshot: Option<PathBuf>,
    /// How long startup waits for the cache to sync
    #[serde(with = "humantime_serde")]
    pub sync_timeout: Duration,
}

impl Default for KubernetesOptions {
    fn default() -> Self {
        Self {
            snapshot: None,
            sync_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        } else {
            for dir in [Path::new(DEFAULT_CONFIGURATION_PATH), Path::new(".")] {
                let candidate = dir.join(DEFAULT_CONFIGURATION_FILE_NAME);
                if candidate.exists() {
                    tracing::debug!(path = %candidate.display(), "Using default configuration file");
                    figment = figment.merge(Yaml::file(candidate));
                    break;
                }
            }
        }

        // Env files listed in the file feed the environment provider below
        let env_files: Vec<String> = figment.extract_inner("envFiles").unwrap_or_default();
        load_env_files(&env_files);

        figment
            .merge(Env::prefixed("DEVOPS_APISERVER_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Check the settings the server cannot start without
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when token mode has no signing secret.
    pub fn validate(&self) -> Result<()> {
        match self.auth_mode {
            AuthMode::Token => {
                let has_secret = self
                    .authentication
                    .as_ref()
                    .is_some_and(|a| !a.jwt_secret.is_empty());
                if !has_secret {
                    return Err(Error::Config(
                        "authMode 'token' requires authentication.jwtSecret".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Authentication options, falling back to defaults
    #[must_use]
    pub fn authentication_options(&self) -> AuthenticationOptions {
        self.authentication.clone().unwrap_or_default()
    }

    /// Which optional sections are configured, without exposing their values.
    ///
    /// Only the sections listed here are ever reported.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("authentication", self.authentication.is_some()),
            ("kubernetes", self.kubernetes.is_some()),
            ("redis", self.redis.is_some()),
        ])
    }
}

/// Load environment files into the process environment.
/// Supports ~ expansion. Files that don't exist are silently skipped and
/// variables already set are left alone.
fn load_env_files(paths: &[String]) {
    for path_str in paths {
        let expanded = match (path_str.strip_prefix('~'), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => format!("{home}{rest}"),
            _ => path_str.clone(),
        };

        let path = Path::new(&expanded);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        } else {
            tracing::debug!("Env file not found (skipped): {expanded}");
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "2h", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            hours.parse::<u64>().map(|h| Duration::from_secs(h * 3600))
        } else {
            // Assume seconds
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}
