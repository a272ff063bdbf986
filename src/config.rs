//! Configuration manager.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default lifetime of a login token, 24 hours.
pub const DEFAULT_LOGIN_TTL: u64 = 60 * 60 * 24;
/// Default lifetime of a verification or reset link, 10 minutes.
pub const DEFAULT_VERIFY_TTL: u64 = 60 * 10;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Portal the users are redirected to after OAuth or email verification.
    pub portal_url: String,
    favicon: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Which authentication methods are accepted.
    #[serde(default)]
    pub auth: Auth,
    /// Default administrator created on startup.
    #[serde(skip_serializing)]
    pub admin: Option<Admin>,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing, default)]
    pub token: Token,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to GitHub OAuth application.
    #[serde(skip_serializing)]
    pub github: Option<OAuthProvider>,
    /// Related to Google OAuth application.
    #[serde(skip_serializing)]
    pub google: Option<OAuthProvider>,
}

/// Toggles for authentication methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Auth {
    /// Username and password login and signup.
    pub local: bool,
    /// Login with GitHub.
    pub github: bool,
    /// Login with Google.
    pub google: bool,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            local: true,
            github: false,
            google: false,
        }
    }
}

/// Default administrator credentials.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// JWT `alg`, e.g. `HS512`, `RS256` or `ES256`.
    pub algorithm: String,
    /// Shared secret for `HS*` algorithms.
    pub secret: Option<String>,
    pub public_key_pem: Option<String>,
    pub private_key_pem: Option<String>,
    /// Update token audience.
    pub audience: Option<String>,
    /// Login token lifetime in seconds.
    pub login_ttl: u64,
    /// Email verification and password reset link lifetime in seconds.
    pub verify_ttl: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            algorithm: "HS512".into(),
            secret: None,
            public_key_pem: None,
            private_key_pem: None,
            audience: None,
            login_ttl: DEFAULT_LOGIN_TTL,
            verify_ttl: DEFAULT_VERIFY_TTL,
        }
    }
}

/// OAuth application registered on a provider.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct OAuthProvider {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered on the provider.
    pub redirect_url: String,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.as_str().trim_end_matches('/').to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader(file) {
                Ok(config) => config,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        config.version = VERSION.to_owned();
        config.apply_env();

        if !config.url.is_empty() {
            config.url = self.normalize_url(&config.url)?;
        }
        if !config.portal_url.is_empty() {
            config.portal_url = self.normalize_url(&config.portal_url)?;
        }
        config.favicon = config
            .favicon
            .map(|f| self.normalize_url(&f))
            .transpose()?;

        Ok(Arc::new(config))
    }

    /// Secrets may be provided by the environment instead of the file.
    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("TOKEN_SECRET") {
            self.token.secret = Some(secret);
        }

        if let (Ok(username), Ok(password)) = (
            std::env::var("ADMIN_USERNAME"),
            std::env::var("ADMIN_PASSWORD"),
        ) {
            self.admin = Some(Admin {
                username,
                password,
                name: self.admin.as_ref().and_then(|a| a.name.clone()),
            });
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    /// Public part of the configuration.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn favicon(&self) -> Option<&str> {
        self.favicon.as_deref()
    }
}
