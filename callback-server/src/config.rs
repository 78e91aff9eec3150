//! Configuration module for environment variable parsing.
//!
//! [`Config`] is the raw, env-shaped view used by the binary. The server core
//! only ever sees a validated [`ServerConfig`].

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Slack requires a response within 3000 ms; dispatch gets roughly 80% of it.
pub const DEFAULT_DISPATCH_DEADLINE: Duration = Duration::from_millis(2500);

/// Must stay above the dispatch deadline so draining never cuts a request off.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Requests signed further than this from the local clock are rejected.
pub const DEFAULT_SIGNATURE_MAX_AGE: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_CALLBACK_PATH: &str = "/";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SLACK_SIGNING_SECRET is not set")]
    MissingSecret,

    #[error("dispatch deadline must be greater than zero")]
    ZeroDeadline,

    #[error("shutdown grace ({grace:?}) must exceed the dispatch deadline ({deadline:?})")]
    GraceTooShort { grace: Duration, deadline: Duration },

    #[error("callback path must start with '/': {0:?}")]
    InvalidPath(String),

    #[error("max body size must be greater than zero")]
    ZeroBodyLimit,

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
}

/// Slack signing secret.
///
/// Never printed: `Debug` is redacted so the secret can't leak through
/// structured logs of a config value.
#[derive(Clone)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// PEM certificate chain and private key, provisioned outside this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Validated settings consumed by [`crate::web::CallbackServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub secret: SigningSecret,
    pub path: String,
    pub dispatch_deadline: Duration,
    pub shutdown_grace: Duration,
    pub signature_max_age: Duration,
    pub max_body_bytes: usize,
    /// Serve HTTPS with these files; plain HTTP when unset
    pub tls: Option<TlsFiles>,
}

impl ServerConfig {
    /// Settings with every tunable at its default.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SigningSecret::new(secret),
            path: DEFAULT_CALLBACK_PATH.to_string(),
            dispatch_deadline: DEFAULT_DISPATCH_DEADLINE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            signature_max_age: DEFAULT_SIGNATURE_MAX_AGE,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            tls: None,
        }
    }

    pub fn with_dispatch_deadline(mut self, deadline: Duration) -> Self {
        self.dispatch_deadline = deadline;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_tls(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsFiles {
            cert: cert.into(),
            key: key.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.dispatch_deadline.is_zero() {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.shutdown_grace <= self.dispatch_deadline {
            return Err(ConfigError::GraceTooShort {
                grace: self.shutdown_grace,
                deadline: self.dispatch_deadline,
            });
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }
        Ok(())
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Slack app signing secret
    pub signing_secret: Option<SigningSecret>,

    /// Port for the web server to listen on
    pub port: u16,

    /// Route the interaction callbacks are posted to
    pub callback_path: String,

    /// Time budget for the interaction handler in milliseconds
    pub callback_deadline_ms: u64,

    /// Drain period for in-flight requests on shutdown in milliseconds
    pub shutdown_grace_ms: u64,

    /// Maximum age in seconds for Slack request timestamps
    pub signature_max_age: u64,

    /// Upper bound on the request body size
    pub max_body_bytes: usize,

    /// PEM certificate chain for HTTPS
    pub tls_cert_path: Option<String>,

    /// PEM private key for HTTPS
    pub tls_key_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            signing_secret: var("SLACK_SIGNING_SECRET").map(SigningSecret::new),

            port: parse_or(&var, "PORT", 8080),

            callback_path: var("CALLBACK_PATH")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CALLBACK_PATH.to_string()),

            callback_deadline_ms: parse_or(
                &var,
                "CALLBACK_DEADLINE_MS",
                DEFAULT_DISPATCH_DEADLINE.as_millis() as u64,
            ),

            shutdown_grace_ms: parse_or(
                &var,
                "SHUTDOWN_GRACE_MS",
                DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            ),

            signature_max_age: parse_or(
                &var,
                "SLACK_SIGNATURE_MAX_AGE",
                DEFAULT_SIGNATURE_MAX_AGE.as_secs(),
            ),

            max_body_bytes: parse_or(&var, "MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),

            tls_cert_path: var("TLS_CERT_PATH").filter(|p| !p.trim().is_empty()),

            tls_key_path: var("TLS_KEY_PATH").filter(|p| !p.trim().is_empty()),
        }
    }

    /// Validate into the settings the server core runs with.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let secret = self
            .signing_secret
            .clone()
            .ok_or(ConfigError::MissingSecret)?;

        let tls = match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let config = ServerConfig {
            secret,
            path: self.callback_path.clone(),
            dispatch_deadline: Duration::from_millis(self.callback_deadline_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            signature_max_age: Duration::from_secs(self.signature_max_age),
            max_body_bytes: self.max_body_bytes,
            tls,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parse a variable, falling back to the default when unset or invalid.
fn parse_or<F, T>(var: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = var(name) else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}
