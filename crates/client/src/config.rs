//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_API_URL` - Base URL of the storefront backend
//!
//! ## Optional
//! - `STOREFRONT_API_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `STOREFRONT_CSRF_HEADER` - Header carrying the CSRF token (default: X-CSRFToken)
//! - `STOREFRONT_CSRF_COOKIE` - Cookie the backend stores the token in (default: csrftoken)
//! - `STOREFRONT_LOGIN_PATH` - Login view protected views redirect to (default: /login)
//! - `GOOGLE_CLIENT_ID` - Enables Google sign-in when set
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::time::Duration;

use reqwest::header::HeaderName;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend API
    pub api_url: Url,
    /// Per-request timeout
    pub api_timeout: Duration,
    /// Header name for the CSRF token on mutating requests
    pub csrf_header: HeaderName,
    /// Cookie name the backend uses for the CSRF token
    pub csrf_cookie: String,
    /// Path of the login view
    pub login_path: String,
    /// Google OAuth client ID; third-party sign-in is disabled without it
    pub google_client_id: Option<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production", "staging")
    pub sentry_environment: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url("STOREFRONT_API_URL", &get_required_env("STOREFRONT_API_URL")?)?;
        let timeout_secs = get_env_or_default("STOREFRONT_API_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_API_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_API_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let csrf_header = get_env_or_default("STOREFRONT_CSRF_HEADER", "X-CSRFToken")
            .parse::<HeaderName>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_CSRF_HEADER".to_string(), e.to_string())
            })?;
        let login_path = get_env_or_default("STOREFRONT_LOGIN_PATH", "/login");
        if !login_path.starts_with('/') {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_LOGIN_PATH".to_string(),
                "must be an absolute path".to_string(),
            ));
        }

        Ok(Self {
            api_url,
            api_timeout: Duration::from_secs(timeout_secs),
            csrf_header,
            csrf_cookie: get_env_or_default("STOREFRONT_CSRF_COOKIE", "csrftoken"),
            login_path,
            google_client_id: get_optional_env("GOOGLE_CLIENT_ID"),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration with defaults for everything but the API URL.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            api_timeout: Duration::from_secs(30),
            csrf_header: HeaderName::from_static("x-csrftoken"),
            csrf_cookie: "csrftoken".to_string(),
            login_path: "/login".to_string(),
            google_client_id: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Whether third-party (Google) sign-in is available.
    #[must_use]
    pub fn external_login_enabled(&self) -> bool {
        self.google_client_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }

    /// Configuration pointing at a non-routable test host.
    #[cfg(any(test, feature = "testing"))]
    #[must_use]
    pub fn for_tests() -> Self {
        let mut config =
            Self::new(Url::parse("http://storefront.test/").expect("static test URL parses"));
        config.google_client_id = Some("test-client.apps.googleusercontent.com".to_string());
        config
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse and validate the backend base URL.
fn parse_api_url(var_name: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "URL must have a host".to_string(),
        ));
    }
    Ok(url)
}
