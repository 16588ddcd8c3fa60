//! Gallery configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GALLERY_API_BASE_URL` - Base URL of the image store API (e.g., `https://api.example.com/v1`)
//! - `GALLERY_API_TOKEN` - Bearer token for the image store API (HIGH PRIVILEGE)
//!
//! ## Optional
//! - `GALLERY_UPLOAD_FOLDER` - Root folder for uploaded files (default: gallery)
//! - `GALLERY_MAX_UPLOAD_BYTES` - Per-file size limit checked before upload (default: 10 MiB)
//! - `GALLERY_REQUEST_TIMEOUT_SECS` - HTTP request timeout (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_UPLOAD_FOLDER: &str = "gallery";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Complete gallery configuration.
#[derive(Debug, Clone)]
pub struct GalleryConfig {
    /// Remote image store connection
    pub store: StoreConfig,
    /// Manager behaviour
    pub options: GalleryOptions,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
}

/// Remote image store connection settings.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct StoreConfig {
    /// Base URL all store endpoints are resolved against
    pub base_url: Url,
    /// Bearer token
    pub api_token: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Behaviour of a gallery manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryOptions {
    /// Root folder uploads are placed under; the owner path is appended.
    pub upload_folder: String,
    /// Files larger than this are rejected before any network call.
    pub max_upload_bytes: usize,
}

impl Default for GalleryOptions {
    fn default() -> Self {
        Self {
            upload_folder: DEFAULT_UPLOAD_FOLDER.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl GalleryConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`GalleryConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let base_url = vars.required("GALLERY_API_BASE_URL")?;
        let base_url = Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("GALLERY_API_BASE_URL".to_string(), e.to_string())
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "GALLERY_API_BASE_URL".to_string(),
                "must be an absolute http(s) URL".to_string(),
            ));
        }

        let api_token = vars.required("GALLERY_API_TOKEN")?;
        validate_secret_strength(&api_token, "GALLERY_API_TOKEN")?;

        let timeout = vars.parsed("GALLERY_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let max_upload_bytes = vars.parsed("GALLERY_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let upload_folder = vars
            .optional("GALLERY_UPLOAD_FOLDER")
            .map(|folder| folder.trim_matches('/').to_string())
            .filter(|folder| !folder.is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string());

        Ok(Self {
            store: StoreConfig {
                base_url,
                api_token: SecretString::from(api_token),
                timeout: Duration::from_secs(timeout),
            },
            options: GalleryOptions {
                upload_folder,
                max_upload_bytes,
            },
            sentry_dsn: vars.optional("SENTRY_DSN"),
            sentry_environment: vars.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: vars
                .optional("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // Token length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the token issued by the store."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOKEN: &str = "gk_9fQ2xLr7TmZp4vWb8NcY3sHd";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-token-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR").is_err());
        assert!(validate_secret_strength(TOKEN, "TEST_VAR").is_ok());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = GalleryConfig::from_lookup(lookup(&[
            ("GALLERY_API_BASE_URL", "https://api.shop.test/v1/"),
            ("GALLERY_API_TOKEN", TOKEN),
        ]))
        .unwrap();

        assert_eq!(config.store.base_url.as_str(), "https://api.shop.test/v1/");
        assert_eq!(config.store.timeout, Duration::from_secs(30));
        assert_eq!(config.options, GalleryOptions::default());
        assert!(config.sentry_dsn.is_none());
        assert!((config.sentry_sample_rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = GalleryConfig::from_lookup(lookup(&[
            ("GALLERY_API_BASE_URL", "https://api.shop.test"),
            ("GALLERY_API_TOKEN", TOKEN),
            ("GALLERY_UPLOAD_FOLDER", "/media/"),
            ("GALLERY_MAX_UPLOAD_BYTES", "2048"),
            ("GALLERY_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.options.upload_folder, "media");
        assert_eq!(config.options.max_upload_bytes, 2048);
        assert_eq!(config.store.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_lookup_missing_token() {
        let err = GalleryConfig::from_lookup(lookup(&[(
            "GALLERY_API_BASE_URL",
            "https://api.shop.test",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "GALLERY_API_TOKEN"));
    }

    #[test]
    fn test_from_lookup_invalid_number() {
        let err = GalleryConfig::from_lookup(lookup(&[
            ("GALLERY_API_BASE_URL", "https://api.shop.test"),
            ("GALLERY_API_TOKEN", TOKEN),
            ("GALLERY_MAX_UPLOAD_BYTES", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnvVar(key, _) if key == "GALLERY_MAX_UPLOAD_BYTES"
        ));
    }

    #[test]
    fn test_store_config_debug_redacts_token() {
        let config = StoreConfig {
            base_url: Url::parse("https://api.shop.test").unwrap(),
            api_token: SecretString::from(TOKEN),
            timeout: Duration::from_secs(1),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("api.shop.test"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(TOKEN));
    }
}
