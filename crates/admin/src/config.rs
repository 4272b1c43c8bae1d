//! Admin configuration loaded from environment variables.
//!
//! Store data (products, orders, site settings) lives in JSON files under
//! the data directory; this module only covers process-level settings and
//! secrets.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TIENDA_SESSION_SECRET` - Session secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `TIENDA_HOST` - Bind address (default: 127.0.0.1)
//! - `TIENDA_PORT` - Listen port (default: 3001)
//! - `TIENDA_BASE_URL` - Public URL (default: <http://127.0.0.1:3001>)
//! - `TIENDA_DATA_DIR` - JSON data directory (default: ./data)
//! - `TIENDA_BACKUP_DIR` - Backup directory (default: `<data dir>/backups`)
//! - `TIENDA_BACKUP_RETENTION` - Backups to keep (default: 30)
//! - `TIENDA_LOW_STOCK_THRESHOLD` - Dashboard low-stock cutoff (default: 5)
//! - `TIENDA_LOG_FORMAT` - `json` or `text` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! ## Optional (MercadoPago - enables payment reprocessing and webhooks)
//! - `MERCADOPAGO_ACCESS_TOKEN` - Private access token
//! - `MERCADOPAGO_WEBHOOK_SECRET` - Webhook signing secret
//! - `MERCADOPAGO_API_BASE` - API base URL (default: <https://api.mercadopago.com>)
//!
//! ## Optional (Telegram - admin notifications)
//! - `TELEGRAM_BOT_TOKEN` - Bot token; the chat ID is set on the notifications page
//! - `TELEGRAM_API_BASE` - API base URL (default: <https://api.telegram.org>)
//!
//! ## Optional (SMTP - email notifications, all or none)
//! - `SMTP_HOST`, `SMTP_PORT` (default 587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//!
//! ## Optional (TLS)
//! - `TIENDA_TLS_CERT` - PEM-encoded certificate chain
//! - `TIENDA_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_MERCADOPAGO_API_BASE: &str = "https://api.mercadopago.com";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "tu-token",
    "cambiar",
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

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Admin application configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the admin panel
    pub base_url: String,
    /// Session secret
    pub session_secret: SecretString,
    /// Directory holding the JSON data files
    pub data_dir: PathBuf,
    /// Directory holding backup bundles
    pub backup_dir: PathBuf,
    /// Number of backups to keep when pruning
    pub backup_retention: usize,
    /// Products at or below this stock are flagged on the dashboard
    pub low_stock_threshold: i64,
    /// Log output format
    pub log_format: LogFormat,
    /// MercadoPago API configuration (optional)
    pub mercadopago: Option<MercadoPagoConfig>,
    /// Telegram bot configuration (optional)
    pub telegram: Option<TelegramConfig>,
    /// Email configuration (optional)
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// MercadoPago API configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct MercadoPagoConfig {
    /// Private access token (`APP_USR-...`)
    pub access_token: SecretString,
    /// Secret used to sign webhook notifications
    pub webhook_secret: Option<SecretString>,
    /// API base URL
    pub api_base: String,
}

impl std::fmt::Debug for MercadoPagoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoConfig")
            .field("access_token", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Telegram bot configuration.
///
/// Implements `Debug` manually to redact the bot token.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from `@BotFather`
    pub bot_token: SecretString,
    /// API base URL
    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("TIENDA_TLS_CERT");
        let key_pem = get_optional_env("TIENDA_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "TIENDA_TLS_*".to_string(),
                "Both TIENDA_TLS_CERT and TIENDA_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl AdminConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("TIENDA_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("TIENDA_HOST".to_string(), e.to_string()))?;
        let port = parse_env("TIENDA_PORT", "3001")?;
        let base_url = get_env_or_default("TIENDA_BASE_URL", &format!("http://{host}:{port}"));
        let session_secret = get_validated_secret("TIENDA_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "TIENDA_SESSION_SECRET")?;

        let data_dir = PathBuf::from(get_env_or_default("TIENDA_DATA_DIR", "./data"));
        let backup_dir = get_optional_env("TIENDA_BACKUP_DIR")
            .map_or_else(|| data_dir.join("backups"), PathBuf::from);
        let backup_retention = parse_env("TIENDA_BACKUP_RETENTION", "30")?;
        let low_stock_threshold = parse_env("TIENDA_LOW_STOCK_THRESHOLD", "5")?;
        let log_format = match get_env_or_default("TIENDA_LOG_FORMAT", "text").as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "TIENDA_LOG_FORMAT".to_string(),
                    format!("expected json or text, got {other}"),
                ));
            }
        };

        let mercadopago = MercadoPagoConfig::from_env()?;
        let telegram = TelegramConfig::from_env();
        let email = EmailConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            host,
            port,
            base_url,
            session_secret,
            data_dir,
            backup_dir,
            backup_retention,
            low_stock_threshold,
            log_format,
            mercadopago,
            telegram,
            email,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Configuration for tests and local tooling: no external services,
    /// data stored under `data_dir`.
    #[must_use]
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3001,
            base_url: "http://127.0.0.1:3001".to_string(),
            session_secret: SecretString::from("k3Jq9v!Xz2@LmP7#Rt5$Wn8^Yb4&Hc6*"),
            backup_dir: data_dir.join("backups"),
            data_dir,
            backup_retention: 30,
            low_stock_threshold: 5,
            log_format: LogFormat::Text,
            mercadopago: None,
            telegram: None,
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
            tls: None,
        }
    }

    /// Configuration for the management CLI.
    ///
    /// Reads the data, backup and external service variables but not the
    /// server ones, so no session secret is required.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable that is set fails to parse or
    /// validate.
    pub fn for_cli(data_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let data_dir = data_dir
            .unwrap_or_else(|| PathBuf::from(get_env_or_default("TIENDA_DATA_DIR", "./data")));
        let mut config = Self::for_data_dir(data_dir);
        if let Some(backup_dir) = get_optional_env("TIENDA_BACKUP_DIR") {
            config.backup_dir = PathBuf::from(backup_dir);
        }
        config.backup_retention = parse_env("TIENDA_BACKUP_RETENTION", "30")?;
        config.low_stock_threshold = parse_env("TIENDA_LOW_STOCK_THRESHOLD", "5")?;
        config.mercadopago = MercadoPagoConfig::from_env()?;
        config.telegram = TelegramConfig::from_env();
        config.email = EmailConfig::from_env()?;
        Ok(config)
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should be marked `Secure`.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl MercadoPagoConfig {
    /// Returns `None` if `MERCADOPAGO_ACCESS_TOKEN` is not set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(token) = get_optional_env("MERCADOPAGO_ACCESS_TOKEN") else {
            if get_optional_env("MERCADOPAGO_WEBHOOK_SECRET").is_some() {
                return Err(ConfigError::InvalidEnvVar(
                    "MERCADOPAGO_WEBHOOK_SECRET".to_string(),
                    "requires MERCADOPAGO_ACCESS_TOKEN".to_string(),
                ));
            }
            return Ok(None);
        };
        validate_secret_strength(&token, "MERCADOPAGO_ACCESS_TOKEN")?;

        Ok(Some(Self {
            access_token: SecretString::from(token),
            webhook_secret: get_optional_env("MERCADOPAGO_WEBHOOK_SECRET").map(SecretString::from),
            api_base: get_env_or_default("MERCADOPAGO_API_BASE", DEFAULT_MERCADOPAGO_API_BASE),
        }))
    }
}

impl TelegramConfig {
    /// Returns `None` if `TELEGRAM_BOT_TOKEN` is not set.
    fn from_env() -> Option<Self> {
        get_optional_env("TELEGRAM_BOT_TOKEN").map(|token| {
            if let Err(e) = validate_secret_strength(&token, "TELEGRAM_BOT_TOKEN") {
                tracing::warn!("TELEGRAM_BOT_TOKEN validation warning: {e}");
            }
            Self {
                bot_token: SecretString::from(token),
                api_base: get_env_or_default("TELEGRAM_API_BASE", DEFAULT_TELEGRAM_API_BASE),
            }
        })
    }
}

impl EmailConfig {
    /// Returns `None` when no SMTP variable is set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = get_optional_env("SMTP_HOST");
        let username = get_optional_env("SMTP_USERNAME");
        let password = get_optional_env("SMTP_PASSWORD");
        let from = get_optional_env("SMTP_FROM");

        match (host, username, password, from) {
            (Some(smtp_host), Some(smtp_username), Some(password), Some(from_address)) => {
                let smtp_port = parse_env("SMTP_PORT", "587")?;
                Ok(Some(Self {
                    smtp_host,
                    smtp_port,
                    smtp_username,
                    smtp_password: SecretString::from(password),
                    from_address,
                }))
            }
            (None, None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SMTP_*".to_string(),
                "SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD and SMTP_FROM must be set together"
                    .to_string(),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
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
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("tu-token-de-mercadopago", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
        assert!(validate_secret_strength("changeme123", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("APP_USR-4f9Kq2!zR7xW3@mB8nL5#pT0", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_length() {
        assert!(validate_session_secret(&SecretString::from("short"), "S").is_err());
        assert!(validate_session_secret(&SecretString::from("a".repeat(32)), "S").is_ok());
    }

    #[test]
    fn test_for_data_dir_defaults() {
        let config = AdminConfig::for_data_dir("/tmp/tienda");
        assert_eq!(config.backup_dir, PathBuf::from("/tmp/tienda/backups"));
        assert_eq!(config.socket_addr().port(), 3001);
        assert!(!config.is_https());
        assert!(config.mercadopago.is_none());
    }

    #[test]
    fn test_mercadopago_config_debug_redacts_secrets() {
        let config = MercadoPagoConfig {
            access_token: SecretString::from("APP_USR-super-secret-token"),
            webhook_secret: Some(SecretString::from("whsec-hidden")),
            api_base: DEFAULT_MERCADOPAGO_API_BASE.to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("api.mercadopago.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-token"));
        assert!(!debug_output.contains("whsec-hidden"));
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.tienda.com.ar".to_string(),
            smtp_port: 587,
            smtp_username: "ventas@tienda.com.ar".to_string(),
            smtp_password: SecretString::from("super_secret_smtp_password"),
            from_address: "no-responder@tienda.com.ar".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("smtp.tienda.com.ar"));
        assert!(debug_output.contains("587"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }

    #[test]
    fn test_telegram_config_debug_redacts_token() {
        let config = TelegramConfig {
            bot_token: SecretString::from("123456:ABCdefGhIJKlmNoPQRstuVWxyz"),
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("ABCdef"));
    }
}
