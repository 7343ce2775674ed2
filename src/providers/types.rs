//! Shared types for the remote filesystem layer
//!
//! Connection configuration for the FTP backend and the provider-level error
//! type that every backend reports through.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default seconds allowed for TCP connect + TLS + login
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// TLS mode for FTP connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtpTlsMode {
    /// Plain FTP (no encryption)
    #[default]
    None,
    /// Explicit TLS (AUTH TLS on port 21) - required
    Explicit,
    /// Implicit TLS (direct TLS on port 990)
    Implicit,
    /// Try explicit TLS, fall back to plain if unsupported
    ExplicitIfAvailable,
}

impl FtpTlsMode {
    /// Default control port for this mode
    pub fn default_port(&self) -> u16 {
        match self {
            FtpTlsMode::Implicit => 990,
            _ => 21,
        }
    }
}

/// FTP connection configuration
///
/// Built once from the server URL; the URL path becomes the root folder that
/// every virtual path is resolved against.
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: secrecy::SecretString,
    pub tls_mode: FtpTlsMode,
    pub verify_cert: bool,
    /// Absolute server folder exposed as the virtual root, without trailing slash
    pub root_path: String,
    /// Display name of the root (last root segment, or the host)
    pub root_name: String,
    pub connect_timeout_secs: u64,
}

impl FtpConfig {
    /// Build a configuration from a server URL such as `ftp://host:2121/pub/files/`
    pub fn from_url(url: &str, username: &str, password: &str) -> Result<Self, ProviderError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid URL '{}': {}", url, e)))?;

        let tls_mode = match parsed.scheme() {
            "ftp" => FtpTlsMode::None,
            "ftps" => FtpTlsMode::Implicit,
            other => {
                return Err(ProviderError::InvalidConfig(format!(
                    "Unsupported URL scheme: {}",
                    other
                )))
            }
        };

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProviderError::InvalidConfig(format!("Missing host in URL: {}", url)))?
            .to_string();

        let decoded = urlencoding::decode(parsed.path())
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid URL path: {}", e)))?;
        let root_path = normalize_root(&decoded);
        let root_name = root_path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&host)
            .to_string();

        Ok(Self {
            port: parsed.port().unwrap_or_else(|| tls_mode.default_port()),
            host,
            username: if username.is_empty() {
                "anonymous".to_string()
            } else {
                username.to_string()
            },
            password: secrecy::SecretString::from(password.to_string()),
            tls_mode,
            verify_cert: true,
            root_path,
            root_name,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        })
    }

    pub fn with_tls_mode(mut self, tls_mode: FtpTlsMode) -> Self {
        self.tls_mode = tls_mode;
        self
    }

    pub fn with_verify_cert(mut self, verify_cert: bool) -> Self {
        self.verify_cert = verify_cert;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// `host:port` address for the control connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Strip trailing separators so that `root + "/virtual/path"` never doubles up.
/// The server root itself becomes the empty string.
pub fn normalize_root(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Provider error types
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported server listing format: {0}")]
    UnsupportedListing(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Timeout")]
    Timeout,

    /// Negative completion reply that has no more specific meaning
    #[error("{code} {message}")]
    Rejected { code: u32, message: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProviderError {
    /// Classify a negative FTP reply.
    ///
    /// Servers disagree on codes (550 covers "missing", "exists" and "denied"
    /// alike), so the reply text decides between them.
    pub fn from_reply(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let missing = lower.contains("no such")
            || lower.contains("not found")
            || lower.contains("not exist")
            || lower.contains("cannot find");

        if lower.contains("permission denied") || lower.contains("access is denied") || code == 530 {
            ProviderError::PermissionDenied(message)
        } else if matches!(code, 521 | 550 | 553) && lower.contains("exist") && !missing {
            ProviderError::AlreadyExists(message)
        } else if code == 550 && missing {
            ProviderError::NotFound(message)
        } else {
            ProviderError::Rejected { code, message }
        }
    }

    /// Reply code when the error came from a server reply
    pub fn reply_code(&self) -> Option<u32> {
        match self {
            ProviderError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}
