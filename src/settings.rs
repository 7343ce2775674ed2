// File manager settings
// Persistent connection, staging and access-rule configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::access::AccessDetails;
use crate::operations::FileManager;
use crate::providers::{FtpConfig, FtpTlsMode, DEFAULT_CONNECT_TIMEOUT_SECS};

/// Server connection section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Server URL; its path is the exposed root (e.g. `ftp://host/pub/files/`)
    pub url: String,
    pub username: String,
    /// Plain-text password. Prefer the `AEROFTP_PASSWORD` environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Overrides the TLS mode implied by the URL scheme
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_mode: Option<FtpTlsMode>,
    pub verify_cert: bool,
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: None,
            tls_mode: None,
            verify_cert: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Everything needed to build a [`FileManager`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionSettings,
    /// Local staging root for downloads; the system temp dir when unset
    pub staging_dir: Option<PathBuf>,
    /// Permission rules; everything is permitted when unset
    pub access: Option<AccessDetails>,
}

impl Settings {
    /// FTP configuration for this profile, `password` taking precedence over
    /// the stored one
    pub fn ftp_config(&self, password: Option<&str>) -> Result<FtpConfig> {
        let connection = &self.connection;
        if connection.url.is_empty() {
            anyhow::bail!("No server URL configured");
        }
        let password = password
            .or(connection.password.as_deref())
            .unwrap_or_default();

        let mut config = FtpConfig::from_url(&connection.url, &connection.username, password)
            .with_context(|| format!("Invalid server URL '{}'", connection.url))?
            .with_verify_cert(connection.verify_cert)
            .with_connect_timeout(connection.connect_timeout_secs);
        if let Some(mode) = connection.tls_mode {
            config = config.with_tls_mode(mode);
        }
        Ok(config)
    }

    pub fn file_manager(&self, password: Option<&str>) -> Result<FileManager> {
        let mut manager = FileManager::ftp(self.ftp_config(password)?);
        if let Some(dir) = &self.staging_dir {
            manager = manager.with_staging_root(dir);
        }
        if let Some(access) = &self.access {
            manager = manager.with_rules(access.clone());
        }
        Ok(manager)
    }
}

/// Default settings location: `<config_dir>/aeroftp/filemanager.json`
pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("aeroftp").join("filemanager.json")
}

/// Load settings; a missing file yields the defaults
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!("No settings at {:?}, using defaults", path);
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings {:?}", path))?;
    let settings: Settings = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings {:?}", path))?;
    if settings.connection.password.is_some() {
        tracing::warn!("Settings file {:?} stores a plain-text password", path);
    }
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, content).with_context(|| format!("Failed to write settings {:?}", path))?;

    tracing::info!("Settings saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessRule, Permission};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("none.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.connection.verify_cert);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("filemanager.json");
        let settings = Settings {
            connection: ConnectionSettings {
                url: "ftp://files.example.com/pub/".to_string(),
                username: "deploy".to_string(),
                ..Default::default()
            },
            staging_dir: Some(dir.path().join("staging")),
            access: Some(AccessDetails {
                role: Some("guest".to_string()),
                rules: vec![AccessRule {
                    write: Some(Permission::Deny),
                    ..AccessRule::folder("/*")
                }],
                ..Default::default()
            }),
        };

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
        assert!(!fs::read_to_string(&path).unwrap().contains("password"));
    }

    #[test]
    fn test_partial_file_and_ftp_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filemanager.json");
        fs::write(
            &path,
            r#"{"connection": {"url": "ftps://secure.example.com:2990/data", "tls_mode": "explicit"}}"#,
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        let config = settings.ftp_config(Some("s3cret")).unwrap();
        assert_eq!(config.port, 2990);
        assert_eq!(config.tls_mode, FtpTlsMode::Explicit);
        assert_eq!(config.root_path, "/data");
        assert_eq!(config.username, "anonymous");
    }

    #[test]
    fn test_unconfigured_url_is_an_error() {
        assert!(Settings::default().ftp_config(None).is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filemanager.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(&path).is_err());
    }
}
