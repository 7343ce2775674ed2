//! FTP Provider
//!
//! `RemoteFs` implementation for FTP and FTPS on top of the suppaftp crate.
//! Every call to [`FtpConnector::connect`] opens its own control connection;
//! sessions are never shared between operations.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::path::Path;
use std::time::Duration;
use suppaftp::tokio::{AsyncNativeTlsConnector, AsyncNativeTlsFtpStream};
use suppaftp::types::FileType;
use suppaftp::FtpError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{Connector, FtpConfig, FtpTlsMode, ProviderError, RemoteFs};

/// Opens authenticated FTP sessions from a fixed configuration
pub struct FtpConnector {
    config: FtpConfig,
}

impl FtpConnector {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    /// Create a TLS connector with the configured certificate verification settings
    fn make_tls_connector(&self) -> AsyncNativeTlsConnector {
        let mut builder = native_tls::TlsConnector::builder();
        if !self.config.verify_cert {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        let connector = suppaftp::async_native_tls::TlsConnector::from(builder);
        AsyncNativeTlsConnector::from(connector)
    }

    async fn open(&self) -> Result<AsyncNativeTlsFtpStream, ProviderError> {
        let addr = self.config.address();
        let domain = self.config.host.clone();

        let mut stream = match self.config.tls_mode {
            FtpTlsMode::None => AsyncNativeTlsFtpStream::connect(&addr)
                .await
                .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?,
            FtpTlsMode::Explicit | FtpTlsMode::Implicit => {
                let stream = AsyncNativeTlsFtpStream::connect(&addr)
                    .await
                    .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;
                stream
                    .into_secure(self.make_tls_connector(), &domain)
                    .await
                    .map_err(|e| ProviderError::ConnectionFailed(format!("TLS upgrade failed: {}", e)))?
            }
            FtpTlsMode::ExplicitIfAvailable => {
                let stream = AsyncNativeTlsFtpStream::connect(&addr)
                    .await
                    .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;
                match stream.into_secure(self.make_tls_connector(), &domain).await {
                    Ok(secure) => secure,
                    Err(e) => {
                        warn!(
                            "SECURITY: TLS upgrade failed for {} ({}), falling back to PLAINTEXT FTP. \
                             Credentials will be sent unencrypted.",
                            addr, e
                        );
                        AsyncNativeTlsFtpStream::connect(&addr)
                            .await
                            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?
                    }
                }
            }
        };

        stream
            .login(self.config.username.as_str(), self.config.password.expose_secret())
            .await
            .map_err(|e| ProviderError::AuthenticationFailed(e.to_string()))?;

        stream
            .transfer_type(FileType::Binary)
            .await
            .map_err(map_ftp_error)?;

        Ok(stream)
    }
}

#[async_trait]
impl Connector for FtpConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteFs>, ProviderError> {
        debug!("Opening FTP session to {}", self.display_name());
        let stream = tokio::time::timeout(
            Duration::from_secs(self.config.connect_timeout_secs),
            self.open(),
        )
        .await
        .map_err(|_| ProviderError::Timeout)??;

        Ok(Box::new(FtpSession { stream }))
    }

    fn display_name(&self) -> String {
        format!("{}@{}", self.config.username, self.config.address())
    }
}

/// One authenticated FTP control connection
pub struct FtpSession {
    stream: AsyncNativeTlsFtpStream,
}

impl FtpSession {
    /// `cwd` into the directory, then list without a path argument.
    ///
    /// Passing the path to LIST/NLST breaks on servers that misread
    /// `#`, spaces or other special characters in the argument.
    async fn enter(&mut self, path: &str) -> Result<(), ProviderError> {
        let target = if path.is_empty() { "/" } else { path };
        self.stream.cwd(target).await.map_err(map_ftp_error)
    }
}

#[async_trait]
impl RemoteFs for FtpSession {
    async fn list(&mut self, path: &str) -> Result<Vec<String>, ProviderError> {
        self.enter(path).await?;
        match self.stream.list(None).await {
            Ok(lines) => Ok(lines),
            Err(e) => empty_when_no_files(map_ftp_error(e)),
        }
    }

    async fn nlst(&mut self, path: &str) -> Result<Vec<String>, ProviderError> {
        self.enter(path).await?;
        match self.stream.nlst(None).await {
            Ok(lines) => Ok(lines),
            Err(e) => empty_when_no_files(map_ftp_error(e)),
        }
    }

    async fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, ProviderError> {
        let mut data_stream = self
            .stream
            .retr_as_stream(path)
            .await
            .map_err(map_ftp_error)?;

        let mut data = Vec::new();
        data_stream
            .read_to_end(&mut data)
            .await
            .map_err(|e| ProviderError::TransferFailed(e.to_string()))?;

        self.stream
            .finalize_retr_stream(data_stream)
            .await
            .map_err(map_ftp_error)?;

        Ok(data)
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, ProviderError> {
        // Stream directly to disk (no full-file RAM buffer)
        let mut data_stream = self
            .stream
            .retr_as_stream(remote_path)
            .await
            .map_err(map_ftp_error)?;

        let mut local_file = tokio::fs::File::create(local_path).await?;
        let mut chunk = [0u8; 8192];
        let mut transferred: u64 = 0;

        loop {
            let n = data_stream
                .read(&mut chunk)
                .await
                .map_err(|e| ProviderError::TransferFailed(e.to_string()))?;
            if n == 0 {
                break;
            }
            local_file.write_all(&chunk[..n]).await?;
            transferred += n as u64;
        }
        local_file.flush().await?;

        self.stream
            .finalize_retr_stream(data_stream)
            .await
            .map_err(map_ftp_error)?;

        debug!("Downloaded {} bytes: {}", transferred, remote_path);
        Ok(transferred)
    }

    async fn store(&mut self, path: &str, data: &[u8]) -> Result<(), ProviderError> {
        let mut reader = std::io::Cursor::new(data);
        self.stream
            .put_file(path, &mut reader)
            .await
            .map_err(map_ftp_error)?;
        Ok(())
    }

    async fn delete(&mut self, path: &str) -> Result<(), ProviderError> {
        self.stream.rm(path).await.map_err(map_ftp_error)
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), ProviderError> {
        self.stream.mkdir(path).await.map_err(map_ftp_error)
    }

    async fn rmdir(&mut self, path: &str) -> Result<(), ProviderError> {
        self.stream.rmdir(path).await.map_err(map_ftp_error)
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), ProviderError> {
        info!("Renaming: {} -> {}", from, to);
        self.stream.rename(from, to).await.map_err(map_ftp_error)
    }

    async fn quit(&mut self) {
        if let Err(e) = self.stream.quit().await {
            debug!("QUIT failed (connection dropped anyway): {}", e);
        }
    }
}

/// Translate a suppaftp error, classifying negative replies by code and text
fn map_ftp_error(err: FtpError) -> ProviderError {
    match err {
        FtpError::UnexpectedResponse(response) => {
            let code = response.status.code();
            let body = String::from_utf8_lossy(&response.body).trim().to_string();
            let message = body
                .strip_prefix(&code.to_string())
                .map(|rest| rest.trim_start_matches(['-', ' ']).to_string())
                .unwrap_or(body);
            ProviderError::from_reply(code, message)
        }
        FtpError::ConnectionError(e) => ProviderError::IoError(e),
        other => ProviderError::ServerError(other.to_string()),
    }
}

/// Some servers answer LIST/NLST of an empty directory with 450 instead of an
/// empty data transfer.
fn empty_when_no_files(err: ProviderError) -> Result<Vec<String>, ProviderError> {
    if err.reply_code() == Some(450) {
        Ok(Vec::new())
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_listing_reply_is_not_an_error() {
        let err = ProviderError::from_reply(450, "No files found");
        assert!(empty_when_no_files(err).unwrap().is_empty());

        let err = ProviderError::from_reply(550, "Permission denied");
        assert!(matches!(
            empty_when_no_files(err),
            Err(ProviderError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_display_name_hides_password() {
        let config = FtpConfig::from_url("ftp://ftp.example.com/", "bob", "hunter2").unwrap();
        let connector = FtpConnector::new(config);
        let name = connector.display_name();
        assert_eq!(name, "bob@ftp.example.com:21");
        assert!(!name.contains("hunter2"));
    }
}
