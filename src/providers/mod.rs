//! Remote Filesystem Providers
//!
//! The file manager never talks to suppaftp directly. It opens a session
//! through a [`Connector`] and drives it through the narrow [`RemoteFs`]
//! capability interface; recursive operations are rebuilt on top of these
//! primitives because FTP has none of its own.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              FileManager operations         │
//! │  read, copy, move, delete, search, upload   │
//! └─────────────────────────────────────────────┘
//!                      │  one session per operation
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │                RemoteFs trait               │
//! │ list, nlst, retrieve, store, delete, mkdir, │
//! │           rmdir, rename, quit               │
//! └─────────────────────────────────────────────┘
//!            │                        │
//!            ▼                        ▼
//!      ┌───────────┐           ┌────────────┐
//!      │ FtpSession│           │MemorySession│
//!      └───────────┘           └────────────┘
//! ```

pub mod types;
pub mod ftp;
pub mod memory;

pub use types::*;
pub use ftp::{FtpConnector, FtpSession};
pub use memory::{MemoryConnector, MemorySession};

use async_trait::async_trait;
use std::path::Path;

/// One authenticated control connection.
///
/// Paths are absolute server paths. Directory paths may carry a trailing
/// separator.
#[async_trait]
pub trait RemoteFs: Send {
    /// Detailed listing: raw `LIST` lines of a directory
    async fn list(&mut self, path: &str) -> Result<Vec<String>, ProviderError>;

    /// Name-only listing (`NLST`) of a directory
    async fn nlst(&mut self, path: &str) -> Result<Vec<String>, ProviderError>;

    /// Download a file into memory
    async fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, ProviderError>;

    /// Download a file to a local path, returning the bytes written
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, ProviderError> {
        let data = self.retrieve(remote_path).await?;
        tokio::fs::write(local_path, &data).await?;
        Ok(data.len() as u64)
    }

    /// Upload bytes, replacing any existing file
    async fn store(&mut self, path: &str, data: &[u8]) -> Result<(), ProviderError>;

    /// Delete a file
    async fn delete(&mut self, path: &str) -> Result<(), ProviderError>;

    /// Create a directory
    async fn mkdir(&mut self, path: &str) -> Result<(), ProviderError>;

    /// Remove an empty directory
    async fn rmdir(&mut self, path: &str) -> Result<(), ProviderError>;

    /// Rename/move a file or directory
    async fn rename(&mut self, from: &str, to: &str) -> Result<(), ProviderError>;

    /// Close the control connection. Errors are logged, not returned.
    async fn quit(&mut self);
}

/// Opens fresh, authenticated sessions against one server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a new control connection
    async fn connect(&self) -> Result<Box<dyn RemoteFs>, ProviderError>;

    /// Display name for logs (`user@host`)
    fn display_name(&self) -> String;
}
