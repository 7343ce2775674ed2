//! AeroFTP File Manager
//!
//! Presents an FTP server folder as a virtual filesystem: list, create,
//! rename, delete, copy, move, search, details, upload and download, with a
//! client-side permission model layered on a protocol that has none.
//!
//! ```text
//! FileManager ──► operations / transfer
//!                     │
//!          tree ◄─────┤──► access (rule evaluation)
//!           │         │
//!        listing      └──► staging (local download area)
//!           │
//!   providers::RemoteFs ──► FtpSession (suppaftp) | MemorySession (tests)
//! ```

pub mod access;
pub mod error;
pub mod listing;
pub mod operations;
pub mod paths;
pub mod providers;
pub mod settings;
pub mod staging;
pub mod transfer;
pub mod tree;
pub mod types;

pub use access::{AccessDetails, AccessPermission, AccessRule, Permission};
pub use error::FileManagerError;
pub use operations::{byte_conversion, to_json, FileManager};
pub use paths::PathResolver;
pub use providers::{FtpConfig, FtpTlsMode, ProviderError};
pub use settings::Settings;
pub use transfer::FileDownload;
pub use types::{
    DirectoryEntry, ErrorInfo, FileAction, FileDetails, FileOperationRequest, ImageSize, OperationResult,
    UploadAction, UploadFile,
};
