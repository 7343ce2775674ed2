use thiserror::Error;

use crate::providers::ProviderError;
use crate::types::ErrorInfo;

/// Operation-level failures, reported to callers as [`ErrorInfo`]
#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error("{0}")]
    AccessDenied(String),

    #[error("{message}")]
    Conflict { message: String, names: Vec<String> },

    /// Aggregated missing sources; `existing` carries conflicts found in the same batch
    #[error("{message}")]
    NotFound { message: String, existing: Vec<String> },

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl FileManagerError {
    pub fn conflict(message: impl Into<String>, names: Vec<String>) -> Self {
        FileManagerError::Conflict {
            message: message.into(),
            names,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FileManagerError::AccessDenied(_)
            | FileManagerError::Provider(ProviderError::PermissionDenied(_)) => "401",
            FileManagerError::Conflict { .. } => "400",
            _ => "417",
        }
    }

    pub fn into_error_info(self) -> ErrorInfo {
        let info = ErrorInfo::new(self.code(), self.to_string());
        let file_exists = match self {
            FileManagerError::Conflict { names, .. } => Some(names),
            FileManagerError::NotFound { existing, .. } if !existing.is_empty() => Some(existing),
            _ => None,
        };
        ErrorInfo { file_exists, ..info }
    }
}

impl From<FileManagerError> for ErrorInfo {
    fn from(err: FileManagerError) -> Self {
        err.into_error_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(FileManagerError::AccessDenied("x".into()).code(), "401");
        assert_eq!(
            FileManagerError::Provider(ProviderError::PermissionDenied("550 Permission denied".into())).code(),
            "401"
        );
        assert_eq!(FileManagerError::conflict("File Already Exists", vec![]).code(), "400");
        assert_eq!(
            FileManagerError::Provider(ProviderError::UnsupportedListing("??".into())).code(),
            "417"
        );
    }

    #[test]
    fn test_not_found_keeps_conflicts() {
        let info = FileManagerError::NotFound {
            message: "a.txt not found in given location.".into(),
            existing: vec!["b.txt".into()],
        }
        .into_error_info();
        assert_eq!(info.code, "417");
        assert_eq!(info.message, "a.txt not found in given location.");
        assert_eq!(info.file_exists, Some(vec!["b.txt".to_string()]));
    }

    #[test]
    fn test_error_info_carries_conflicts_only_when_present() {
        let info = ErrorInfo::from(FileManagerError::conflict("File Already Exists", vec!["a.txt".into()]));
        assert_eq!(info.code, "400");
        assert_eq!(info.message, "File Already Exists");
        assert_eq!(info.file_exists, Some(vec!["a.txt".to_string()]));

        let info = FileManagerError::AccessDenied("Locked folder".into()).into_error_info();
        assert_eq!(info, ErrorInfo::new("401", "Locked folder"));
    }
}
