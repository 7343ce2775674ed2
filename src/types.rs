//! Request and response types
//!
//! Everything here crosses the JSON boundary, so field names are lowerCamelCase
//! regardless of the Rust naming.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::access::AccessPermission;

/// One file or folder as reported to the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_file: bool,
    /// Bytes; 0 for directories
    pub size: u64,
    #[serde(deserialize_with = "lenient_datetime")]
    pub date_modified: NaiveDateTime,
    /// FTP has no creation time, this mirrors `date_modified`
    #[serde(deserialize_with = "lenient_datetime")]
    pub date_created: NaiveDateTime,
    pub has_child: bool,
    /// Virtual path of the containing folder, `\` separated
    pub filter_path: String,
    /// Extension including the dot, empty for directories
    #[serde(rename = "type")]
    pub file_type: String,
    pub permission: Option<AccessPermission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_name: Option<String>,
}

/// Result of a details query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    pub name: String,
    pub location: String,
    pub is_file: bool,
    /// Human readable, e.g. `1.5 KB`
    pub size: String,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub multiple_files: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// `401` access denied, `400` conflict, `417` anything else
    pub code: String,
    pub message: String,
    pub file_exists: Option<Vec<String>>,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            file_exists: None,
        }
    }
}

/// Response of every file operation. Payload and error may both be set when a
/// batch partially succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub cwd: Option<DirectoryEntry>,
    pub files: Option<Vec<DirectoryEntry>>,
    pub details: Option<FileDetails>,
    pub error: Option<ErrorInfo>,
}

impl OperationResult {
    pub fn failed(error: ErrorInfo) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Read,
    Create,
    Delete,
    Rename,
    Copy,
    Move,
    Search,
    Details,
}

/// Inbound operation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperationRequest {
    pub action: FileAction,
    #[serde(default = "root_path")]
    pub path: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub target_path: Option<String>,
    /// Names the caller agreed to auto-rename on conflict
    #[serde(default)]
    pub rename_files: Vec<String>,
    /// Caller's prior listing metadata, positionally matching `names`
    #[serde(default)]
    pub data: Vec<DirectoryEntry>,
    #[serde(default)]
    pub search_string: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub show_hidden_items: bool,
}

fn root_path() -> String {
    "/".to_string()
}

/// Collision policy for uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadAction {
    /// Skip files that already exist and report them
    #[default]
    Save,
    /// Delete the existing file first
    Replace,
    /// Upload under `name(N).ext`
    KeepBoth,
}

impl std::str::FromStr for UploadAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "save" => Ok(UploadAction::Save),
            "replace" => Ok(UploadAction::Replace),
            "keepboth" | "keep-both" => Ok(UploadAction::KeepBoth),
            other => Err(format!("Unknown upload action: {}", other)),
        }
    }
}

/// One named byte stream to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Requested preview dimensions. Accepted but not applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Accept RFC 3339 stamps (as sent by browsers), naive ISO stamps or null
fn lenient_datetime<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(NaiveDateTime::default());
    };
    if let Ok(stamp) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(stamp.with_timezone(&Local).naive_local());
    }
    raw.parse::<NaiveDateTime>()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = DirectoryEntry {
            name: "a.txt".to_string(),
            is_file: true,
            file_type: ".txt".to_string(),
            filter_path: "\\docs\\".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["isFile"], true);
        assert_eq!(json["type"], ".txt");
        assert_eq!(json["filterPath"], "\\docs\\");
        assert!(json["permission"].is_null());
        assert!(json.get("previousName").is_none());
    }

    #[test]
    fn test_request_accepts_browser_payload() {
        let json = r#"{
            "action": "copy",
            "path": "/docs/",
            "targetPath": "/backup/",
            "names": ["a.txt"],
            "renameFiles": [],
            "data": [{"name": "a.txt", "isFile": true, "size": 12,
                      "dateModified": "2024-03-01T10:00:00.000Z", "filterPath": "\\docs\\"}]
        }"#;
        let request: FileOperationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.action, FileAction::Copy);
        assert_eq!(request.target_path.as_deref(), Some("/backup/"));
        assert_eq!(request.data[0].size, 12);
        assert_eq!(request.data[0].date_modified.year(), 2024);
        assert!(!request.case_sensitive);
    }

    #[test]
    fn test_upload_action_names() {
        assert_eq!("keepboth".parse::<UploadAction>().unwrap(), UploadAction::KeepBoth);
        assert_eq!(serde_json::to_string(&UploadAction::KeepBoth).unwrap(), "\"keepboth\"");
        assert!("overwrite".parse::<UploadAction>().is_err());
    }
}
