//! Rule-based access control
//!
//! FTP has no ACLs, so permissions are evaluated client-side from an ordered
//! rule table. Rule paths are virtual paths (relative to the root folder).
//!
//! Each rule compiles to one [`RuleMatcher`]. Every matching rule overwrites
//! the capability fields it sets, so the last matching rule wins per field.

use serde::{Deserialize, Serialize};

use crate::paths::{self, ensure_trailing_slash};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    #[default]
    Allow,
    Deny,
}

impl Permission {
    pub fn allows(self) -> bool {
        self == Permission::Allow
    }
}

/// One entry of the rule table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRule {
    /// `*.*`, `*.ext`, `stem.*` (optionally prefixed by a folder), a folder
    /// prefix ending in `*`, or an exact path
    pub path: String,
    #[serde(default)]
    pub is_file: bool,
    /// Only applies while this role is active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_contents: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AccessRule {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_file: true,
            ..Default::default()
        }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_file: false,
            ..Default::default()
        }
    }
}

/// Rule table plus the active role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub rules: Vec<AccessRule>,
    /// Starting value of every capability before rules are applied
    #[serde(default)]
    pub default_access: Permission,
}

/// Effective capability set of one file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPermission {
    pub read: bool,
    pub write: bool,
    pub write_contents: bool,
    pub copy: bool,
    pub upload: bool,
    pub download: bool,
    pub edit_contents: bool,
    #[serde(default)]
    pub message: String,
}

impl AccessPermission {
    pub fn uniform(allow: bool) -> Self {
        Self {
            read: allow,
            write: allow,
            write_contents: allow,
            copy: allow,
            upload: allow,
            download: allow,
            edit_contents: allow,
            message: String::new(),
        }
    }

    fn apply(&mut self, rule: &AccessRule) {
        let set = |field: &mut bool, value: Option<Permission>| {
            if let Some(value) = value {
                *field = value.allows();
            }
        };
        set(&mut self.read, rule.read);
        set(&mut self.write, rule.write);
        set(&mut self.write_contents, rule.write_contents);
        set(&mut self.copy, rule.copy);
        set(&mut self.upload, rule.upload);
        set(&mut self.download, rule.download);
        self.message = rule.message.clone().unwrap_or_default();
    }

    /// Only write/writeContents, for entries nested under an exact folder rule
    fn narrow_write(&mut self, rule: &AccessRule) {
        if let Some(value) = rule.write_contents {
            self.write = value.allows();
            self.write_contents = value.allows();
        }
    }
}

/// Compiled shape of a rule path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatcher {
    /// File rule `P*.*`: every file at or below `P`
    AnyFile { folder: String },
    /// File rule `P*.ext`: files with that extension directly in `P`, or anywhere if `P` is empty
    Extension { folder: String, extension: String },
    /// File rule `Pstem.*`: files with that stem directly in `P`, or anywhere if `P` is empty
    Stem { folder: String, stem: String },
    /// File rule with a plain path
    ExactFile { path: String },
    /// Folder rule `P*`: every folder, and every file, whose path starts with `P`
    FolderPrefix { prefix: String },
    /// Folder rule with a plain path; nested entries only get write narrowed
    ExactFolder { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    Full,
    NarrowWrite,
    None,
}

/// What is being evaluated
struct Target<'a> {
    /// Folder containing the entry, with trailing `/`
    folder: String,
    name: &'a str,
    /// Full virtual path; folders end in `/`
    path: String,
    is_file: bool,
}

impl RuleMatcher {
    pub fn compile(rule: &AccessRule) -> Option<Self> {
        let path = rule.path.as_str();
        if path.is_empty() {
            return None;
        }

        let matcher = if rule.is_file {
            if let Some(index) = path.find("*.*") {
                RuleMatcher::AnyFile {
                    folder: path[..index].to_string(),
                }
            } else if let Some(index) = path.find("*.") {
                RuleMatcher::Extension {
                    folder: path[..index].to_string(),
                    extension: paths::extension(path).to_lowercase(),
                }
            } else if path.ends_with(".*") {
                let (folder, leaf) = paths::split(path, true);
                RuleMatcher::Stem {
                    folder,
                    stem: paths::stem(&leaf).to_string(),
                }
            } else {
                RuleMatcher::ExactFile {
                    path: path.to_string(),
                }
            }
        } else if let Some(index) = path.find('*') {
            RuleMatcher::FolderPrefix {
                prefix: path[..index].to_string(),
            }
        } else {
            RuleMatcher::ExactFolder {
                path: ensure_trailing_slash(path),
            }
        };
        Some(matcher)
    }

    fn matches(&self, target: &Target<'_>) -> RuleMatch {
        let full = |hit: bool| if hit { RuleMatch::Full } else { RuleMatch::None };
        let in_folder = |folder: &str| folder.is_empty() || target.folder == ensure_trailing_slash(folder);

        match self {
            RuleMatcher::AnyFile { folder } => {
                full(target.is_file && (folder.is_empty() || target.folder.starts_with(folder.as_str())))
            }
            RuleMatcher::Extension { folder, extension } => full(
                target.is_file
                    && in_folder(folder.as_str())
                    && paths::extension(target.name).to_lowercase() == *extension,
            ),
            RuleMatcher::Stem { folder, stem } => {
                full(target.is_file && in_folder(folder.as_str()) && paths::stem(target.name) == stem.as_str())
            }
            RuleMatcher::ExactFile { path } => full(target.is_file && target.path == *path),
            RuleMatcher::FolderPrefix { prefix } => full(target.path.starts_with(prefix.as_str())),
            RuleMatcher::ExactFolder { path } => {
                if !target.is_file && target.path == *path {
                    RuleMatch::Full
                } else if target.path.starts_with(path.as_str()) {
                    RuleMatch::NarrowWrite
                } else {
                    RuleMatch::None
                }
            }
        }
    }

    /// Folder rules also govern files below them; file rules never govern folders
    fn applies_to(&self, is_file: bool) -> bool {
        match self {
            RuleMatcher::FolderPrefix { .. } | RuleMatcher::ExactFolder { .. } => true,
            _ => is_file,
        }
    }
}

impl AccessDetails {
    /// Capability set of `location` + `name`.
    ///
    /// `location` is the virtual folder containing the entry. For a folder,
    /// `name` may be empty to evaluate `location` itself.
    pub fn evaluate(&self, location: &str, name: &str, is_file: bool) -> AccessPermission {
        let folder = ensure_trailing_slash(location);
        let path = match (is_file, name.is_empty()) {
            (true, _) => format!("{}{}", folder, name),
            (false, true) => folder.clone(),
            (false, false) => format!("{}{}/", folder, name),
        };
        let target = Target {
            folder,
            name,
            path,
            is_file,
        };

        let mut permission = AccessPermission::uniform(self.default_access.allows());
        for rule in &self.rules {
            if rule.role.as_ref().is_some_and(|role| Some(role) != self.role.as_ref()) {
                continue;
            }
            let Some(matcher) = RuleMatcher::compile(rule) else {
                continue;
            };
            if !matcher.applies_to(is_file) {
                continue;
            }
            match matcher.matches(&target) {
                RuleMatch::Full => permission.apply(rule),
                RuleMatch::NarrowWrite => permission.narrow_write(rule),
                RuleMatch::None => {}
            }
        }
        permission
    }

    /// Capability set of a virtual folder path such as `/docs/2024/`
    pub fn evaluate_folder(&self, folder_path: &str) -> AccessPermission {
        self.evaluate(folder_path, "", false)
    }
}

/// `None` when no rule table is configured: everything is permitted.
pub fn evaluate(
    details: Option<&AccessDetails>,
    location: &str,
    name: &str,
    is_file: bool,
) -> Option<AccessPermission> {
    details.map(|details| details.evaluate(location, name, is_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rules: Vec<AccessRule>) -> AccessDetails {
        AccessDetails {
            role: None,
            rules,
            default_access: Permission::Allow,
        }
    }

    #[test]
    fn test_no_table_means_no_permission_object() {
        assert!(evaluate(None, "/", "a.txt", true).is_none());
    }

    #[test]
    fn test_folder_prefix_rule_covers_nested_files() {
        let details = table(vec![AccessRule {
            write: Some(Permission::Deny),
            ..AccessRule::folder("/secure/*")
        }]);

        let nested = details.evaluate("/secure/sub/", "file.txt", true);
        assert!(!nested.write);
        assert!(nested.read);

        let public = details.evaluate("/public/", "file.txt", true);
        assert!(public.write);
    }

    #[test]
    fn test_deny_default() {
        let details = AccessDetails {
            default_access: Permission::Deny,
            rules: vec![AccessRule {
                read: Some(Permission::Allow),
                ..AccessRule::folder("/shared/*")
            }],
            role: None,
        };
        assert!(details.evaluate_folder("/shared/").read);
        assert!(!details.evaluate_folder("/shared/").write);
        assert!(!details.evaluate_folder("/private/").read);
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let details = table(vec![
            AccessRule {
                download: Some(Permission::Deny),
                message: Some("no downloads".to_string()),
                ..AccessRule::file("*.*")
            },
            AccessRule {
                download: Some(Permission::Allow),
                ..AccessRule::file("/docs/*.pdf")
            },
        ]);

        let pdf = details.evaluate("/docs/", "Manual.PDF", true);
        assert!(pdf.download);
        assert_eq!(pdf.message, "");

        let txt = details.evaluate("/docs/", "notes.txt", true);
        assert!(!txt.download);
        assert_eq!(txt.message, "no downloads");

        // extension rules are not recursive
        assert!(!details.evaluate("/docs/old/", "a.pdf", true).download);
    }

    #[test]
    fn test_stem_and_exact_file_rules() {
        let details = table(vec![
            AccessRule {
                write: Some(Permission::Deny),
                ..AccessRule::file("/config/settings.*")
            },
            AccessRule {
                read: Some(Permission::Deny),
                ..AccessRule::file("/config/secret.key")
            },
        ]);
        assert!(!details.evaluate("/config/", "settings.json", true).write);
        assert!(details.evaluate("/config/", "other.json", true).write);
        assert!(!details.evaluate("/config/", "secret.key", true).read);
        // file rules never govern folders
        assert!(details.evaluate("/config/", "settings.d", false).write);
    }

    #[test]
    fn test_exact_folder_rule_narrows_nested_write() {
        let details = table(vec![AccessRule {
            read: Some(Permission::Deny),
            write_contents: Some(Permission::Deny),
            ..AccessRule::folder("/archive")
        }]);

        let folder = details.evaluate("/", "archive", false);
        assert!(!folder.read);
        assert!(!folder.write_contents);

        let nested = details.evaluate("/archive/2020/", "", false);
        assert!(nested.read);
        assert!(!nested.write);
        assert!(!nested.write_contents);

        let file = details.evaluate("/archive/", "a.txt", true);
        assert!(file.read);
        assert!(!file.write);
    }

    #[test]
    fn test_role_scoping() {
        let rule = AccessRule {
            role: Some("guest".to_string()),
            write: Some(Permission::Deny),
            ..AccessRule::folder("*")
        };
        let mut details = table(vec![rule]);
        details.role = Some("admin".to_string());
        assert!(details.evaluate_folder("/").write);

        details.role = Some("guest".to_string());
        assert!(!details.evaluate_folder("/").write);
    }

    #[test]
    fn test_rules_deserialize_from_camel_case() {
        let json = r#"{
            "role": "editor",
            "defaultAccess": "deny",
            "rules": [{"path": "/docs/*", "isFile": false, "read": "allow", "writeContents": "deny"}]
        }"#;
        let details: AccessDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.default_access, Permission::Deny);
        assert_eq!(details.rules[0].write_contents, Some(Permission::Deny));
        assert_eq!(details.rules[0].write, None);
    }
}
