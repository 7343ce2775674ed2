//! Virtual path ↔ server path mapping
//!
//! Virtual paths are what the caller sees: `/` is the configured root folder
//! and directories carry a trailing `/`. Server paths are absolute paths on the
//! FTP server (`root + virtual`).

/// Separator used in `filterPath` values handed back to callers
pub const FILTER_SEPARATOR: char = '\\';

/// Maps virtual paths onto one server root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: String,
    root_name: String,
}

impl PathResolver {
    /// `root` is the absolute server folder without trailing `/` (`""` for the
    /// server root)
    pub fn new(root: impl Into<String>, root_name: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
            root_name: root_name.into(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Absolute server path for a virtual path.
    ///
    /// Every `../` token is removed textually; this does not normalize
    /// `..` sequences that are not followed by a separator.
    pub fn resolve(&self, virtual_path: &str) -> String {
        let joined = if virtual_path.starts_with('/') {
            format!("{}{}", self.root, virtual_path)
        } else {
            format!("{}/{}", self.root, virtual_path)
        };
        joined.replace("../", "")
    }

    /// Virtual path (relative to the root) of an absolute server path
    pub fn virtual_path(&self, full_path: &str) -> String {
        let relative = full_path.strip_prefix(self.root.as_str()).unwrap_or(full_path);
        if relative.starts_with('/') {
            relative.to_string()
        } else {
            format!("/{}", relative)
        }
    }

    /// `filterPath` of a server folder: the virtual path with `\` separators
    pub fn filter_path(&self, folder_path: &str) -> String {
        self.virtual_path(folder_path).replace('/', &FILTER_SEPARATOR.to_string())
    }
}

/// Split a full path into (parent with trailing `/`, leaf).
///
/// For files the leaf is the last segment. Directory paths are expected to
/// end in `/`, so their leaf is the second-to-last segment.
pub fn split(path: &str, is_file: bool) -> (String, String) {
    let segments: Vec<&str> = path.split('/').collect();
    let skip = if is_file { 1 } else { 2 };
    let Some(leaf_index) = segments.len().checked_sub(skip) else {
        return (String::new(), path.to_string());
    };

    let mut parent = String::new();
    for segment in &segments[..leaf_index] {
        parent.push_str(segment);
        parent.push('/');
    }
    (parent, segments[leaf_index].to_string())
}

/// Last non-empty segment (`/a/b/` → `b`)
pub fn leaf_name(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// `dir/` + `name`
pub fn join(dir: &str, name: &str) -> String {
    format!("{}{}", ensure_trailing_slash(dir), name)
}

pub fn ensure_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Extension including the dot, or `""`
pub fn extension(name: &str) -> &str {
    name.rfind('.').map_or("", |index| &name[index..])
}

/// Name without its extension
pub fn stem(name: &str) -> &str {
    name.rfind('.').map_or(name, |index| &name[..index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_strips_traversal() {
        let resolver = PathResolver::new("/pub/shared/", "shared");
        assert_eq!(resolver.root(), "/pub/shared");
        assert_eq!(resolver.resolve("/docs/"), "/pub/shared/docs/");
        assert_eq!(resolver.resolve("/../../etc/passwd"), "/pub/shared/etc/passwd");
        assert_eq!(resolver.resolve("docs/"), "/pub/shared/docs/");
    }

    #[test]
    fn test_split_file_and_directory() {
        assert_eq!(
            split("/pub/docs/a.txt", true),
            ("/pub/docs/".to_string(), "a.txt".to_string())
        );
        assert_eq!(
            split("/pub/docs/", false),
            ("/pub/".to_string(), "docs".to_string())
        );
    }

    #[test]
    fn test_split_rejoins_to_original() {
        for path in ["/a.txt", "/x/y/z.tar.gz", "rel/name", "/with space/#hash", "//double"] {
            let (parent, leaf) = split(path, true);
            assert_eq!(format!("{}{}", parent, leaf), path);
        }
    }

    #[test]
    fn test_filter_path_uses_backslashes() {
        let resolver = PathResolver::new("/pub", "pub");
        assert_eq!(resolver.filter_path("/pub/docs/2024/"), "\\docs\\2024\\");
        assert_eq!(resolver.filter_path("/pub/"), "\\");

        let server_root = PathResolver::new("", "ftp.example.com");
        assert_eq!(server_root.filter_path("/docs/"), "\\docs\\");
        assert_eq!(server_root.virtual_path("/docs/a.txt"), "/docs/a.txt");
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(leaf_name("/a/b/"), "b");
        assert_eq!(leaf_name("/"), "");
        assert_eq!(extension("photo.JPG"), ".JPG");
        assert_eq!(extension("Makefile"), "");
        assert_eq!(stem("archive.tar.gz"), "archive.tar");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/a/", "b"), "/a/b");
    }
}
