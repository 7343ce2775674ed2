//! In-memory FTP server stand-in.
//!
//! Renders Unix or DOS style LIST lines and answers with the same reply codes
//! a real server would, so the whole engine (listing parser included) can be
//! exercised without a network. Every mutating command is recorded in a
//! command log for ordering assertions.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Connector, ProviderError, RemoteFs};

/// Which server dialect the LIST output imitates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListingStyle {
    #[default]
    Unix,
    Dos,
}

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, modified: NaiveDateTime },
    Directory { modified: NaiveDateTime },
}

#[derive(Debug, Default)]
struct MemoryTree {
    nodes: BTreeMap<String, Node>,
    commands: Vec<String>,
    connections: usize,
}

impl MemoryTree {
    fn is_dir(&self, key: &str) -> bool {
        key == "/" || matches!(self.nodes.get(key), Some(Node::Directory { .. }))
    }

    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a Node)> + 'a {
        self.nodes
            .iter()
            .filter(move |(key, _)| parent_of(key) == dir)
    }
}

/// Shared in-memory server. Cloning shares the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    tree: Arc<Mutex<MemoryTree>>,
    style: ListingStyle,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer LIST with Windows/IIS style lines
    pub fn with_dos_listing(mut self) -> Self {
        self.style = ListingStyle::Dos;
        self
    }

    fn tree(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a directory and any missing parents
    pub fn add_dir(&self, path: &str) -> &Self {
        let mut tree = self.tree();
        let mut current = String::new();
        for segment in normalize(path).split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            tree.nodes
                .entry(current.clone())
                .or_insert(Node::Directory { modified: now() });
        }
        self
    }

    /// Create (or overwrite) a file, creating missing parents
    pub fn add_file(&self, path: &str, data: &[u8]) -> &Self {
        let key = normalize(path);
        self.add_dir(&parent_of(&key));
        self.tree().nodes.insert(
            key,
            Node::File {
                data: data.to_vec(),
                modified: now(),
            },
        );
        self
    }

    pub fn exists(&self, path: &str) -> bool {
        let key = normalize(path);
        key == "/" || self.tree().nodes.contains_key(&key)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.tree().is_dir(&normalize(path))
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.tree().nodes.get(&normalize(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Names directly inside a directory, sorted
    pub fn names(&self, path: &str) -> Vec<String> {
        let dir = normalize(path);
        let tree = self.tree();
        tree.children(&dir).map(|(key, _)| leaf_of(key)).collect()
    }

    /// Mutating commands received so far, e.g. `DELE /a/b.txt`, `RMD /a`
    pub fn commands(&self) -> Vec<String> {
        self.tree().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.tree().commands.clear();
    }

    /// Number of control connections opened so far
    pub fn connections(&self) -> usize {
        self.tree().connections
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteFs>, ProviderError> {
        self.tree().connections += 1;
        Ok(Box::new(MemorySession {
            server: self.clone(),
        }))
    }

    fn display_name(&self) -> String {
        "memory".to_string()
    }
}

/// One session against a [`MemoryConnector`]
pub struct MemorySession {
    server: MemoryConnector,
}

impl MemorySession {
    fn missing(path: &str) -> ProviderError {
        ProviderError::from_reply(550, format!("{}: No such file or directory", path))
    }
}

#[async_trait]
impl RemoteFs for MemorySession {
    async fn list(&mut self, path: &str) -> Result<Vec<String>, ProviderError> {
        let dir = normalize(path);
        let tree = self.server.tree();
        if !tree.is_dir(&dir) {
            return Err(Self::missing(path));
        }

        let mut lines = Vec::new();
        if self.server.style == ListingStyle::Unix {
            lines.push(format!("total {}", tree.children(&dir).count()));
        }
        for (key, node) in tree.children(&dir) {
            lines.push(render_line(self.server.style, &leaf_of(key), node));
        }
        Ok(lines)
    }

    async fn nlst(&mut self, path: &str) -> Result<Vec<String>, ProviderError> {
        let dir = normalize(path);
        let tree = self.server.tree();
        if !tree.is_dir(&dir) {
            return Err(Self::missing(path));
        }
        Ok(tree.children(&dir).map(|(key, _)| leaf_of(key)).collect())
    }

    async fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, ProviderError> {
        let mut tree = self.server.tree();
        let key = normalize(path);
        tree.commands.push(format!("RETR {}", key));
        match tree.nodes.get(&key) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            _ => Err(Self::missing(path)),
        }
    }

    async fn store(&mut self, path: &str, data: &[u8]) -> Result<(), ProviderError> {
        let mut tree = self.server.tree();
        let key = normalize(path);
        if !tree.is_dir(&parent_of(&key)) || tree.is_dir(&key) {
            return Err(ProviderError::from_reply(553, "Could not create file."));
        }
        tree.commands.push(format!("STOR {}", key));
        tree.nodes.insert(
            key,
            Node::File {
                data: data.to_vec(),
                modified: now(),
            },
        );
        Ok(())
    }

    async fn delete(&mut self, path: &str) -> Result<(), ProviderError> {
        let mut tree = self.server.tree();
        let key = normalize(path);
        match tree.nodes.get(&key) {
            Some(Node::File { .. }) => {
                tree.nodes.remove(&key);
                tree.commands.push(format!("DELE {}", key));
                Ok(())
            }
            _ => Err(Self::missing(path)),
        }
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), ProviderError> {
        let mut tree = self.server.tree();
        let key = normalize(path);
        if key == "/" || tree.nodes.contains_key(&key) {
            return Err(ProviderError::from_reply(
                550,
                "Create directory operation failed: File exists",
            ));
        }
        if !tree.is_dir(&parent_of(&key)) {
            return Err(Self::missing(path));
        }
        tree.commands.push(format!("MKD {}", key));
        tree.nodes.insert(key, Node::Directory { modified: now() });
        Ok(())
    }

    async fn rmdir(&mut self, path: &str) -> Result<(), ProviderError> {
        let mut tree = self.server.tree();
        let key = normalize(path);
        if key == "/" || !tree.is_dir(&key) {
            return Err(Self::missing(path));
        }
        if tree.children(&key).next().is_some() {
            return Err(ProviderError::from_reply(550, "Remove directory operation failed: Directory not empty"));
        }
        tree.nodes.remove(&key);
        tree.commands.push(format!("RMD {}", key));
        Ok(())
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), ProviderError> {
        let mut tree = self.server.tree();
        let source = normalize(from);
        let target = normalize(to);
        if !tree.nodes.contains_key(&source) {
            return Err(Self::missing(from));
        }
        if tree.nodes.contains_key(&target) {
            return Err(ProviderError::from_reply(553, "Rename failed: file exists"));
        }
        if !tree.is_dir(&parent_of(&target)) {
            return Err(Self::missing(to));
        }

        let prefix = format!("{}/", source);
        let moved: Vec<String> = tree
            .nodes
            .keys()
            .filter(|key| **key == source || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = tree.nodes.remove(&key) {
                let new_key = format!("{}{}", target, &key[source.len()..]);
                tree.nodes.insert(new_key, node);
            }
        }
        tree.commands.push(format!("RNFR {}", source));
        tree.commands.push(format!("RNTO {}", target));
        Ok(())
    }

    async fn quit(&mut self) {}
}

fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// `/a//b/` → `/a/b`, empty → `/`
fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn parent_of(key: &str) -> String {
    match key.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => key[..index].to_string(),
    }
}

fn leaf_of(key: &str) -> String {
    key.rsplit('/').next().unwrap_or_default().to_string()
}

fn render_line(style: ListingStyle, name: &str, node: &Node) -> String {
    match (style, node) {
        (ListingStyle::Unix, Node::Directory { modified }) => format!(
            "drwxr-xr-x    2 ftp      ftp          4096 {} {}",
            modified.format("%b %d %H:%M"),
            name
        ),
        (ListingStyle::Unix, Node::File { data, modified }) => format!(
            "-rw-r--r--    1 ftp      ftp      {:>8} {} {}",
            data.len(),
            modified.format("%b %d %H:%M"),
            name
        ),
        (ListingStyle::Dos, Node::Directory { modified }) => format!(
            "{}       <DIR>          {}",
            modified.format("%m-%d-%y  %I:%M%p"),
            name
        ),
        (ListingStyle::Dos, Node::File { data, modified }) => format!(
            "{}  {:>20} {}",
            modified.format("%m-%d-%y  %I:%M%p"),
            data.len(),
            name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_renders_unix_lines() {
        let server = MemoryConnector::new();
        server.add_file("/docs/readme.txt", b"hello");
        server.add_dir("/docs/archive");

        let mut session = server.connect().await.unwrap();
        let lines = session.list("/docs/").await.unwrap();

        assert_eq!(lines[0], "total 2");
        assert!(lines[1].starts_with("drwxr-xr-x") && lines[1].ends_with(" archive"));
        assert!(lines[2].starts_with("-rw-r--r--") && lines[2].ends_with(" readme.txt"));
    }

    #[tokio::test]
    async fn test_rmdir_refuses_non_empty_directory() {
        let server = MemoryConnector::new();
        server.add_file("/a/b.txt", b"x");

        let mut session = server.connect().await.unwrap();
        assert!(session.rmdir("/a").await.is_err());
        session.delete("/a/b.txt").await.unwrap();
        session.rmdir("/a/").await.unwrap();
        assert!(!server.exists("/a"));
        assert_eq!(server.commands(), vec!["DELE /a/b.txt", "RMD /a"]);
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let server = MemoryConnector::new();
        server.add_file("/src/inner/file.bin", b"data");

        let mut session = server.connect().await.unwrap();
        session.rename("/src", "/dst").await.unwrap();

        assert!(!server.exists("/src"));
        assert_eq!(server.read("/dst/inner/file.bin").unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_mkdir_existing_reports_exists() {
        let server = MemoryConnector::new();
        server.add_dir("/photos");

        let mut session = server.connect().await.unwrap();
        let err = session.mkdir("/photos").await.unwrap_err();
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
    }
}
