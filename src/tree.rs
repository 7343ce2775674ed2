//! Recursive tree operations built from listing primitives
//!
//! FTP has no recursive delete, copy or size. Each of these walks the remote
//! tree with an explicit work list, issuing one listing per folder.

use std::collections::HashSet;
use tracing::debug;

use crate::listing::{parse_listing, ListingEntry};
use crate::paths::{self, join};
use crate::providers::{ProviderError, RemoteFs};

/// Parsed detailed listing of a directory
pub async fn list_entries(fs: &mut dyn RemoteFs, dir: &str) -> Result<Vec<ListingEntry>, ProviderError> {
    let lines = fs.list(dir).await?;
    parse_listing(&lines)
}

/// Names in a directory from `NLST`. Some servers answer with full paths,
/// only the leaf is kept.
async fn names_in(fs: &mut dyn RemoteFs, dir: &str) -> Result<Vec<String>, ProviderError> {
    match fs.nlst(dir).await {
        Ok(lines) => Ok(lines
            .iter()
            .map(|line| line.trim_end_matches(['\r', '\n']))
            .filter(|line| !line.is_empty())
            .map(paths::leaf_name)
            .collect()),
        Err(ProviderError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Whether `name` exists directly inside `dir`
pub async fn exists(
    fs: &mut dyn RemoteFs,
    dir: &str,
    name: &str,
    ignore_case: bool,
) -> Result<bool, ProviderError> {
    let names = names_in(fs, dir).await?;
    Ok(names
        .iter()
        .any(|candidate| candidate == name || (ignore_case && candidate.eq_ignore_ascii_case(name))))
}

/// Listing entry for `name` inside `dir`, if present
pub async fn find_entry(
    fs: &mut dyn RemoteFs,
    dir: &str,
    name: &str,
) -> Result<Option<ListingEntry>, ProviderError> {
    match list_entries(fs, dir).await {
        Ok(entries) => Ok(entries.into_iter().find(|entry| entry.name == name)),
        Err(ProviderError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// True as soon as one subdirectory is seen
pub async fn has_children(fs: &mut dyn RemoteFs, dir: &str) -> Result<bool, ProviderError> {
    let entries = list_entries(fs, dir).await?;
    Ok(entries.iter().any(|entry| !entry.is_file))
}

/// Total size of every file below `dir`
pub async fn folder_size(fs: &mut dyn RemoteFs, dir: &str) -> Result<u64, ProviderError> {
    let mut total = 0u64;
    let mut pending = vec![paths::ensure_trailing_slash(dir)];

    while let Some(current) = pending.pop() {
        for entry in list_entries(fs, &current).await? {
            if entry.is_file {
                total += entry.size;
            } else {
                pending.push(format!("{}{}/", current, entry.name));
            }
        }
    }
    Ok(total)
}

/// Delete a folder and everything below it.
///
/// Files are deleted as their folder is listed; a folder is removed only after
/// all of its subfolders have been removed.
pub async fn remove_tree(fs: &mut dyn RemoteFs, dir: &str) -> Result<(), ProviderError> {
    let root = dir.trim_end_matches('/').to_string();
    // (folder, children already handled)
    let mut stack: Vec<(String, bool)> = vec![(root, false)];

    while let Some((folder, expanded)) = stack.pop() {
        if expanded {
            debug!("RMD {}", folder);
            fs.rmdir(&folder).await?;
            continue;
        }

        let entries = list_entries(fs, &format!("{}/", folder)).await?;
        stack.push((folder.clone(), true));
        for entry in entries {
            let child = join(&folder, &entry.name);
            if entry.is_file {
                fs.delete(&child).await?;
            } else {
                stack.push((child, false));
            }
        }
    }
    Ok(())
}

/// Server-side copy by download then upload
pub async fn copy_file(fs: &mut dyn RemoteFs, src: &str, dst: &str) -> Result<u64, ProviderError> {
    let data = fs.retrieve(src).await?;
    fs.store(dst, &data).await?;
    Ok(data.len() as u64)
}

/// Copy a folder and its contents to `dst`, which must not exist yet
pub async fn copy_tree(fs: &mut dyn RemoteFs, src: &str, dst: &str) -> Result<(), ProviderError> {
    let src = src.trim_end_matches('/');
    let dst = dst.trim_end_matches('/');
    if dst.starts_with(&format!("{}/", src)) {
        return Err(ProviderError::TransferFailed(format!(
            "Cannot copy {} into its own subfolder {}",
            src, dst
        )));
    }

    let mut pending = vec![(src.to_string(), dst.to_string())];
    while let Some((from, to)) = pending.pop() {
        fs.mkdir(&to).await?;
        for entry in list_entries(fs, &format!("{}/", from)).await? {
            let child_from = join(&from, &entry.name);
            let child_to = join(&to, &entry.name);
            if entry.is_file {
                copy_file(fs, &child_from, &child_to).await?;
            } else {
                pending.push((child_from, child_to));
            }
        }
    }
    Ok(())
}

/// First free name of the form `stem(N).ext` inside `dir` (`name` itself when free)
pub async fn copy_name(fs: &mut dyn RemoteFs, dir: &str, name: &str) -> Result<String, ProviderError> {
    let taken: HashSet<String> = names_in(fs, dir).await?.into_iter().collect();
    Ok(next_free_name(&taken, name))
}

pub(crate) fn next_free_name(taken: &HashSet<String>, name: &str) -> String {
    let stem = paths::stem(name);
    let extension = paths::extension(name);
    let mut count = 0u32;
    loop {
        let candidate = if count == 0 {
            name.to_string()
        } else {
            format!("{}({}){}", stem, count, extension)
        };
        if !taken.contains(&candidate) {
            return candidate;
        }
        count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Connector, MemoryConnector};

    fn sample() -> MemoryConnector {
        let server = MemoryConnector::new();
        server.add_file("/root/a.txt", b"12345");
        server.add_file("/root/sub/b.bin", &[0u8; 100]);
        server.add_file("/root/sub/deeper/c.bin", &[0u8; 20]);
        server.add_dir("/root/empty");
        server
    }

    #[tokio::test]
    async fn test_exists_and_case_insensitive_lookup() {
        let server = sample();
        let mut fs = server.connect().await.unwrap();
        assert!(exists(fs.as_mut(), "/root/", "a.txt", false).await.unwrap());
        assert!(!exists(fs.as_mut(), "/root/", "A.TXT", false).await.unwrap());
        assert!(exists(fs.as_mut(), "/root/", "A.TXT", true).await.unwrap());
        assert!(!exists(fs.as_mut(), "/missing/", "a.txt", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_children_and_folder_size() {
        let server = sample();
        let mut fs = server.connect().await.unwrap();
        assert!(has_children(fs.as_mut(), "/root/").await.unwrap());
        assert!(!has_children(fs.as_mut(), "/root/empty/").await.unwrap());
        assert_eq!(folder_size(fs.as_mut(), "/root").await.unwrap(), 125);
    }

    #[tokio::test]
    async fn test_remove_tree_deletes_children_before_parent() {
        let server = MemoryConnector::new();
        server.add_file("/victim/file.txt", b"x");
        server.add_dir("/victim/nested");

        let mut fs = server.connect().await.unwrap();
        remove_tree(fs.as_mut(), "/victim/").await.unwrap();

        let commands = server.commands();
        let position = |cmd: &str| commands.iter().position(|c| c == cmd).unwrap();
        assert!(position("DELE /victim/file.txt") < position("RMD /victim"));
        assert!(position("RMD /victim/nested") < position("RMD /victim"));
        assert!(!exists(fs.as_mut(), "/", "victim", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_tree_mirrors_structure() {
        let server = sample();
        let mut fs = server.connect().await.unwrap();
        copy_tree(fs.as_mut(), "/root/sub", "/copy").await.unwrap();

        assert_eq!(server.read("/copy/b.bin").unwrap().len(), 100);
        assert_eq!(server.read("/copy/deeper/c.bin").unwrap().len(), 20);
        assert!(server.exists("/root/sub/deeper/c.bin"));
    }

    #[tokio::test]
    async fn test_copy_tree_refuses_own_subfolder() {
        let server = sample();
        let mut fs = server.connect().await.unwrap();
        assert!(copy_tree(fs.as_mut(), "/root", "/root/sub/root").await.is_err());
    }

    #[tokio::test]
    async fn test_copy_name_counts_up() {
        let server = MemoryConnector::new();
        server.add_file("/d/report.pdf", b"");
        server.add_file("/d/report(1).pdf", b"");
        server.add_dir("/d/Folder");

        let mut fs = server.connect().await.unwrap();
        assert_eq!(copy_name(fs.as_mut(), "/d/", "report.pdf").await.unwrap(), "report(2).pdf");
        assert_eq!(copy_name(fs.as_mut(), "/d/", "Folder").await.unwrap(), "Folder(1)");
        assert_eq!(copy_name(fs.as_mut(), "/d/", "new.txt").await.unwrap(), "new.txt");
    }
}
