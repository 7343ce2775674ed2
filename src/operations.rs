//! File manager operations
//!
//! Every public operation opens its own FTP session, runs its protocol round
//! trips sequentially, sends QUIT and reports the outcome as an
//! [`OperationResult`]. Failures never escape as `Err`; they land in
//! `result.error`, alongside whatever part of a batch already succeeded.

use chrono::{Local, NaiveDateTime};
use regex::{Regex, RegexBuilder};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::access::{self, AccessDetails, AccessPermission};
use crate::error::FileManagerError;
use crate::listing::ListingEntry;
use crate::paths::{self, ensure_trailing_slash, join, PathResolver};
use crate::providers::{Connector, FtpConfig, FtpConnector, ProviderError, RemoteFs};
use crate::staging::default_staging_root;
use crate::tree;
use crate::types::{
    DirectoryEntry, FileAction, FileDetails, FileOperationRequest, OperationResult,
};

/// Location reported when a details batch spans several folders
pub const VARIOUS_FOLDERS: &str = "Various Folders";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    Copy,
    Move,
}

/// FTP-backed virtual filesystem
pub struct FileManager {
    connector: Arc<dyn Connector>,
    pub(crate) resolver: PathResolver,
    rules: RwLock<Option<Arc<AccessDetails>>>,
    pub(crate) staging_root: PathBuf,
}

impl FileManager {
    pub fn new(connector: Arc<dyn Connector>, resolver: PathResolver) -> Self {
        Self {
            connector,
            resolver,
            rules: RwLock::new(None),
            staging_root: default_staging_root(),
        }
    }

    /// File manager over a real FTP server; the URL path of `config` is the root
    pub fn ftp(config: FtpConfig) -> Self {
        let resolver = PathResolver::new(config.root_path.clone(), config.root_name.clone());
        Self::new(Arc::new(FtpConnector::new(config)), resolver)
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_rules(self, rules: AccessDetails) -> Self {
        self.set_rules(Some(rules));
        self
    }

    /// Replace the rule table. `None` permits everything.
    pub fn set_rules(&self, rules: Option<AccessDetails>) {
        match &rules {
            Some(details) => info!(
                "Access rules updated: {} rule(s), role {:?}",
                details.rules.len(),
                details.role
            ),
            None => info!("Access rules cleared"),
        }
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = rules.map(Arc::new);
    }

    /// Snapshot of the current rule table
    pub fn rules(&self) -> Option<Arc<AccessDetails>> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub(crate) async fn session(&self) -> Result<Box<dyn RemoteFs>, FileManagerError> {
        debug!("Opening session: {}", self.connector.display_name());
        Ok(self.connector.connect().await?)
    }

    // ─── read ──────────────────────────────────────────────────────────────

    /// List the folder at the virtual `path`
    pub async fn read(&self, path: &str, show_hidden_items: bool, data: &[DirectoryEntry]) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self
                .read_in(fs.as_mut(), &mut result, path, show_hidden_items, data)
                .await;
            fs.quit().await;
            outcome
        }
        .await;
        finish(result, outcome, "read", path)
    }

    async fn read_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        path: &str,
        show_hidden_items: bool,
        data: &[DirectoryEntry],
    ) -> Result<(), FileManagerError> {
        let rules = self.rules();
        let rules = rules.as_deref();
        let full = ensure_trailing_slash(&self.resolver.resolve(path));

        let cwd = self.cwd_entry(fs, rules, path, &full, data.first()).await?;
        let readable = cwd.permission.as_ref().map_or(true, |p| p.read);
        result.cwd = Some(cwd);
        if !readable {
            return Err(self.not_accessible(path));
        }

        let mut files = Vec::new();
        for item in tree::list_entries(fs, &full).await? {
            if !show_hidden_items && item.name.starts_with('.') {
                continue;
            }
            let mut entry = self.make_entry(rules, &full, &item.name, item.is_file, item.size, item.modified);
            if !item.is_file {
                entry.has_child = tree::has_children(fs, &format!("{}{}/", full, item.name)).await?;
            }
            files.push(entry);
        }
        result.files = Some(files);
        Ok(())
    }

    // ─── create ────────────────────────────────────────────────────────────

    /// Create folder `name` inside `path`
    pub async fn create(&self, path: &str, name: &str) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self.create_in(fs.as_mut(), &mut result, path, name).await;
            fs.quit().await;
            outcome
        }
        .await;
        finish(result, outcome, "create", path)
    }

    async fn create_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        path: &str,
        name: &str,
    ) -> Result<(), FileManagerError> {
        if name.trim().is_empty() {
            return Err(FileManagerError::InvalidRequest("Folder name must not be empty".to_string()));
        }
        let rules = self.rules();
        let rules = rules.as_deref();
        require(
            rules.map(|r| r.evaluate_folder(&ensure_trailing_slash(path))),
            |p| p.write_contents,
            &self.folder_display_name(path),
            "writeContents",
        )?;

        let full = ensure_trailing_slash(&self.resolver.resolve(path));
        match fs.mkdir(&join(&full, name)).await {
            Ok(()) => {}
            Err(ProviderError::AlreadyExists(_)) => {
                return Err(FileManagerError::conflict(
                    format!("A file or folder with the name {} already exists.", name),
                    vec![name.to_string()],
                ))
            }
            Err(e) => return Err(e.into()),
        }
        info!("Created folder {}{}", full, name);

        let entry = self.make_entry(rules, &full, name, false, 0, now());
        result.files = Some(vec![entry]);
        Ok(())
    }

    // ─── rename ────────────────────────────────────────────────────────────

    /// Rename `name` inside `path` to `new_name`.
    ///
    /// With `replace`, an existing destination is set aside and removed once
    /// the rename succeeds. A change of letter case only goes through a
    /// `Sync_Temp_` name so case-insensitive servers accept it. A failed rename
    /// puts everything back.
    pub async fn rename(
        &self,
        path: &str,
        name: &str,
        new_name: &str,
        replace: bool,
        data: &[DirectoryEntry],
    ) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self
                .rename_in(fs.as_mut(), &mut result, path, name, new_name, replace, data)
                .await;
            fs.quit().await;
            outcome
        }
        .await;
        finish(result, outcome, "rename", path)
    }

    #[allow(clippy::too_many_arguments)]
    async fn rename_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        path: &str,
        name: &str,
        new_name: &str,
        replace: bool,
        data: &[DirectoryEntry],
    ) -> Result<(), FileManagerError> {
        let rules = self.rules();
        let rules = rules.as_deref();
        let base = self.resolver.resolve(path);
        let full = join(&base, name.trim_end_matches('/'));
        let new_full = join(&base, new_name.trim_end_matches('/'));
        let (parent, old_leaf) = paths::split(&full, true);
        let (dest_parent, new_leaf) = paths::split(&new_full, true);

        let Some((is_file, size)) = self.locate(fs, &parent, &old_leaf, data.first()).await? else {
            return Err(not_found(vec![old_leaf], Vec::new()));
        };
        require(
            access::evaluate(rules, &self.resolver.virtual_path(&parent), &old_leaf, is_file),
            |p| p.write,
            &old_leaf,
            "write",
        )?;

        let cannot_rename = || {
            FileManagerError::conflict(
                format!("Cannot rename {} to {}: destination already exists.", old_leaf, new_leaf),
                vec![new_leaf.clone()],
            )
        };

        let target = join(&dest_parent, &new_leaf);
        let mut source = full.clone();
        // Replaced destination parked here until the rename lands
        let mut replaced: Option<(String, bool)> = None;
        if tree::exists(fs, &dest_parent, &new_leaf, true).await? {
            if !old_leaf.eq_ignore_ascii_case(&new_leaf) {
                if !replace {
                    return Err(cannot_rename());
                }
                if let Some(existing) = tree::find_entry(fs, &dest_parent, &new_leaf).await? {
                    let aside = join(&dest_parent, &format!("Sync_Old_{}", new_leaf));
                    fs.rename(&target, &aside).await?;
                    replaced = Some((aside, existing.is_file));
                }
            } else {
                let temp = join(&parent, &format!("Sync_Temp_{}", new_leaf));
                debug!("Case-only rename via {}", temp);
                fs.rename(&source, &temp).await?;
                source = temp;
            }
        }

        if let Err(err) = fs.rename(&source, &target).await {
            if source != full {
                if let Err(e) = fs.rename(&source, &full).await {
                    warn!("Failed to restore {} from {}: {}", full, source, e);
                }
            }
            if let Some((aside, _)) = &replaced {
                if let Err(e) = fs.rename(aside, &target).await {
                    warn!("Failed to restore {} from {}: {}", target, aside, e);
                }
            }
            return Err(match err {
                ProviderError::AlreadyExists(_) => cannot_rename(),
                e => e.into(),
            });
        }
        match replaced {
            Some((aside, true)) => fs.delete(&aside).await?,
            Some((aside, false)) => tree::remove_tree(fs, &aside).await?,
            None => {}
        }

        let mut entry = self.make_entry(rules, &dest_parent, &new_leaf, is_file, size, now());
        if !is_file {
            entry.has_child = tree::has_children(fs, &format!("{}/", target)).await?;
        }
        result.files = Some(vec![entry]);
        Ok(())
    }

    // ─── delete ────────────────────────────────────────────────────────────

    /// Delete every named entry; folders are removed recursively
    pub async fn delete(&self, path: &str, names: &[String], data: &[DirectoryEntry]) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self.delete_in(fs.as_mut(), &mut result, path, names, data).await;
            fs.quit().await;
            outcome
        }
        .await;
        finish(result, outcome, "delete", path)
    }

    async fn delete_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        path: &str,
        names: &[String],
        data: &[DirectoryEntry],
    ) -> Result<(), FileManagerError> {
        let rules = self.rules();
        let rules = rules.as_deref();
        let base = self.resolver.resolve(path);

        // Check every target before touching any of them
        let mut plan = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for (index, raw) in names.iter().enumerate() {
            let full = join(&base, raw.trim_end_matches('/'));
            let (parent, leaf) = paths::split(&full, true);
            match self.locate(fs, &parent, &leaf, data.get(index)).await? {
                Some((is_file, size)) => {
                    require(
                        access::evaluate(rules, &self.resolver.virtual_path(&parent), &leaf, is_file),
                        |p| p.write,
                        &leaf,
                        "write",
                    )?;
                    plan.push((index, full, parent, leaf, is_file, size));
                }
                None => missing.push(leaf),
            }
        }

        let files = result.files.insert(Vec::new());
        for (index, full, parent, leaf, is_file, size) in plan {
            if is_file {
                fs.delete(&full).await?;
            } else {
                tree::remove_tree(fs, &full).await?;
            }
            info!("Deleted {}", full);
            files.push(match data.get(index) {
                Some(claimed) => claimed.clone(),
                None => self.make_entry(rules, &parent, &leaf, is_file, size, now()),
            });
        }

        if !missing.is_empty() {
            return Err(not_found(missing, Vec::new()));
        }
        Ok(())
    }

    // ─── copy / move ───────────────────────────────────────────────────────

    /// Copy `names` from `path` into `target_path`.
    ///
    /// Names listed in `rename_files`, and names copied onto themselves, are
    /// written under a free `name(N)` instead of conflicting.
    pub async fn copy(
        &self,
        path: &str,
        target_path: &str,
        names: &[String],
        rename_files: &[String],
        data: &[DirectoryEntry],
    ) -> OperationResult {
        self.copy_or_move(CopyMode::Copy, path, target_path, names, rename_files, data)
            .await
    }

    /// Move `names` from `path` into `target_path` (copy, then delete the source)
    pub async fn move_items(
        &self,
        path: &str,
        target_path: &str,
        names: &[String],
        rename_files: &[String],
        data: &[DirectoryEntry],
    ) -> OperationResult {
        self.copy_or_move(CopyMode::Move, path, target_path, names, rename_files, data)
            .await
    }

    async fn copy_or_move(
        &self,
        mode: CopyMode,
        path: &str,
        target_path: &str,
        names: &[String],
        rename_files: &[String],
        data: &[DirectoryEntry],
    ) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self
                .copy_or_move_in(fs.as_mut(), &mut result, mode, path, target_path, names, rename_files, data)
                .await;
            fs.quit().await;
            outcome
        }
        .await;
        let label = match mode {
            CopyMode::Copy => "copy",
            CopyMode::Move => "move",
        };
        finish(result, outcome, label, path)
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_or_move_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        mode: CopyMode,
        path: &str,
        target_path: &str,
        names: &[String],
        rename_files: &[String],
        data: &[DirectoryEntry],
    ) -> Result<(), FileManagerError> {
        let rules = self.rules();
        let rules = rules.as_deref();
        require(
            rules.map(|r| r.evaluate_folder(&ensure_trailing_slash(target_path))),
            |p| p.write_contents,
            &self.folder_display_name(target_path),
            "writeContents",
        )?;

        let source_base = ensure_trailing_slash(&self.resolver.resolve(path));
        let target_dir = ensure_trailing_slash(&self.resolver.resolve(target_path));
        let mut existing = Vec::new();
        let mut missing = Vec::new();
        result.files = Some(Vec::new());

        for (index, raw) in names.iter().enumerate() {
            let raw = raw.trim_end_matches('/');
            // names may carry a sub-path relative to `path`
            let (source_dir, name) = match raw.rfind('/') {
                Some(slash) => (format!("{}{}", source_base, &raw[..=slash]), raw[slash + 1..].to_string()),
                None => (source_base.clone(), raw.to_string()),
            };
            let source = format!("{}{}", source_dir, name);
            let destination = format!("{}{}", target_dir, name);

            let Some((is_file, size)) = self.locate(fs, &source_dir, &name, data.get(index)).await? else {
                missing.push(name);
                continue;
            };
            let permission = access::evaluate(rules, &self.resolver.virtual_path(&source_dir), &name, is_file);
            match mode {
                CopyMode::Copy => require(permission, |p| p.copy, &name, "copy")?,
                CopyMode::Move => require(permission, |p| p.write, &name, "write")?,
            }

            let final_name = if tree::exists(fs, &target_dir, &name, false).await? {
                if source == destination || rename_files.iter().any(|flagged| *flagged == name) {
                    tree::copy_name(fs, &target_dir, &name).await?
                } else {
                    existing.push(name);
                    continue;
                }
            } else {
                name.clone()
            };
            let final_path = format!("{}{}", target_dir, final_name);

            if is_file {
                tree::copy_file(fs, &source, &final_path).await?;
            } else {
                tree::copy_tree(fs, &source, &final_path).await?;
            }
            if mode == CopyMode::Move {
                if is_file {
                    fs.delete(&source).await?;
                } else {
                    tree::remove_tree(fs, &source).await?;
                }
            }
            info!("{:?} {} -> {}", mode, source, final_path);

            let mut entry = self.make_entry(rules, &target_dir, &final_name, is_file, size, now());
            if !is_file {
                entry.has_child = tree::has_children(fs, &format!("{}/", final_path)).await?;
            }
            entry.previous_name = Some(name);
            result.files.get_or_insert_with(Vec::new).push(entry);
        }

        if !missing.is_empty() {
            return Err(not_found(missing, existing));
        }
        if !existing.is_empty() {
            return Err(FileManagerError::conflict("File Already Exists", existing));
        }
        Ok(())
    }

    // ─── search ────────────────────────────────────────────────────────────

    /// Find entries below `path` whose name matches the glob `search_string`
    /// (`*` any run, `?` one character)
    pub async fn search(
        &self,
        path: &str,
        search_string: &str,
        show_hidden_items: bool,
        case_sensitive: bool,
        data: &[DirectoryEntry],
    ) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self
                .search_in(fs.as_mut(), &mut result, path, search_string, show_hidden_items, case_sensitive, data)
                .await;
            fs.quit().await;
            outcome
        }
        .await;
        finish(result, outcome, "search", path)
    }

    #[allow(clippy::too_many_arguments)]
    async fn search_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        path: &str,
        search_string: &str,
        show_hidden_items: bool,
        case_sensitive: bool,
        data: &[DirectoryEntry],
    ) -> Result<(), FileManagerError> {
        let rules = self.rules();
        let rules = rules.as_deref();
        let full = ensure_trailing_slash(&self.resolver.resolve(path));

        let cwd = self.cwd_entry(fs, rules, path, &full, data.first()).await?;
        let readable = cwd.permission.as_ref().map_or(true, |p| p.read);
        result.cwd = Some(cwd);
        if !readable {
            return Err(self.not_accessible(path));
        }

        let pattern = glob_regex(search_string, case_sensitive)?;
        let mut found = Vec::new();
        // Depth-first, in listing order: a folder's matches follow the folder
        let mut stack: Vec<(String, VecDeque<ListingEntry>)> =
            vec![(full.clone(), tree::list_entries(fs, &full).await?.into())];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let Some(item) = frame.1.pop_front() else {
                stack.pop();
                continue;
            };
            let dir = frame.0.clone();
            if !show_hidden_items && item.name.starts_with('.') {
                continue;
            }

            let matched = pattern.is_match(&item.name);
            let mut entry = self.make_entry(rules, &dir, &item.name, item.is_file, item.size, item.modified);
            if item.is_file {
                if matched {
                    found.push(entry);
                }
                continue;
            }

            let child_dir = format!("{}{}/", dir, item.name);
            let traverse = entry.permission.as_ref().map_or(true, |p| p.read);
            if traverse {
                let children = tree::list_entries(fs, &child_dir).await?;
                entry.has_child = children.iter().any(|child| !child.is_file);
                if matched {
                    found.push(entry);
                }
                stack.push((child_dir, children.into()));
                continue;
            }
            if matched {
                // Not searched, but the tree still needs its expander
                entry.has_child = match tree::has_children(fs, &child_dir).await {
                    Ok(has_child) => has_child,
                    Err(e) => {
                        debug!("Cannot list {}: {}", child_dir, e);
                        false
                    }
                };
                found.push(entry);
            }
        }

        debug!("Search '{}' in {}: {} match(es)", search_string, path, found.len());
        result.files = Some(found);
        Ok(())
    }

    // ─── details ───────────────────────────────────────────────────────────

    /// Details of the current folder (no names), one entry, or a batch
    pub async fn details(&self, path: &str, names: &[String], data: &[DirectoryEntry]) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self.details_in(fs.as_mut(), &mut result, path, names, data).await;
            fs.quit().await;
            outcome
        }
        .await;
        finish(result, outcome, "details", path)
    }

    async fn details_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        path: &str,
        names: &[String],
        data: &[DirectoryEntry],
    ) -> Result<(), FileManagerError> {
        let base = ensure_trailing_slash(&self.resolver.resolve(path));
        let names: Vec<&str> = names
            .iter()
            .map(|name| name.trim_end_matches('/'))
            .filter(|name| !name.is_empty())
            .collect();

        let details = match names.as_slice() {
            [] => {
                let claimed = data.first();
                let name = claimed
                    .map(|entry| entry.name.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| self.folder_display_name(path));
                let size = tree::folder_size(fs, &base).await?;
                let modified = claimed.map(|entry| entry.date_modified);
                FileDetails {
                    name,
                    location: self.location_of(&base),
                    is_file: false,
                    size: byte_conversion(size),
                    created: modified,
                    modified,
                    multiple_files: false,
                }
            }
            [single] => {
                let full = join(&base, single);
                let (parent, leaf) = paths::split(&full, true);
                let (is_file, size, modified) = match data.first() {
                    Some(claimed) => (claimed.is_file, claimed.size, claimed.date_modified),
                    None => match tree::find_entry(fs, &parent, &leaf).await? {
                        Some(entry) => (entry.is_file, entry.size, entry.modified),
                        None => return Err(not_found(vec![leaf], Vec::new())),
                    },
                };
                let size = if is_file {
                    size
                } else {
                    tree::folder_size(fs, &full).await?
                };
                FileDetails {
                    name: leaf,
                    location: self.location_of(&full),
                    is_file,
                    size: byte_conversion(size),
                    created: Some(modified),
                    modified: Some(modified),
                    multiple_files: false,
                }
            }
            many => {
                let mut leaves = Vec::with_capacity(many.len());
                let mut total = 0u64;
                let mut common_parent: Option<String> = None;
                let mut various = false;

                for (index, raw) in many.iter().enumerate() {
                    let full = join(&base, raw);
                    let (parent, leaf) = paths::split(&full, true);
                    let (is_file, size) = match data.get(index) {
                        Some(claimed) => (claimed.is_file, claimed.size),
                        None => match tree::find_entry(fs, &parent, &leaf).await? {
                            Some(entry) => (entry.is_file, entry.size),
                            None => return Err(not_found(vec![leaf], Vec::new())),
                        },
                    };
                    total += if is_file {
                        size
                    } else {
                        tree::folder_size(fs, &full).await?
                    };
                    match &common_parent {
                        None => common_parent = Some(parent),
                        Some(previous) if *previous != parent => various = true,
                        Some(_) => {}
                    }
                    leaves.push(leaf);
                }

                let location = match (various, common_parent) {
                    (false, Some(parent)) => self.location_of(&parent),
                    _ => VARIOUS_FOLDERS.to_string(),
                };
                FileDetails {
                    name: leaves.join(", "),
                    location,
                    is_file: false,
                    size: byte_conversion(total),
                    created: None,
                    modified: None,
                    multiple_files: true,
                }
            }
        };
        result.details = Some(details);
        Ok(())
    }

    // ─── dispatch ──────────────────────────────────────────────────────────

    /// Route a request by its action
    pub async fn dispatch(&self, request: &FileOperationRequest) -> OperationResult {
        debug!("Dispatching {:?} on {}", request.action, request.path);
        let path = request.path.as_str();
        match request.action {
            FileAction::Read => self.read(path, request.show_hidden_items, &request.data).await,
            FileAction::Create => match request.name.as_deref() {
                Some(name) => self.create(path, name).await,
                None => missing_field("name"),
            },
            FileAction::Delete => self.delete(path, &request.names, &request.data).await,
            FileAction::Rename => match (request.name.as_deref(), request.new_name.as_deref()) {
                (Some(name), Some(new_name)) => self.rename(path, name, new_name, false, &request.data).await,
                (None, _) => missing_field("name"),
                (_, None) => missing_field("newName"),
            },
            FileAction::Copy | FileAction::Move => {
                let Some(target_path) = request.target_path.as_deref() else {
                    return missing_field("targetPath");
                };
                let mode = if request.action == FileAction::Copy {
                    CopyMode::Copy
                } else {
                    CopyMode::Move
                };
                self.copy_or_move(mode, path, target_path, &request.names, &request.rename_files, &request.data)
                    .await
            }
            FileAction::Search => {
                self.search(
                    path,
                    request.search_string.as_deref().unwrap_or("*"),
                    request.show_hidden_items,
                    request.case_sensitive,
                    &request.data,
                )
                .await
            }
            FileAction::Details => self.details(path, &request.names, &request.data).await,
        }
    }

    /// JSON request in, JSON result out
    pub async fn dispatch_json(&self, body: &str) -> String {
        let result = match serde_json::from_str::<FileOperationRequest>(body) {
            Ok(request) => self.dispatch(&request).await,
            Err(e) => OperationResult::failed(
                FileManagerError::InvalidRequest(format!("Invalid request: {}", e)).into_error_info(),
            ),
        };
        to_json(&result)
    }

    // ─── helpers ───────────────────────────────────────────────────────────

    /// `(is_file, size)` of `name` inside `dir`, or `None` when it is missing.
    /// Caller metadata is trusted when present; otherwise the parent is listed.
    pub(crate) async fn locate(
        &self,
        fs: &mut dyn RemoteFs,
        dir: &str,
        name: &str,
        claimed: Option<&DirectoryEntry>,
    ) -> Result<Option<(bool, u64)>, FileManagerError> {
        match claimed {
            Some(meta) => Ok(tree::exists(fs, dir, name, false)
                .await?
                .then_some((meta.is_file, meta.size))),
            None => Ok(tree::find_entry(fs, dir, name)
                .await?
                .map(|entry| (entry.is_file, entry.size))),
        }
    }

    async fn cwd_entry(
        &self,
        fs: &mut dyn RemoteFs,
        rules: Option<&AccessDetails>,
        path: &str,
        full: &str,
        claimed: Option<&DirectoryEntry>,
    ) -> Result<DirectoryEntry, FileManagerError> {
        let modified = claimed.map_or_else(now, |entry| entry.date_modified);
        let filter_path = if is_root(path) {
            String::new()
        } else {
            self.resolver.filter_path(&paths::split(full, false).0)
        };
        Ok(DirectoryEntry {
            name: self.folder_display_name(path),
            is_file: false,
            size: 0,
            date_modified: modified,
            date_created: modified,
            has_child: tree::has_children(fs, full).await?,
            filter_path,
            file_type: String::new(),
            permission: rules.map(|r| r.evaluate_folder(&ensure_trailing_slash(path))),
            previous_name: None,
        })
    }

    /// Entry for `name` inside the server folder `folder`. `has_child` is left
    /// for the caller to fill in.
    pub(crate) fn make_entry(
        &self,
        rules: Option<&AccessDetails>,
        folder: &str,
        name: &str,
        is_file: bool,
        size: u64,
        modified: NaiveDateTime,
    ) -> DirectoryEntry {
        let folder = ensure_trailing_slash(folder);
        DirectoryEntry {
            name: name.to_string(),
            is_file,
            size: if is_file { size } else { 0 },
            date_modified: modified,
            date_created: modified,
            has_child: false,
            filter_path: self.resolver.filter_path(&folder),
            file_type: if is_file {
                paths::extension(name).to_string()
            } else {
                String::new()
            },
            permission: access::evaluate(rules, &self.resolver.virtual_path(&folder), name, is_file),
            previous_name: None,
        }
    }

    /// Display name of a virtual folder; the root shows as the root name
    pub(crate) fn folder_display_name(&self, path: &str) -> String {
        if is_root(path) {
            self.resolver.root_name().to_string()
        } else {
            paths::leaf_name(path)
        }
    }

    /// `root_name/virtual/path` of a server path, without trailing separator
    fn location_of(&self, full_path: &str) -> String {
        let relative = self.resolver.virtual_path(full_path);
        format!("{}{}", self.resolver.root_name(), relative.trim_end_matches('/'))
    }

    fn not_accessible(&self, path: &str) -> FileManagerError {
        FileManagerError::AccessDenied(format!(
            "'{}{}' is not accessible. Access is denied.",
            self.resolver.root_name(),
            path
        ))
    }
}

/// Fail with `AccessDenied` unless the capability is granted (or no rules apply)
pub(crate) fn require(
    permission: Option<AccessPermission>,
    granted: impl Fn(&AccessPermission) -> bool,
    name: &str,
    action: &str,
) -> Result<(), FileManagerError> {
    match permission {
        Some(permission) if !granted(&permission) => Err(FileManagerError::AccessDenied(
            if permission.message.is_empty() {
                format!(
                    "'{}' is not accessible. You need permission to perform the {} action.",
                    name, action
                )
            } else {
                permission.message
            },
        )),
        _ => Ok(()),
    }
}

pub(crate) fn not_found(missing: Vec<String>, existing: Vec<String>) -> FileManagerError {
    FileManagerError::NotFound {
        message: format!("{} not found in given location.", missing.join(", ")),
        existing,
    }
}

pub(crate) fn finish(
    mut result: OperationResult,
    outcome: Result<(), FileManagerError>,
    operation: &str,
    path: &str,
) -> OperationResult {
    if let Err(e) = outcome {
        warn!("{} {} failed: {}", operation, path, e);
        result.error = Some(e.into_error_info());
    }
    result
}

fn missing_field(field: &str) -> OperationResult {
    OperationResult::failed(
        FileManagerError::InvalidRequest(format!("Missing '{}' in request", field)).into_error_info(),
    )
}

fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}

pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Anchored regex for a `*`/`?` glob
pub fn glob_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    let translated = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
    RegexBuilder::new(&format!("^{}$", translated))
        .case_insensitive(!case_sensitive)
        .build()
}

/// Human readable size: `0 B`, `512 B`, `1.5 KB`, `2 MB`
pub fn byte_conversion(size: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    if size == 0 {
        return "0 B".to_string();
    }

    let mut exponent = 0usize;
    while exponent < UNITS.len() - 1 && u128::from(size) >= 1024u128.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let value = size as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[exponent])
    } else {
        format!("{:.1} {}", rounded, UNITS[exponent])
    }
}

/// Serialize a result with lowerCamelCase field names
pub fn to_json(result: &OperationResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| {
        serde_json::json!({ "error": { "code": "417", "message": e.to_string() } }).to_string()
    })
}
