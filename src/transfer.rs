//! Uploads, downloads and image previews
//!
//! Downloads are materialized in a per-call [`StagingArea`]. A single file is
//! handed back as-is; several files, or any folder, are mirrored locally and
//! packaged into one ZIP on the blocking pool.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::access;
use crate::error::FileManagerError;
use crate::operations::{finish, not_found, now, require, FileManager};
use crate::paths::{self, ensure_trailing_slash, join};
use crate::providers::RemoteFs;
use crate::staging::StagingArea;
use crate::tree;
use crate::types::{DirectoryEntry, ErrorInfo, ImageSize, OperationResult, UploadAction, UploadFile};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// A staged file ready to be streamed to the caller.
///
/// The local copy lives as long as this value.
#[derive(Debug)]
pub struct FileDownload {
    pub file_name: String,
    pub content_type: &'static str,
    path: PathBuf,
    _staging: StagingArea,
}

impl FileDownload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Keep the staged file at `destination`
    pub async fn save_to(&self, destination: &Path) -> std::io::Result<u64> {
        tokio::fs::copy(&self.path, destination).await
    }
}

/// What a download resolved to on the server
struct Target {
    name: String,
    /// Requested name below `path`; the entry name inside an archive
    relative: String,
    full_path: String,
    is_file: bool,
}

impl FileManager {
    // ─── upload ────────────────────────────────────────────────────────────

    /// Upload `files` into the folder at `path`
    pub async fn upload(&self, path: &str, files: Vec<UploadFile>, action: UploadAction) -> OperationResult {
        let mut result = OperationResult::default();
        let outcome: Result<(), FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self.upload_in(fs.as_mut(), &mut result, path, files, action).await;
            fs.quit().await;
            outcome
        }
        .await;
        finish(result, outcome, "upload", path)
    }

    async fn upload_in(
        &self,
        fs: &mut dyn RemoteFs,
        result: &mut OperationResult,
        path: &str,
        files: Vec<UploadFile>,
        action: UploadAction,
    ) -> Result<(), FileManagerError> {
        let rules = self.rules();
        let rules = rules.as_deref();
        require(
            rules.map(|r| r.evaluate_folder(&ensure_trailing_slash(path))),
            |p| p.upload,
            &self.folder_display_name(path),
            "upload",
        )?;

        let dir = ensure_trailing_slash(&self.resolver.resolve(path));
        let mut conflicts = Vec::new();
        result.files = Some(Vec::new());

        for file in files {
            let name = paths::leaf_name(&file.name);
            if name.is_empty() {
                warn!("Skipping upload with empty name");
                continue;
            }

            let final_name = if tree::exists(fs, &dir, &name, false).await? {
                match action {
                    UploadAction::Save => {
                        conflicts.push(name);
                        continue;
                    }
                    UploadAction::Replace => {
                        fs.delete(&join(&dir, &name)).await?;
                        name
                    }
                    UploadAction::KeepBoth => tree::copy_name(fs, &dir, &name).await?,
                }
            } else {
                name
            };

            fs.store(&join(&dir, &final_name), &file.data).await?;
            info!("Uploaded {}{} ({} bytes)", dir, final_name, file.data.len());
            let entry = self.make_entry(rules, &dir, &final_name, true, file.data.len() as u64, now());
            result.files.get_or_insert_with(Vec::new).push(entry);
        }

        if !conflicts.is_empty() {
            return Err(FileManagerError::conflict("File already exists.", conflicts));
        }
        Ok(())
    }

    // ─── download ──────────────────────────────────────────────────────────

    /// Download one file as-is, or several entries (folders included) as a ZIP
    pub async fn download(
        &self,
        path: &str,
        names: &[String],
        data: &[DirectoryEntry],
    ) -> Result<FileDownload, ErrorInfo> {
        let outcome: Result<FileDownload, FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self.download_in(fs.as_mut(), path, names, data).await;
            fs.quit().await;
            outcome
        }
        .await;
        outcome.map_err(|e| {
            warn!("download {} failed: {}", path, e);
            e.into_error_info()
        })
    }

    async fn download_in(
        &self,
        fs: &mut dyn RemoteFs,
        path: &str,
        names: &[String],
        data: &[DirectoryEntry],
    ) -> Result<FileDownload, FileManagerError> {
        if names.is_empty() {
            return Err(FileManagerError::InvalidRequest("Nothing to download".to_string()));
        }
        let rules = self.rules();
        let rules = rules.as_deref();
        let base = ensure_trailing_slash(&self.resolver.resolve(path));

        let mut targets = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for (index, raw) in names.iter().enumerate() {
            let relative = raw
                .trim_end_matches('/')
                .split('/')
                .filter(|s| !s.is_empty() && *s != "..")
                .collect::<Vec<_>>()
                .join("/");
            let full_path = join(&base, &relative);
            let (parent, name) = paths::split(&full_path, true);
            match self.locate(fs, &parent, &name, data.get(index)).await? {
                Some((is_file, _)) => {
                    require(
                        access::evaluate(rules, &self.resolver.virtual_path(&parent), &name, is_file),
                        |p| p.download,
                        &name,
                        "download",
                    )?;
                    targets.push(Target {
                        name,
                        relative,
                        full_path,
                        is_file,
                    });
                }
                None => missing.push(name),
            }
        }
        if !missing.is_empty() {
            return Err(not_found(missing, Vec::new()));
        }

        let staging = StagingArea::create(&self.staging_root, "download")?;

        if let [target] = targets.as_slice() {
            if target.is_file {
                let local = staging.file_path(&target.name)?;
                let bytes = fs.download(&target.full_path, &local).await?;
                debug!("Staged {} ({} bytes)", target.full_path, bytes);
                return Ok(FileDownload {
                    file_name: target.name.clone(),
                    content_type: OCTET_STREAM,
                    path: local,
                    _staging: staging,
                });
            }
        }

        let content = staging.path().join("content");
        tokio::fs::create_dir_all(&content).await?;
        for target in &targets {
            let local = staging.file_path(&format!("content/{}", target.relative))?;
            if target.is_file {
                fs.download(&target.full_path, &local).await?;
            } else {
                mirror_folder(fs, &target.full_path, &local).await?;
            }
        }

        let file_name = match targets.as_slice() {
            [single] if !single.is_file => format!("{}.zip", single.name),
            _ if targets.iter().all(|t| t.is_file) => "files.zip".to_string(),
            _ => "folders.zip".to_string(),
        };
        let archive = staging.path().join(&file_name);
        let archive_path = archive.clone();
        tokio::task::spawn_blocking(move || write_archive(&content, &archive_path)).await??;
        info!("Packaged {} entr(ies) from {} into {}", targets.len(), path, file_name);

        Ok(FileDownload {
            file_name,
            content_type: OCTET_STREAM,
            path: archive,
            _staging: staging,
        })
    }

    // ─── image preview ─────────────────────────────────────────────────────

    /// Stage an image for preview. `allow_compress` and `size` are accepted
    /// but the bytes are returned unmodified.
    pub async fn get_image(
        &self,
        path: &str,
        id: &str,
        allow_compress: bool,
        size: Option<ImageSize>,
    ) -> Result<FileDownload, ErrorInfo> {
        debug!(
            "Image preview {} (id {}, compress {}, size {:?})",
            path, id, allow_compress, size
        );
        let outcome: Result<FileDownload, FileManagerError> = async {
            let mut fs = self.session().await?;
            let outcome = self.get_image_in(fs.as_mut(), path).await;
            fs.quit().await;
            outcome
        }
        .await;
        outcome.map_err(|e| {
            warn!("image {} failed: {}", path, e);
            e.into_error_info()
        })
    }

    async fn get_image_in(&self, fs: &mut dyn RemoteFs, path: &str) -> Result<FileDownload, FileManagerError> {
        let rules = self.rules();
        let full_path = self.resolver.resolve(path);
        let (parent, name) = paths::split(&full_path, true);
        require(
            access::evaluate(rules.as_deref(), &self.resolver.virtual_path(&parent), &name, true),
            |p| p.read,
            &name,
            "read",
        )?;

        let staging = StagingArea::create(&self.staging_root, "image")?;
        let local = staging.file_path(&name)?;
        fs.download(&full_path, &local).await?;
        Ok(FileDownload {
            file_name: name,
            content_type: OCTET_STREAM,
            path: local,
            _staging: staging,
        })
    }
}

/// Copy a remote folder and everything below it into `local`
async fn mirror_folder(fs: &mut dyn RemoteFs, remote: &str, local: &Path) -> Result<(), FileManagerError> {
    let mut pending = vec![(ensure_trailing_slash(remote), local.to_path_buf())];
    while let Some((remote_dir, local_dir)) = pending.pop() {
        tokio::fs::create_dir_all(&local_dir).await?;
        for entry in tree::list_entries(fs, &remote_dir).await? {
            let local_child = local_dir.join(&entry.name);
            if entry.is_file {
                fs.download(&format!("{}{}", remote_dir, entry.name), &local_child)
                    .await?;
            } else {
                pending.push((format!("{}{}/", remote_dir, entry.name), local_child));
            }
        }
    }
    Ok(())
}

/// Zip everything below `content`; entry names are relative to it
fn write_archive(content: &Path, archive: &Path) -> Result<(), FileManagerError> {
    let mut zip = ZipWriter::new(File::create(archive)?);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(content)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let Ok(relative) = entry.path().strip_prefix(content) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
        } else {
            zip.start_file(name, options)?;
            zip.write_all(&std::fs::read(entry.path())?)?;
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessDetails, AccessRule, Permission};
    use crate::paths::PathResolver;
    use crate::providers::MemoryConnector;
    use std::io::Read;
    use std::sync::Arc;

    fn manager(server: &MemoryConnector, staging: &Path) -> FileManager {
        FileManager::new(Arc::new(server.clone()), PathResolver::new("/srv", "srv")).with_staging_root(staging)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn archive_names(download: &FileDownload) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(download.path()).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_upload_save_reports_conflicts() {
        let server = MemoryConnector::new();
        server.add_file("/srv/in/a.txt", b"old");
        let staging = tempfile::tempdir().unwrap();
        let fm = manager(&server, staging.path());

        let result = fm
            .upload(
                "/in/",
                vec![UploadFile::new("a.txt", "new"), UploadFile::new("b.txt", "bee")],
                UploadAction::Save,
            )
            .await;

        let error = result.error.clone().unwrap();
        assert_eq!(error.code, "400");
        assert_eq!(error.message, "File already exists.");
        assert_eq!(error.file_exists, Some(vec!["a.txt".to_string()]));
        assert_eq!(result.files.unwrap()[0].name, "b.txt");
        assert_eq!(server.read("/srv/in/a.txt").unwrap(), b"old");
        assert_eq!(server.read("/srv/in/b.txt").unwrap(), b"bee");
    }

    #[tokio::test]
    async fn test_upload_replace_overwrites() {
        let server = MemoryConnector::new();
        server.add_file("/srv/a.txt", b"old");
        let staging = tempfile::tempdir().unwrap();

        let result = manager(&server, staging.path())
            .upload("/", vec![UploadFile::new("a.txt", "new")], UploadAction::Replace)
            .await;
        assert!(result.is_ok());
        assert_eq!(server.read("/srv/a.txt").unwrap(), b"new");
        assert!(server.commands().contains(&"DELE /srv/a.txt".to_string()));
    }

    #[tokio::test]
    async fn test_keep_both_never_overwrites() {
        let server = MemoryConnector::new();
        server.add_dir("/srv");
        let staging = tempfile::tempdir().unwrap();
        let fm = manager(&server, staging.path());

        for round in 0..3u8 {
            let result = fm
                .upload("/", vec![UploadFile::new("photo.jpg", vec![round])], UploadAction::KeepBoth)
                .await;
            assert!(result.is_ok());
        }
        assert_eq!(server.names("/srv"), vec!["photo(1).jpg", "photo(2).jpg", "photo.jpg"]);
        assert_eq!(server.read("/srv/photo.jpg").unwrap(), vec![0]);
        assert_eq!(server.read("/srv/photo(2).jpg").unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_upload_denied_by_rules() {
        let server = MemoryConnector::new();
        server.add_dir("/srv/readonly");
        let staging = tempfile::tempdir().unwrap();
        let fm = manager(&server, staging.path()).with_rules(AccessDetails {
            rules: vec![AccessRule {
                upload: Some(Permission::Deny),
                ..AccessRule::folder("/readonly/*")
            }],
            ..Default::default()
        });

        let result = fm
            .upload("/readonly/", vec![UploadFile::new("x.bin", "x")], UploadAction::Save)
            .await;
        let error = result.error.unwrap();
        assert_eq!(error.code, "401");
        assert_eq!(
            error.message,
            "'readonly' is not accessible. You need permission to perform the upload action."
        );
        assert!(!server.exists("/srv/readonly/x.bin"));
    }

    #[tokio::test]
    async fn test_single_file_download_is_staged_then_removed() {
        let server = MemoryConnector::new();
        server.add_file("/srv/docs/report.pdf", b"%PDF");
        let staging = tempfile::tempdir().unwrap();
        let fm = manager(&server, staging.path());

        let download = fm.download("/docs/", &names(&["report.pdf"]), &[]).await.unwrap();
        assert_eq!(download.file_name, "report.pdf");
        assert_eq!(download.content_type, OCTET_STREAM);
        assert_eq!(download.read().await.unwrap(), b"%PDF");

        let staged = download.path().to_path_buf();
        drop(download);
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_multiple_files_become_files_zip() {
        let server = MemoryConnector::new();
        server.add_file("/srv/a.txt", b"aaa");
        server.add_file("/srv/b.txt", b"bbb");
        let staging = tempfile::tempdir().unwrap();

        let download = manager(&server, staging.path())
            .download("/", &names(&["a.txt", "b.txt"]), &[])
            .await
            .unwrap();
        assert_eq!(download.file_name, "files.zip");
        assert_eq!(archive_names(&download), vec!["a.txt", "b.txt"]);

        let mut archive = zip::ZipArchive::new(File::open(download.path()).unwrap()).unwrap();
        let mut body = String::new();
        archive.by_name("b.txt").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "bbb");
    }

    #[tokio::test]
    async fn test_same_leaf_from_different_folders_keeps_both() {
        let server = MemoryConnector::new();
        server.add_file("/srv/a/report.txt", b"AAA");
        server.add_file("/srv/b/report.txt", b"BBB");
        let staging = tempfile::tempdir().unwrap();

        let download = manager(&server, staging.path())
            .download("/", &names(&["a/report.txt", "b/report.txt"]), &[])
            .await
            .unwrap();
        assert_eq!(download.file_name, "files.zip");
        assert_eq!(archive_names(&download), vec!["a/", "a/report.txt", "b/", "b/report.txt"]);

        let mut archive = zip::ZipArchive::new(File::open(download.path()).unwrap()).unwrap();
        for (name, expected) in [("a/report.txt", "AAA"), ("b/report.txt", "BBB")] {
            let mut body = String::new();
            archive.by_name(name).unwrap().read_to_string(&mut body).unwrap();
            assert_eq!(body, expected);
        }
    }

    #[tokio::test]
    async fn test_folder_download_keeps_structure() {
        let server = MemoryConnector::new();
        server.add_file("/srv/photos/a.jpg", b"jpg");
        server.add_file("/srv/photos/2024/b.jpg", b"jpg");
        server.add_dir("/srv/photos/empty");
        server.add_file("/srv/notes.txt", b"n");
        let staging = tempfile::tempdir().unwrap();
        let fm = manager(&server, staging.path());

        let single = fm.download("/", &names(&["photos"]), &[]).await.unwrap();
        assert_eq!(single.file_name, "photos.zip");
        assert_eq!(
            archive_names(&single),
            vec!["photos/", "photos/2024/", "photos/2024/b.jpg", "photos/a.jpg", "photos/empty/"]
        );

        let mixed = fm.download("/", &names(&["photos", "notes.txt"]), &[]).await.unwrap();
        assert_eq!(mixed.file_name, "folders.zip");
        assert!(archive_names(&mixed).contains(&"notes.txt".to_string()));
        assert_ne!(single.path(), mixed.path());
    }

    #[tokio::test]
    async fn test_download_missing_entry() {
        let server = MemoryConnector::new();
        server.add_dir("/srv");
        let staging = tempfile::tempdir().unwrap();

        let error = manager(&server, staging.path())
            .download("/", &names(&["nope.txt"]), &[])
            .await
            .unwrap_err();
        assert_eq!(error.code, "417");
        assert_eq!(error.message, "nope.txt not found in given location.");
    }

    #[tokio::test]
    async fn test_get_image_returns_original_bytes() {
        let server = MemoryConnector::new();
        server.add_file("/srv/img/logo.png", b"\x89PNG");
        let staging = tempfile::tempdir().unwrap();

        let image = manager(&server, staging.path())
            .get_image("/img/logo.png", "logo", true, Some(ImageSize { width: 64, height: 64 }))
            .await
            .unwrap();
        assert_eq!(image.file_name, "logo.png");
        assert_eq!(image.read().await.unwrap(), b"\x89PNG");
    }
}
