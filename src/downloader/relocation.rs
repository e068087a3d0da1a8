// Public-folder publishing
//
// Finished files are copied into `<downloads>/Video-Downloader/` under a hidden
// `.pending` name and renamed once complete, so watchers never see a partial file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::config::DownloaderConfig;
use super::errors::RelocationError;
use super::traits::{MediaAnnouncer, PublishedFile, Relocator};

const PENDING_SUFFIX: &str = ".pending";
/// Upper bound on `name (n).ext` attempts
const MAX_COLLISION_INDEX: u32 = 9999;

/// MIME classification from the file extension
pub fn mime_for_filename(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "opus" => "audio/opus",
        "ogg" => "audio/ogg",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "video/mp4",
    }
}

pub struct PublicFolderRelocator {
    root: Option<PathBuf>,
}

impl PublicFolderRelocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            root: config.public_dir.clone(),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

#[async_trait]
impl Relocator for PublicFolderRelocator {
    async fn relocate(
        &self,
        source: &Path,
        display_filename: &str,
    ) -> Result<PublishedFile, RelocationError> {
        let root = self.root.as_deref().ok_or(RelocationError::NoPublicArea)?;

        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(RelocationError::SourceMissing(source.to_path_buf()));
        }

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| RelocationError::Io {
                path: root.to_path_buf(),
                source,
            })?;

        let target = unique_target(root, display_filename);
        let pending = pending_path(&target);
        debug!("[relocate] {} -> {}", source.display(), pending.display());

        if let Err(e) = copy_then_reveal(source, &pending, &target).await {
            let _ = tokio::fs::remove_file(&pending).await;
            return Err(e);
        }

        info!("[relocate] published {}", target.display());
        Ok(PublishedFile {
            mime_type: mime_for_filename(display_filename),
            path: target,
        })
    }
}

async fn copy_then_reveal(source: &Path, pending: &Path, target: &Path) -> Result<(), RelocationError> {
    tokio::fs::copy(source, pending)
        .await
        .map_err(|e| RelocationError::Io {
            path: pending.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(pending, target)
        .await
        .map_err(|e| RelocationError::Io {
            path: target.to_path_buf(),
            source: e,
        })
}

/// `root/name.ext`, or the first free `root/name (n).ext`
fn unique_target(root: &Path, filename: &str) -> PathBuf {
    let first = root.join(filename);
    if !first.exists() {
        return first;
    }

    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    (1..=MAX_COLLISION_INDEX)
        .map(|n| match &ext {
            Some(ext) => root.join(format!("{} ({}).{}", stem, n, ext)),
            None => root.join(format!("{} ({})", stem, n)),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Hidden sibling used while copying
fn pending_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".{}{}", name, PENDING_SUFFIX))
}

/// Announcer for platforms without a media index: records the path only
pub struct LogAnnouncer;

impl MediaAnnouncer for LogAnnouncer {
    fn announce(&self, path: &Path) {
        info!("[media] file available at {}", path.display());
    }
}
