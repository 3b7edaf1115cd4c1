//! # ib-storage-local
//!
//! Local filesystem implementation of `MediaStore`.
//! Uploads land in `{root}/{category}/{uuid}.{ext}` and are served from
//! `{url_prefix}/{category}/{uuid}.{ext}`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use ib_core::traits::MediaStore;
use ib_core::UploadedFile;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/uploads")
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Maps a public URL back onto the filesystem, refusing anything that
    /// would escape the upload root.
    fn path_for_url(&self, file_url: &str) -> anyhow::Result<PathBuf> {
        let relative = file_url
            .strip_prefix(&self.url_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| anyhow!("file url '{file_url}' is outside {}", self.url_prefix))?;

        let relative = Path::new(relative);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("file url '{file_url}' is not a plain relative path");
        }
        Ok(self.root_path.join(relative))
    }
}

fn valid_category(category: &str) -> bool {
    !category.is_empty()
        && category
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Picks an extension from the original file name, falling back to the
/// declared content type.
fn extension_for(file: &UploadedFile) -> Option<String> {
    let from_name = file
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    from_name.or_else(|| {
        file.content_type
            .as_deref()
            .and_then(mime_guess::get_mime_extensions_str)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    })
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn save_upload(&self, category: &str, file: UploadedFile) -> anyhow::Result<String> {
        if !valid_category(category) {
            bail!("invalid storage category '{category}'");
        }

        let name = match extension_for(&file) {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4().simple()),
            None => Uuid::new_v4().simple().to_string(),
        };

        let dir = self.root_path.join(category);
        fs::create_dir_all(&dir).await?;

        // temp file + rename, so a reader never sees a partial upload
        let target = dir.join(&name);
        let temp = dir.join(format!(".{name}.tmp"));
        let mut out = fs::File::create(&temp).await?;
        if let Err(e) = out.write_all(&file.data).await {
            drop(out);
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        out.sync_all().await?;
        drop(out);
        fs::rename(&temp, &target).await?;

        debug!(path = %target.display(), size = file.data.len(), "stored upload");
        Ok(format!("{}/{category}/{name}", self.url_prefix))
    }

    async fn remove(&self, file_url: &str) -> anyhow::Result<()> {
        let path = self.path_for_url(file_url)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed upload");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "upload already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
