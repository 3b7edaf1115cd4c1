//! Attachment Coordinator.
//!
//! Keeps `post_files` rows and the files they point at in step. Rows change
//! inside one store transaction; stored files are written before and removed
//! after it, with staged uploads discarded when the row change fails.

use std::sync::Arc;

use ib_core::{AppError, Attachment, AttachmentRepo, MediaStore, PostId, Result, UploadedFile};
use tracing::{debug, error, warn};

/// Storage category post uploads are filed under.
pub const POST_CATEGORY: &str = "posts";

pub struct AttachmentCoordinator {
    attachments: Arc<dyn AttachmentRepo>,
    media: Arc<dyn MediaStore>,
}

impl AttachmentCoordinator {
    pub fn new(attachments: Arc<dyn AttachmentRepo>, media: Arc<dyn MediaStore>) -> Self {
        Self { attachments, media }
    }

    /// Writes an upload to storage and returns its URL.
    pub async fn stage(&self, file: UploadedFile) -> Result<String> {
        self.media
            .save_upload(POST_CATEGORY, file)
            .await
            .map_err(|e| {
                error!(error = %e, "could not store uploaded file");
                AppError::internal("Could not store uploaded file")
            })
    }

    /// Best-effort removal of a staged upload on a failure path. Logged, never raised.
    pub async fn discard(&self, file_url: &str) {
        match self.media.remove(file_url).await {
            Ok(()) => debug!(file_url, "discarded staged upload"),
            Err(e) => warn!(file_url, error = %e, "could not discard staged upload"),
        }
    }

    /// Binds an already stored file to a post. Each call adds a row.
    pub async fn attach(&self, post_id: PostId, file_url: String) -> Result<Attachment> {
        self.attachments
            .attach(post_id, file_url)
            .await
            .map_err(|e| {
                error!(post_id, error = %e, "could not attach file");
                AppError::internal("Could not attach file to post")
            })
    }

    pub async fn list(&self, post_id: PostId) -> Result<Vec<Attachment>> {
        self.attachments.list_attachments(post_id).await.map_err(|e| {
            error!(post_id, error = %e, "could not list attachments");
            AppError::internal("Could not get post attachments")
        })
    }

    /// Swaps every attachment of a post for `file` (or for nothing).
    /// The post ends with zero or one attachment.
    #[tracing::instrument(skip(self, file))]
    pub async fn replace(
        &self,
        post_id: PostId,
        file: Option<UploadedFile>,
    ) -> Result<Option<Attachment>> {
        let staged = match file {
            Some(file) => Some(self.stage(file).await?),
            None => None,
        };

        let (removed, attached) = match self
            .attachments
            .replace_attachments(post_id, staged.clone())
            .await
        {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                debug!("post went away before its attachments were replaced");
                if let Some(url) = &staged {
                    self.discard(url).await;
                }
                return Err(AppError::post_not_found(post_id));
            }
            Err(e) => {
                error!(error = %e, "could not replace attachment rows");
                if let Some(url) = &staged {
                    self.discard(url).await;
                }
                return Err(AppError::internal("Could not update post attachments"));
            }
        };

        self.remove_files(&removed).await?;
        Ok(attached)
    }

    /// Deletes the stored files behind rows that are already gone. Files that
    /// no longer exist are skipped; any other storage failure fails the call
    /// after every file has been attempted.
    pub async fn remove_files(&self, removed: &[Attachment]) -> Result<()> {
        let mut failed = 0usize;
        for attachment in removed {
            if let Err(e) = self.media.remove(&attachment.file_url).await {
                error!(file_url = %attachment.file_url, error = %e, "could not delete attachment file");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(AppError::internal("Could not delete post attachment files"));
        }
        Ok(())
    }
}
