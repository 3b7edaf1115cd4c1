//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

use crate::error::AuthError;
use crate::models::{
    Attachment, NameCount, NewPost, Post, PostId, PostPatch, PublicPost, StatsField, UploadedFile,
    User,
};
use crate::query::ListQuery;

/// Persistence contract for posts.
///
/// Multi-step writes (`insert_post` with a file, `soft_delete`, `purge_post`)
/// run inside a single transaction in the implementation, each opening with
/// a write.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Inserts a published post and, if given, its first attachment row.
    async fn insert_post(&self, post: NewPost, file_url: Option<String>) -> anyhow::Result<PostId>;

    /// Administrative read of the full row, any status. Does not count a view.
    async fn find_post(&self, id: PostId) -> anyhow::Result<Option<Post>>;

    async fn find_published(&self, id: PostId) -> anyhow::Result<Option<PublicPost>>;

    /// Returns the new view count, or `None` if no published post matched.
    async fn increment_views(&self, id: PostId) -> anyhow::Result<Option<i64>>;

    /// Returns `false` if no published post matched.
    async fn update_post(&self, id: PostId, patch: &PostPatch) -> anyhow::Result<bool>;

    /// Drops every attachment row and marks the post deleted.
    /// Returns the removed rows, or `None` if no published post matched.
    async fn soft_delete(&self, id: PostId) -> anyhow::Result<Option<Vec<Attachment>>>;

    /// Hard delete of a post and its attachment rows. Only used to undo a
    /// creation that could not be completed.
    async fn purge_post(&self, id: PostId) -> anyhow::Result<()>;

    async fn list_published(&self, query: &ListQuery) -> anyhow::Result<Vec<PublicPost>>;

    async fn distinct_companies(&self) -> anyhow::Result<Vec<String>>;

    async fn distinct_positions(&self) -> anyhow::Result<Vec<String>>;

    async fn post_counts(&self, field: StatsField) -> anyhow::Result<Vec<NameCount>>;
}

/// Persistence contract for `post_files` rows.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AttachmentRepo: Send + Sync {
    async fn attach(&self, post_id: PostId, file_url: String) -> anyhow::Result<Attachment>;

    async fn list_attachments(&self, post_id: PostId) -> anyhow::Result<Vec<Attachment>>;

    /// Atomically drops every row for the post and inserts `file_url` if given.
    /// Returns `(removed, attached)`, or `None` with nothing changed when the
    /// post is absent or deleted.
    async fn replace_attachments(
        &self,
        post_id: PostId,
        file_url: Option<String>,
    ) -> anyhow::Result<Option<(Vec<Attachment>, Option<Attachment>)>>;
}

/// File storage contract for uploads.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Writes the upload under `category` and returns its relative URL.
    async fn save_upload(&self, category: &str, file: UploadedFile) -> anyhow::Result<String>;

    /// Deletes the stored file. A file that is already gone is not an error.
    async fn remove(&self, file_url: &str) -> anyhow::Result<()>;
}

/// One-way hashing of post admin PINs.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PinHasher: Send + Sync {
    async fn hash_pin(&self, pin: &str) -> anyhow::Result<String>;

    /// Never errors: a malformed hash simply does not verify.
    async fn verify_pin(&self, pin: &str, hash: &str) -> bool;
}

/// Word-list profanity replacement applied to free text.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait ContentFilter: Send + Sync {
    fn clean(&self, text: &str) -> String;
}

/// Outbound plain-text email.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the message was accepted for delivery.
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Bearer token verification.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<User, AuthError>;
}
