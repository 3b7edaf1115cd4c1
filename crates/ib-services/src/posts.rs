//! # Post Service
//!
//! Orchestrates every post operation: validation, sanitizing, PIN checks,
//! persistence, attachments and the owner notification. Handlers call into
//! this and only translate the result to HTTP.

use std::sync::Arc;

use chrono::Utc;
use ib_core::query::ListQuery;
use ib_core::{
    non_empty, parse_date, AppError, Attachment, AttachmentRepo, AttachmentsReplaced,
    ContentFilter, CreatePostInput, ListParams, MediaStore, NameCount, NewPost, Notifier,
    PinHasher, PostCreated, PostDeleted, PostId, PostPatch, PostRepo, PostUpdated, PublicPost,
    Result, StatsField, UpdatePostInput, UploadedFile, User,
};
use tracing::{debug, error, info, warn};

use crate::attachments::AttachmentCoordinator;
use crate::filter::sanitize;
use crate::pin::{IssuedPin, PinAuthority};

pub const PIN_EMAIL_SUBJECT: &str = "Post Published - Your Admin PIN is Here!";

pub struct PostService {
    posts: Arc<dyn PostRepo>,
    pins: PinAuthority,
    attachments: AttachmentCoordinator,
    filter: Arc<dyn ContentFilter>,
    notifier: Arc<dyn Notifier>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepo>,
        attachments: Arc<dyn AttachmentRepo>,
        media: Arc<dyn MediaStore>,
        hasher: Arc<dyn PinHasher>,
        filter: Arc<dyn ContentFilter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pins: PinAuthority::new(Arc::clone(&posts), hasher),
            attachments: AttachmentCoordinator::new(attachments, media),
            posts,
            filter,
            notifier,
        }
    }

    /// Publishes a new post and emails its admin PIN to `owner`.
    ///
    /// Nothing survives a failure: a committed row is purged and a staged
    /// file discarded before the error is returned.
    #[tracing::instrument(skip_all, fields(owner = %owner.id))]
    pub async fn create(
        &self,
        input: CreatePostInput,
        file: Option<UploadedFile>,
        owner: &User,
    ) -> Result<PostCreated> {
        let (Some(title), Some(raw_date), Some(company), Some(position)) = (
            non_empty(input.title),
            non_empty(input.interview_date),
            non_empty(input.company),
            non_empty(input.position),
        ) else {
            return Err(AppError::invalid(
                "Please provide title, interview date, company, position",
            ));
        };
        let interview_date = parse_date(&raw_date).ok_or_else(invalid_date)?;

        let staged = match file {
            Some(file) => Some(self.attachments.stage(file).await?),
            None => None,
        };

        let draft = Draft {
            title: self.filter.clean(&title),
            company: self.filter.clean(&company),
            position: self.filter.clean(&position),
            body: sanitize(self.filter.as_ref(), non_empty(input.body).as_deref()),
            interview_date,
        };

        match self.publish(draft, staged.clone(), owner).await {
            Ok(created) => Ok(created),
            Err(e) => {
                if let Some(url) = &staged {
                    self.attachments.discard(url).await;
                }
                Err(e)
            }
        }
    }

    async fn publish(
        &self,
        draft: Draft,
        file_url: Option<String>,
        owner: &User,
    ) -> Result<PostCreated> {
        let pin = self.pins.issue().await?;
        let title = draft.title.clone();

        let new_post = NewPost {
            title: draft.title,
            company: draft.company,
            position: draft.position,
            body: draft.body,
            interview_date: draft.interview_date,
            create_date: Utc::now().date_naive(),
            pin_hash: pin.hash.clone(),
        };

        let id = self.posts.insert_post(new_post, file_url).await.map_err(|e| {
            error!(error = %e, "could not insert post");
            AppError::internal("Could not create post")
        })?;
        debug!(post_id = id, "post row committed");

        let body = pin_email_body(id, &title, &pin);
        if !self.notifier.send_text(&owner.email, PIN_EMAIL_SUBJECT, &body).await {
            warn!(post_id = id, "pin email not sent, rolling back post");
            if let Err(e) = self.posts.purge_post(id).await {
                error!(post_id = id, error = %e, "could not purge unannounced post");
            }
            return Err(AppError::internal("Could not send post pin email"));
        }

        info!(post_id = id, "post published");
        Ok(PostCreated {
            id,
            message: "Post have been published successfully, and email has been sent with the your admin pin."
                .to_string(),
        })
    }

    /// Public read of a published post. Counts one view in the background.
    #[tracing::instrument(skip(self))]
    pub async fn get_public(&self, id: PostId) -> Result<PublicPost> {
        let post = self
            .posts
            .find_published(id)
            .await
            .map_err(|e| {
                error!(error = %e, "could not get post");
                AppError::internal("Could not get a post")
            })?
            .ok_or_else(|| AppError::post_not_found(id))?;

        let posts = Arc::clone(&self.posts);
        tokio::spawn(async move {
            match posts.increment_views(id).await {
                Ok(Some(views)) => debug!(post_id = id, views, "view counted"),
                Ok(None) => debug!(post_id = id, "post vanished before its view was counted"),
                Err(e) => warn!(post_id = id, error = %e, "could not count view"),
            }
        });

        Ok(post)
    }

    /// Soft-deletes a post and removes its attachments.
    #[tracing::instrument(skip(self, pin))]
    pub async fn delete(&self, id: PostId, pin: &str) -> Result<PostDeleted> {
        self.pins.authorize(id, pin).await?;

        let removed = self
            .posts
            .soft_delete(id)
            .await
            .map_err(|e| {
                error!(error = %e, "could not delete post");
                AppError::internal("Could not delete post")
            })?
            .ok_or_else(|| AppError::post_not_found(id))?;

        self.attachments.remove_files(&removed).await?;

        info!(post_id = id, files = removed.len(), "post deleted");
        Ok(PostDeleted {
            message: "Deleted post successfully".to_string(),
        })
    }

    /// Applies the supplied fields only. No fields is a successful no-op.
    #[tracing::instrument(skip(self, pin, input))]
    pub async fn update(
        &self,
        id: PostId,
        pin: &str,
        input: UpdatePostInput,
    ) -> Result<PostUpdated> {
        self.pins.authorize(id, pin).await?;

        let interview_date = match non_empty(input.interview_date) {
            Some(raw) => Some(parse_date(&raw).ok_or_else(invalid_date)?),
            None => None,
        };
        let filter = self.filter.as_ref();
        let patch = PostPatch {
            title: sanitize(filter, non_empty(input.title).as_deref()),
            company: sanitize(filter, non_empty(input.company).as_deref()),
            position: sanitize(filter, non_empty(input.position).as_deref()),
            body: sanitize(filter, non_empty(input.body).as_deref()),
            interview_date,
        };

        let updated = PostUpdated {
            id,
            message: "Updated post successfully".to_string(),
        };

        if patch.is_empty() {
            debug!("update without fields, nothing to write");
            return Ok(updated);
        }

        match self.posts.update_post(id, &patch).await {
            Ok(true) => Ok(updated),
            Ok(false) => Err(AppError::post_not_found(id)),
            Err(e) => {
                error!(error = %e, "could not update post");
                Err(AppError::internal("Could not update post"))
            }
        }
    }

    /// Replaces every attachment of a post with `file` (or removes them all).
    #[tracing::instrument(skip(self, pin, file))]
    pub async fn replace_attachments(
        &self,
        id: PostId,
        pin: &str,
        file: Option<UploadedFile>,
    ) -> Result<AttachmentsReplaced> {
        self.pins.authorize(id, pin).await?;

        let result = self.attachments.replace(id, file).await?;
        Ok(AttachmentsReplaced {
            message: "Post attachments updated successfully".to_string(),
            result,
        })
    }

    /// Attachments of a published post.
    pub async fn list_attachments(&self, id: PostId) -> Result<Vec<Attachment>> {
        let exists = self.posts.find_published(id).await.map_err(|e| {
            error!(post_id = id, error = %e, "could not get post");
            AppError::internal("Could not get post attachments")
        })?;
        if exists.is_none() {
            return Err(AppError::post_not_found(id));
        }
        self.attachments.list(id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_public(&self, params: ListParams) -> Result<Vec<PublicPost>> {
        let query = ListQuery::from_params(params)?;

        self.posts.list_published(&query).await.map_err(|e| {
            error!(error = %e, "could not list posts");
            AppError::internal("Could not get all posts")
        })
    }

    pub async fn list_companies(&self) -> Result<Vec<String>> {
        self.posts.distinct_companies().await.map_err(|e| {
            error!(error = %e, "could not list companies");
            AppError::internal("Could not get all companies")
        })
    }

    pub async fn list_positions(&self) -> Result<Vec<String>> {
        self.posts.distinct_positions().await.map_err(|e| {
            error!(error = %e, "could not list positions");
            AppError::internal("Could not get all positions")
        })
    }

    pub async fn stats(&self, field: StatsField) -> Result<Vec<NameCount>> {
        self.posts.post_counts(field).await.map_err(|e| {
            error!(field = field.column(), error = %e, "could not count posts");
            AppError::internal("Could not get post stats")
        })
    }
}

struct Draft {
    title: String,
    company: String,
    position: String,
    body: Option<String>,
    interview_date: chrono::NaiveDate,
}

fn invalid_date() -> AppError {
    AppError::invalid("Interview date must be YYYY-MM-DD or MM/DD/YYYY")
}

fn pin_email_body(id: PostId, title: &str, pin: &IssuedPin) -> String {
    format!(
        "Your post is published, please use this PIN to edit or delete your post in the future!\n\
         Post Id: {id}\n\
         Post Title: {title}\n\
         Post PIN: {}",
        pin.expose()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::NaiveDate;
    use ib_core::{
        MockAttachmentRepo, MockContentFilter, MockMediaStore, MockNotifier, MockPinHasher,
        MockPostRepo, Post, PostStatus,
    };
    use mockall::predicate::eq;
    use std::sync::Mutex;

    use crate::filter::WordListFilter;

    struct Mocks {
        posts: MockPostRepo,
        attachments: MockAttachmentRepo,
        media: MockMediaStore,
        hasher: MockPinHasher,
        notifier: MockNotifier,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                posts: MockPostRepo::new(),
                attachments: MockAttachmentRepo::new(),
                media: MockMediaStore::new(),
                hasher: MockPinHasher::new(),
                notifier: MockNotifier::new(),
            }
        }

        fn service(self) -> PostService {
            PostService::new(
                Arc::new(self.posts),
                Arc::new(self.attachments),
                Arc::new(self.media),
                Arc::new(self.hasher),
                Arc::new(WordListFilter::new(["darn"])),
                Arc::new(self.notifier),
            )
        }
    }

    fn owner() -> User {
        User { id: "u-1".into(), email: "owner@example.com".into() }
    }

    fn input() -> CreatePostInput {
        CreatePostInput {
            title: Some("Great interview!! darn hard".into()),
            interview_date: Some("2024-04-02".into()),
            company: Some("Acme".into()),
            position: Some("Backend".into()),
            body: Some("Two rounds".into()),
        }
    }

    fn stored(pin_hash: &str) -> Post {
        let day = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();
        Post {
            id: 10,
            title: "t".into(),
            company: "c".into(),
            position: "p".into(),
            body: None,
            interview_date: day,
            create_date: day,
            pin_hash: pin_hash.into(),
            status: PostStatus::Published,
            views: 0,
            votes_up: 0,
            votes_down: 0,
        }
    }

    fn accept_pin(mocks: &mut Mocks) {
        mocks
            .posts
            .expect_find_post()
            .returning(|_| Ok(Some(stored("h"))));
        mocks
            .hasher
            .expect_verify_pin()
            .returning(|pin, _| pin == "good-pin");
    }

    #[tokio::test]
    async fn create_sanitizes_hashes_and_mails_the_pin() {
        let mut mocks = Mocks::new();
        mocks
            .hasher
            .expect_hash_pin()
            .returning(|pin| Ok(format!("h({pin})")));

        let inserted = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&inserted);
        mocks
            .posts
            .expect_insert_post()
            .times(1)
            .returning(move |post, file| {
                assert_eq!(file, None);
                *sink.lock().unwrap() = Some(post);
                Ok(10)
            });

        let mailed = Arc::new(Mutex::new(String::new()));
        let mail_sink = Arc::clone(&mailed);
        mocks
            .notifier
            .expect_send_text()
            .withf(|to, subject, _| to == "owner@example.com" && subject == PIN_EMAIL_SUBJECT)
            .returning(move |_, _, body| {
                *mail_sink.lock().unwrap() = body.to_string();
                true
            });

        let created = mocks.service().create(input(), None, &owner()).await.unwrap();
        assert_eq!(created.id, 10);

        let post = inserted.lock().unwrap().clone().unwrap();
        assert_eq!(post.title, "Great interview!! **** hard");
        assert_eq!(post.body.as_deref(), Some("Two rounds"));

        let mail = mailed.lock().unwrap().clone();
        let pin = mail
            .lines()
            .find_map(|l| l.trim().strip_prefix("Post PIN: "))
            .unwrap()
            .to_string();
        assert_eq!(pin.len(), 12);
        assert_eq!(post.pin_hash, format!("h({pin})"));
        assert!(mail.contains("Post Id: 10"));
    }

    #[tokio::test]
    async fn create_requires_the_four_fields() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_insert_post().never();
        mocks.media.expect_save_upload().never();

        let mut missing = input();
        missing.position = Some("  ".into());
        let err = mocks.service().create(missing, None, &owner()).await.unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn failed_email_purges_row_and_staged_file() {
        let mut mocks = Mocks::new();
        mocks
            .media
            .expect_save_upload()
            .returning(|_, _| Ok("/uploads/posts/a.png".into()));
        mocks
            .media
            .expect_remove()
            .with(eq("/uploads/posts/a.png"))
            .times(1)
            .returning(|_| Ok(()));
        mocks.hasher.expect_hash_pin().returning(|_| Ok("h".into()));
        mocks
            .posts
            .expect_insert_post()
            .withf(|_, file| file.as_deref() == Some("/uploads/posts/a.png"))
            .returning(|_, _| Ok(11));
        mocks.notifier.expect_send_text().returning(|_, _, _| false);
        mocks
            .posts
            .expect_purge_post()
            .with(eq(11))
            .times(1)
            .returning(|_| Ok(()));

        let file = UploadedFile {
            file_name: Some("a.png".into()),
            content_type: Some("image/png".into()),
            data: Bytes::from_static(b"png"),
        };
        let err = mocks
            .service()
            .create(input(), Some(file), &owner())
            .await
            .unwrap_err();
        assert_eq!(err, AppError::internal("Could not send post pin email"));
    }

    #[tokio::test]
    async fn failed_insert_discards_staged_file() {
        let mut mocks = Mocks::new();
        mocks
            .media
            .expect_save_upload()
            .returning(|_, _| Ok("/uploads/posts/b.png".into()));
        mocks.media.expect_remove().times(1).returning(|_| Ok(()));
        mocks.hasher.expect_hash_pin().returning(|_| Ok("h".into()));
        mocks
            .posts
            .expect_insert_post()
            .returning(|_, _| Err(anyhow::anyhow!("constraint failed")));
        mocks.notifier.expect_send_text().never();

        let file = UploadedFile {
            file_name: None,
            content_type: None,
            data: Bytes::from_static(b"x"),
        };
        let err = mocks
            .service()
            .create(input(), Some(file), &owner())
            .await
            .unwrap_err();
        assert_eq!(err.code(), 500);
    }

    #[tokio::test]
    async fn get_public_maps_absent_to_not_found() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_find_published().returning(|_| Ok(None));
        mocks.posts.expect_increment_views().never();

        let err = mocks.service().get_public(5).await.unwrap_err();
        assert_eq!(err, AppError::post_not_found(5));
    }

    #[tokio::test]
    async fn update_with_no_fields_writes_nothing() {
        let mut mocks = Mocks::new();
        accept_pin(&mut mocks);
        mocks.posts.expect_update_post().never();

        let updated = mocks
            .service()
            .update(10, "good-pin", UpdatePostInput::default())
            .await
            .unwrap();
        assert_eq!(updated.id, 10);
    }

    #[tokio::test]
    async fn update_sends_only_supplied_sanitized_fields() {
        let mut mocks = Mocks::new();
        accept_pin(&mut mocks);
        mocks
            .posts
            .expect_update_post()
            .withf(|id, patch| {
                *id == 10
                    && patch.title.as_deref() == Some("a **** title")
                    && patch.company.is_none()
                    && patch.body.is_none()
                    && patch.interview_date == NaiveDate::from_ymd_opt(2024, 12, 31)
            })
            .times(1)
            .returning(|_, _| Ok(true));

        let input = UpdatePostInput {
            title: Some("a darn title".into()),
            interview_date: Some("12/31/2024".into()),
            company: Some(String::new()),
            ..Default::default()
        };
        tokio_test::assert_ok!(mocks.service().update(10, "good-pin", input).await);
    }

    #[tokio::test]
    async fn mutations_reject_a_wrong_pin() {
        let mut mocks = Mocks::new();
        accept_pin(&mut mocks);
        mocks.posts.expect_update_post().never();
        mocks.posts.expect_soft_delete().never();
        mocks.attachments.expect_replace_attachments().never();
        let service = mocks.service();

        let update = service.update(10, "bad", UpdatePostInput::default()).await;
        let delete = service.delete(10, "bad").await;
        let replace = service.replace_attachments(10, "bad", None).await;

        assert_eq!(update.unwrap_err().code(), 401);
        assert_eq!(delete.unwrap_err().code(), 401);
        assert_eq!(replace.unwrap_err().code(), 401);
    }

    #[tokio::test]
    async fn delete_removes_files_after_status_change() {
        let mut mocks = Mocks::new();
        accept_pin(&mut mocks);
        mocks.posts.expect_soft_delete().with(eq(10)).returning(|_| {
            Ok(Some(vec![Attachment { id: 3, post_id: 10, file_url: "/uploads/posts/c.pdf".into() }]))
        });
        mocks
            .media
            .expect_remove()
            .with(eq("/uploads/posts/c.pdf"))
            .times(1)
            .returning(|_| Ok(()));

        let deleted = mocks.service().delete(10, "good-pin").await.unwrap();
        assert_eq!(deleted.message, "Deleted post successfully");
    }

    #[tokio::test]
    async fn list_validates_before_querying() {
        let mut mocks = Mocks::new();
        mocks.posts.expect_list_published().never();

        let params = ListParams {
            sort_key: Some("id".into()),
            sort_order: Some("asc".into()),
            limit: Some(10),
            offset: Some(0),
            ..Default::default()
        };
        assert_eq!(mocks.service().list_public(params).await.unwrap_err().code(), 400);
    }

    #[tokio::test]
    async fn injected_filter_is_used_for_every_field() {
        let mut filter = MockContentFilter::new();
        filter.expect_clean().times(4).returning(|t| t.to_uppercase());

        let mut mocks = Mocks::new();
        mocks.hasher.expect_hash_pin().returning(|_| Ok("h".into()));
        mocks
            .posts
            .expect_insert_post()
            .withf(|post, _| post.company == "ACME" && post.body.as_deref() == Some("TWO ROUNDS"))
            .returning(|_, _| Ok(1));
        mocks.notifier.expect_send_text().returning(|_, _, _| true);

        let service = PostService::new(
            Arc::new(mocks.posts),
            Arc::new(mocks.attachments),
            Arc::new(mocks.media),
            Arc::new(mocks.hasher),
            Arc::new(filter),
            Arc::new(mocks.notifier),
        );
        tokio_test::assert_ok!(service.create(input(), None, &owner()).await);
    }
}
