//! # Domain Models
//!
//! These structs represent the core entities of Interview-Board.
//! Posts are identified by the integer id the store generates.

use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type PostId = i64;

/// Lifecycle state of a post. Deletion is a transition, never a row removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Published,
    Deleted,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Published => "published",
            PostStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(PostStatus::Published),
            "deleted" => Ok(PostStatus::Deleted),
            other => Err(format!("unknown post status '{other}'")),
        }
    }
}

/// The full post row. Internal only: it carries the PIN hash and status,
/// so it is never serialized to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub company: String,
    pub position: String,
    pub body: Option<String>,
    pub interview_date: NaiveDate,
    pub create_date: NaiveDate,
    pub pin_hash: String,
    pub status: PostStatus,
    pub views: i64,
    pub votes_up: i64,
    pub votes_down: i64,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// What external readers get to see of a published post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPost {
    pub id: PostId,
    pub title: String,
    pub create_date: NaiveDate,
    pub interview_date: NaiveDate,
    pub company: String,
    pub position: String,
    pub body: Option<String>,
    pub votes_up: i64,
    pub votes_down: i64,
    pub views: i64,
}

/// A sanitized, validated post ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub company: String,
    pub position: String,
    pub body: Option<String>,
    pub interview_date: NaiveDate,
    pub create_date: NaiveDate,
    pub pin_hash: String,
}

/// Sanitized partial update. `None` means "leave the column alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub body: Option<String>,
    pub interview_date: Option<NaiveDate>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.company.is_none()
            && self.position.is_none()
            && self.body.is_none()
            && self.interview_date.is_none()
    }
}

/// One uploaded file bound to a post (`post_files` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: i64,
    pub post_id: PostId,
    pub file_url: String,
}

/// A file received with a request, not yet written to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Identity resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

// ── Inputs ──────────────────────────────────────────────────────────────────

/// Raw creation fields as submitted. Validation happens in the service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub title: Option<String>,
    pub interview_date: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub body: Option<String>,
}

/// Raw partial-update fields as submitted. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub interview_date: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub body: Option<String>,
}

/// Raw listing parameters; see [`crate::query::ListQuery::from_params`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub sort_key: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub company: Option<String>,
    pub position: Option<String>,
}

// ── Outputs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostCreated {
    pub id: PostId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostUpdated {
    pub id: PostId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDeleted {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentsReplaced {
    pub message: String,
    pub result: Option<Attachment>,
}

/// Column a stats breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsField {
    Company,
    Position,
}

impl StatsField {
    pub fn column(&self) -> &'static str {
        match self {
            StatsField::Company => "company",
            StatsField::Position => "position",
        }
    }
}

/// Published post count for one company or position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCount {
    pub name: String,
    pub total: i64,
}

/// Parses the date formats the board accepts: ISO `YYYY-MM-DD` and `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

/// Treats `None` and blank strings alike.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_date_forms() {
        let expected = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
        assert_eq!(parse_date("2023-11-05"), Some(expected));
        assert_eq!(parse_date("11/05/2023"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(PostPatch::default().is_empty());
        let patch = PostPatch { body: Some("more".into()), ..Default::default() };
        assert!(!patch.is_empty());
    }

    #[test]
    fn status_round_trips_through_its_column_value() {
        for status in [PostStatus::Published, PostStatus::Deleted] {
            assert_eq!(status.as_str().parse::<PostStatus>(), Ok(status));
        }
        assert!("archived".parse::<PostStatus>().is_err());
    }
}
