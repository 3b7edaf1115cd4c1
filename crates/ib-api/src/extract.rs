//! Request extractors.
//!
//! Every rejection is turned into an [`ApiError`] so malformed requests get
//! the same envelope as service failures.

use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::Json;
use bytes::Bytes;
use ib_core::{AppError, CreatePostInput, PostId, UploadedFile, User};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

/// The caller identity behind a valid `Authorization: Bearer` header.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .unwrap_or_default();

        state.tokens.verify(token).map(AuthUser).map_err(|e| {
            debug!(reason = %e, "request not authorized");
            ApiError(AppError::unauthorized("Not authorized"))
        })
    }
}

/// `Json` whose rejection is a 400 envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Post fields plus an optional upload.
///
/// `multipart/form-data` bodies may carry one file part (the first one wins);
/// JSON bodies carry fields only; an empty body carries nothing.
pub struct PostForm {
    pub fields: CreatePostInput,
    pub file: Option<UploadedFile>,
}

impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
            read_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let ApiJson(fields) = ApiJson::<CreatePostInput>::from_request(req, state).await?;
            Ok(Self { fields, file: None })
        } else {
            Ok(Self {
                fields: CreatePostInput::default(),
                file: None,
            })
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<PostForm, ApiError> {
    let mut fields = CreatePostInput::default();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data: Bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::invalid(e.body_text()))?;

            if file.is_none() && !data.is_empty() {
                file = Some(UploadedFile { file_name, content_type, data });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::invalid(e.body_text()))?;
        match name.as_str() {
            "title" => fields.title = Some(value),
            "interviewDate" | "interview_date" => fields.interview_date = Some(value),
            "company" => fields.company = Some(value),
            "position" => fields.position = Some(value),
            "body" => fields.body = Some(value),
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(PostForm { fields, file })
}

/// A post id as clients send it: a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdParam {
    Number(PostId),
    Text(String),
}

impl IdParam {
    pub fn resolve(&self) -> Result<PostId, ApiError> {
        match self {
            IdParam::Number(id) => Ok(*id),
            IdParam::Text(raw) => parse_post_id(raw),
        }
    }
}

pub fn parse_post_id(raw: &str) -> Result<PostId, ApiError> {
    raw.trim()
        .parse::<PostId>()
        .map_err(|_| ApiError::invalid("Post id must be a number"))
}
