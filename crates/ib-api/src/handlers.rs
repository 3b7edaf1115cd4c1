//! # ib-api Handlers
//!
//! Each handler extracts, calls one `PostService` operation and wraps the
//! result in the response envelope.

use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Json;
use ib_core::{
    non_empty, Attachment, AttachmentsReplaced, ListParams, NameCount, PostCreated,
    PostDeleted, PostUpdated, PublicPost, StatsField, UpdatePostInput,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, Data};
use crate::extract::{parse_post_id, ApiJson, AuthUser, IdParam, PostForm};
use crate::AppState;

type ApiResult<T> = Result<Data<T>, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub post_id: IdParam,
    #[serde(default)]
    pub post_pin: String,
    #[serde(flatten)]
    pub fields: UpdatePostInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePostRequest {
    #[serde(default)]
    pub post_pin: String,
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    form: PostForm,
) -> ApiResult<PostCreated> {
    let created = state.posts.create(form.fields, form.file, &user).await?;
    Ok(Data(created))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<PublicPost> {
    let id = parse_post_id(&post_id)?;
    Ok(Data(state.posts.get_public(id).await?))
}

pub async fn update_post(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UpdatePostRequest>,
) -> ApiResult<PostUpdated> {
    let id = req.post_id.resolve()?;
    Ok(Data(state.posts.update(id, &req.post_pin, req.fields).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    ApiJson(req): ApiJson<DeletePostRequest>,
) -> ApiResult<PostDeleted> {
    let id = parse_post_id(&post_id)?;
    Ok(Data(state.posts.delete(id, &req.post_pin).await?))
}

pub async fn replace_attachments(
    State(state): State<AppState>,
    Path((post_id, post_pin)): Path<(String, String)>,
    form: PostForm,
) -> ApiResult<AttachmentsReplaced> {
    let id = parse_post_id(&post_id)?;
    let replaced = state
        .posts
        .replace_attachments(id, &post_pin, form.file)
        .await?;
    Ok(Data(replaced))
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<Vec<Attachment>> {
    let id = parse_post_id(&post_id)?;
    Ok(Data(state.posts.list_attachments(id).await?))
}

// ── Listings ────────────────────────────────────────────────────────────────

pub async fn list_all(
    State(state): State<AppState>,
    ApiJson(params): ApiJson<ListParams>,
) -> ApiResult<Vec<PublicPost>> {
    let params = ListParams { company: None, position: None, ..params };
    Ok(Data(state.posts.list_public(params).await?))
}

pub async fn list_by_company(
    State(state): State<AppState>,
    ApiJson(params): ApiJson<ListParams>,
) -> ApiResult<Vec<PublicPost>> {
    let company = require(params.company.clone(), "Please provide a company")?;
    let params = ListParams { company: Some(company), position: None, ..params };
    Ok(Data(state.posts.list_public(params).await?))
}

pub async fn list_by_position(
    State(state): State<AppState>,
    ApiJson(params): ApiJson<ListParams>,
) -> ApiResult<Vec<PublicPost>> {
    let position = require(params.position.clone(), "Please provide a position")?;
    let params = ListParams { company: None, position: Some(position), ..params };
    Ok(Data(state.posts.list_public(params).await?))
}

pub async fn list_by_position_and_company(
    State(state): State<AppState>,
    ApiJson(params): ApiJson<ListParams>,
) -> ApiResult<Vec<PublicPost>> {
    let position = require(params.position.clone(), "Please provide a position and a company")?;
    let company = require(params.company.clone(), "Please provide a position and a company")?;
    let params = ListParams { company: Some(company), position: Some(position), ..params };
    Ok(Data(state.posts.list_public(params).await?))
}

fn require(value: Option<String>, message: &str) -> Result<String, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::invalid(message))
}

pub async fn companies(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Data(state.posts.list_companies().await?))
}

pub async fn positions(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Data(state.posts.list_positions().await?))
}

// ── Stats & system ──────────────────────────────────────────────────────────

pub async fn company_stats(State(state): State<AppState>) -> ApiResult<Vec<NameCount>> {
    Ok(Data(state.posts.stats(StatsField::Company).await?))
}

pub async fn position_stats(State(state): State<AppState>) -> ApiResult<Vec<NameCount>> {
    Ok(Data(state.posts.stats(StatsField::Position).await?))
}

#[derive(Debug, Serialize)]
pub struct Pong {
    pub pong: bool,
}

pub async fn ping() -> Data<Pong> {
    Data(Pong { pong: true })
}

#[derive(Debug, Serialize)]
pub struct Version {
    pub version: &'static str,
}

pub async fn version() -> Data<Version> {
    Data(Version { version: env!("CARGO_PKG_VERSION") })
}

pub async fn not_found(uri: Uri) -> impl IntoResponse {
    let body = json!({
        "error": { "code": 404, "message": format!("No route for {}", uri.path()) }
    });
    (StatusCode::NOT_FOUND, Json(body))
}
