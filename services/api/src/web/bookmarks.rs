//! services/api/src/web/bookmarks.rs
//!
//! CRUD, listing and restore endpoints for bookmarks.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use keepstash_core::domain::{Bookmark, BookmarkChanges, BookmarkDetails, NewBookmark};
use keepstash_core::query::Page;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::folders::FolderResponse;
use crate::web::input::{
    http_url, optional_text, required_text, JsonBody, ListBookmarksQuery, QueryArgs, RecordId, DESCRIPTION_MAX,
    TITLE_MAX,
};
use crate::web::rest::{ErrorResponse, PageMetaResponse};
use crate::web::state::{AppState, AuthUser};
use crate::web::tags::TagResponse;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookmarkRequest {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

/// A partial update.
///
/// Omitted fields are left unchanged. `description` and `folderId` accept
/// `null` to clear them. `tagIds` replaces the whole tag set.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookmarkRequest {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub folder_id: Option<Option<Uuid>>,
    pub tag_ids: Option<Vec<Uuid>>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Bookmark> for BookmarkResponse {
    fn from(bookmark: Bookmark) -> Self {
        Self {
            id: bookmark.id,
            user_id: bookmark.user_id,
            folder_id: bookmark.folder_id,
            title: bookmark.title,
            description: bookmark.description,
            url: bookmark.url,
            created_at: bookmark.created_at,
            updated_at: bookmark.updated_at,
            deleted_at: bookmark.deleted_at,
        }
    }
}

/// A bookmark with its folder and the full list of its tags.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkDetailsResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub folder: Option<FolderResponse>,
    pub tags: Vec<TagResponse>,
}

impl From<BookmarkDetails> for BookmarkDetailsResponse {
    fn from(details: BookmarkDetails) -> Self {
        let BookmarkDetails {
            bookmark,
            folder,
            tags,
        } = details;
        Self {
            id: bookmark.id,
            user_id: bookmark.user_id,
            folder_id: bookmark.folder_id,
            title: bookmark.title,
            description: bookmark.description,
            url: bookmark.url,
            created_at: bookmark.created_at,
            updated_at: bookmark.updated_at,
            deleted_at: bookmark.deleted_at,
            folder: folder.map(FolderResponse::from),
            tags: tags.into_iter().map(TagResponse::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookmarkPage {
    pub items: Vec<BookmarkDetailsResponse>,
    pub meta: PageMetaResponse,
}

impl From<Page<BookmarkDetails>> for BookmarkPage {
    fn from(page: Page<BookmarkDetails>) -> Self {
        Self {
            meta: page.meta.into(),
            items: page
                .items
                .into_iter()
                .map(BookmarkDetailsResponse::from)
                .collect(),
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /bookmarks - Save a URL
///
/// The folder and tags, when given, must be active and owned by the caller.
#[utoipa::path(
    post,
    path = "/bookmarks",
    tag = "Bookmarks",
    request_body = CreateBookmarkRequest,
    responses(
        (status = 201, description = "Bookmark created", body = BookmarkResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Folder or tag not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn create_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    JsonBody(req): JsonBody<CreateBookmarkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bookmark = NewBookmark {
        title: required_text("title", &req.title, TITLE_MAX)?,
        description: optional_text("description", req.description, DESCRIPTION_MAX)?,
        url: http_url("url", &req.url)?,
        folder_id: req.folder_id,
        tag_ids: req.tag_ids,
    };

    let bookmark = state.db.create_bookmark(auth.user_id, bookmark).await?;
    info!("Created bookmark {} for user {}", bookmark.id, auth.user_id);

    Ok((StatusCode::CREATED, Json(BookmarkResponse::from(bookmark))))
}

/// GET /bookmarks - List active bookmarks
///
/// Filters combine with AND. With `tags`, only bookmarks carrying every
/// listed tag are returned, and `meta.total` counts them across all pages.
#[utoipa::path(
    get,
    path = "/bookmarks",
    tag = "Bookmarks",
    params(ListBookmarksQuery),
    responses(
        (status = 200, description = "A page of bookmarks", body = BookmarkPage),
        (status = 400, description = "Invalid query", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn list_bookmarks_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    QueryArgs(params): QueryArgs<ListBookmarksQuery>,
) -> Result<Json<BookmarkPage>, ApiError> {
    let query = params.into_bookmark_query()?;
    debug!("Listing bookmarks for user {}: {:?}", auth.user_id, query);

    let page = state.db.list_bookmarks(auth.user_id, &query).await?;
    Ok(Json(page.into()))
}

/// GET /bookmarks/{id}
#[utoipa::path(
    get,
    path = "/bookmarks/{id}",
    tag = "Bookmarks",
    params(("id" = Uuid, Path, description = "Bookmark ID")),
    responses(
        (status = 200, description = "The bookmark with its folder and tags", body = BookmarkDetailsResponse),
        (status = 404, description = "Bookmark not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn get_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<BookmarkDetailsResponse>, ApiError> {
    let details = state.db.get_bookmark(auth.user_id, id).await?;
    Ok(Json(details.into()))
}

/// PATCH /bookmarks/{id}
#[utoipa::path(
    patch,
    path = "/bookmarks/{id}",
    tag = "Bookmarks",
    params(("id" = Uuid, Path, description = "Bookmark ID")),
    request_body = UpdateBookmarkRequest,
    responses(
        (status = 200, description = "Bookmark updated", body = BookmarkResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Bookmark, folder or tag not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn update_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
    JsonBody(req): JsonBody<UpdateBookmarkRequest>,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let changes = BookmarkChanges {
        title: req
            .title
            .map(|title| required_text("title", &title, TITLE_MAX))
            .transpose()?,
        description: req
            .description
            .map(|description| optional_text("description", description, DESCRIPTION_MAX))
            .transpose()?,
        url: req.url.map(|url| http_url("url", &url)).transpose()?,
        folder_id: req.folder_id,
        tag_ids: req.tag_ids,
    };

    let bookmark = state.db.update_bookmark(auth.user_id, id, changes).await?;
    Ok(Json(bookmark.into()))
}

/// DELETE /bookmarks/{id} - Soft delete a bookmark
#[utoipa::path(
    delete,
    path = "/bookmarks/{id}",
    tag = "Bookmarks",
    params(("id" = Uuid, Path, description = "Bookmark ID")),
    responses(
        (status = 200, description = "Bookmark deleted", body = BookmarkResponse),
        (status = 404, description = "Bookmark not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn delete_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let bookmark = state.db.delete_bookmark(auth.user_id, id).await?;
    info!("Deleted bookmark {} for user {}", id, auth.user_id);
    Ok(Json(bookmark.into()))
}

/// PATCH /bookmarks/{id}/restore - Undo a soft delete
#[utoipa::path(
    patch,
    path = "/bookmarks/{id}/restore",
    tag = "Bookmarks",
    params(("id" = Uuid, Path, description = "Bookmark ID")),
    responses(
        (status = 200, description = "Bookmark restored", body = BookmarkResponse),
        (status = 404, description = "Bookmark not found or not deleted", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn restore_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let bookmark = state.db.restore_bookmark(auth.user_id, id).await?;
    info!("Restored bookmark {} for user {}", id, auth.user_id);
    Ok(Json(bookmark.into()))
}
