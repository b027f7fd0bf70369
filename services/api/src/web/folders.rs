//! services/api/src/web/folders.rs
//!
//! CRUD and restore endpoints for folders.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use keepstash_core::domain::{Folder, FolderChanges, NewFolder};
use keepstash_core::query::Page;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::input::{
    optional_text, required_text, JsonBody, ListQuery, QueryArgs, RecordId, DESCRIPTION_MAX,
    FOLDER_NAME_MAX,
};
use crate::web::rest::{ErrorResponse, PageMetaResponse};
use crate::web::state::{AppState, AuthUser};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Omitted fields are left unchanged; `"description": null` clears it.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFolderRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Folder> for FolderResponse {
    fn from(folder: Folder) -> Self {
        Self {
            id: folder.id,
            user_id: folder.user_id,
            name: folder.name,
            description: folder.description,
            created_at: folder.created_at,
            updated_at: folder.updated_at,
            deleted_at: folder.deleted_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FolderPage {
    pub items: Vec<FolderResponse>,
    pub meta: PageMetaResponse,
}

impl From<Page<Folder>> for FolderPage {
    fn from(page: Page<Folder>) -> Self {
        Self {
            meta: page.meta.into(),
            items: page.items.into_iter().map(FolderResponse::from).collect(),
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /folders - Create a folder
#[utoipa::path(
    post,
    path = "/folders",
    tag = "Folders",
    request_body = CreateFolderRequest,
    responses(
        (status = 201, description = "Folder created", body = FolderResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn create_folder_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    JsonBody(req): JsonBody<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = NewFolder {
        name: required_text("name", &req.name, FOLDER_NAME_MAX)?,
        description: optional_text("description", req.description, DESCRIPTION_MAX)?,
    };

    let folder = state.db.create_folder(auth.user_id, folder).await?;
    info!("Created folder {} for user {}", folder.id, auth.user_id);

    Ok((StatusCode::CREATED, Json(FolderResponse::from(folder))))
}

/// GET /folders - List active folders, newest first
#[utoipa::path(
    get,
    path = "/folders",
    tag = "Folders",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of folders", body = FolderPage),
        (status = 400, description = "Invalid query", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn list_folders_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    QueryArgs(params): QueryArgs<ListQuery>,
) -> Result<Json<FolderPage>, ApiError> {
    let query = params.into_name_query()?;
    let page = state.db.list_folders(auth.user_id, &query).await?;
    Ok(Json(page.into()))
}

/// GET /folders/{id}
#[utoipa::path(
    get,
    path = "/folders/{id}",
    tag = "Folders",
    params(("id" = Uuid, Path, description = "Folder ID")),
    responses(
        (status = 200, description = "The folder", body = FolderResponse),
        (status = 404, description = "Folder not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn get_folder_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<FolderResponse>, ApiError> {
    let folder = state.db.get_folder(auth.user_id, id).await?;
    Ok(Json(folder.into()))
}

/// PATCH /folders/{id}
#[utoipa::path(
    patch,
    path = "/folders/{id}",
    tag = "Folders",
    params(("id" = Uuid, Path, description = "Folder ID")),
    request_body = UpdateFolderRequest,
    responses(
        (status = 200, description = "Folder updated", body = FolderResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Folder not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn update_folder_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
    JsonBody(req): JsonBody<UpdateFolderRequest>,
) -> Result<Json<FolderResponse>, ApiError> {
    let changes = FolderChanges {
        name: req
            .name
            .map(|name| required_text("name", &name, FOLDER_NAME_MAX))
            .transpose()?,
        description: req
            .description
            .map(|description| optional_text("description", description, DESCRIPTION_MAX))
            .transpose()?,
    };

    let folder = state.db.update_folder(auth.user_id, id, changes).await?;
    Ok(Json(folder.into()))
}

/// DELETE /folders/{id} - Soft delete a folder
///
/// Bookmarks in the folder keep their reference to it.
#[utoipa::path(
    delete,
    path = "/folders/{id}",
    tag = "Folders",
    params(("id" = Uuid, Path, description = "Folder ID")),
    responses(
        (status = 200, description = "Folder deleted", body = FolderResponse),
        (status = 404, description = "Folder not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn delete_folder_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<FolderResponse>, ApiError> {
    let folder = state.db.delete_folder(auth.user_id, id).await?;
    info!("Deleted folder {} for user {}", id, auth.user_id);
    Ok(Json(folder.into()))
}

/// PATCH /folders/{id}/restore - Undo a soft delete
#[utoipa::path(
    patch,
    path = "/folders/{id}/restore",
    tag = "Folders",
    params(("id" = Uuid, Path, description = "Folder ID")),
    responses(
        (status = 200, description = "Folder restored", body = FolderResponse),
        (status = 404, description = "Folder not found or not deleted", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn restore_folder_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<FolderResponse>, ApiError> {
    let folder = state.db.restore_folder(auth.user_id, id).await?;
    info!("Restored folder {} for user {}", id, auth.user_id);
    Ok(Json(folder.into()))
}
