//! services/api/src/web/tags.rs

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use keepstash_core::domain::{NewTag, Tag, TagChanges};
use keepstash_core::query::Page;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::input::{required_text, JsonBody, ListQuery, QueryArgs, RecordId, TAG_NAME_MAX};
use crate::web::rest::{ErrorResponse, PageMetaResponse};
use crate::web::state::{AppState, AuthUser};

#[derive(Deserialize, ToSchema)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTagRequest {
    pub name: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            user_id: tag.user_id,
            name: tag.name,
            created_at: tag.created_at,
            updated_at: tag.updated_at,
            deleted_at: tag.deleted_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TagPage {
    pub items: Vec<TagResponse>,
    pub meta: PageMetaResponse,
}

impl From<Page<Tag>> for TagPage {
    fn from(page: Page<Tag>) -> Self {
        Self {
            meta: page.meta.into(),
            items: page.items.into_iter().map(TagResponse::from).collect(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/tags",
    tag = "Tags",
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Tag created", body = TagResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn create_tag_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    JsonBody(req): JsonBody<CreateTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required_text("name", &req.name, TAG_NAME_MAX)?;
    let tag = state.db.create_tag(auth.user_id, NewTag { name }).await?;
    info!("Created tag {} for user {}", tag.id, auth.user_id);
    Ok((StatusCode::CREATED, Json(TagResponse::from(tag))))
}

#[utoipa::path(
    get,
    path = "/tags",
    tag = "Tags",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of tags", body = TagPage),
        (status = 400, description = "Invalid query", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn list_tags_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    QueryArgs(params): QueryArgs<ListQuery>,
) -> Result<Json<TagPage>, ApiError> {
    let query = params.into_name_query()?;
    let page = state.db.list_tags(auth.user_id, &query).await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/tags/{id}",
    tag = "Tags",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "The tag", body = TagResponse),
        (status = 404, description = "Tag not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn get_tag_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<TagResponse>, ApiError> {
    let tag = state.db.get_tag(auth.user_id, id).await?;
    Ok(Json(tag.into()))
}

#[utoipa::path(
    patch,
    path = "/tags/{id}",
    tag = "Tags",
    params(("id" = Uuid, Path, description = "Tag ID")),
    request_body = UpdateTagRequest,
    responses(
        (status = 200, description = "Tag updated", body = TagResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Tag not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn update_tag_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
    JsonBody(req): JsonBody<UpdateTagRequest>,
) -> Result<Json<TagResponse>, ApiError> {
    let changes = TagChanges {
        name: req
            .name
            .map(|name| required_text("name", &name, TAG_NAME_MAX))
            .transpose()?,
    };
    let tag = state.db.update_tag(auth.user_id, id, changes).await?;
    Ok(Json(tag.into()))
}

/// Soft delete. Links to bookmarks are kept.
#[utoipa::path(
    delete,
    path = "/tags/{id}",
    tag = "Tags",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "Tag deleted", body = TagResponse),
        (status = 404, description = "Tag not found", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn delete_tag_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<TagResponse>, ApiError> {
    let tag = state.db.delete_tag(auth.user_id, id).await?;
    info!("Deleted tag {} for user {}", id, auth.user_id);
    Ok(Json(tag.into()))
}

#[utoipa::path(
    patch,
    path = "/tags/{id}/restore",
    tag = "Tags",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "Tag restored", body = TagResponse),
        (status = 404, description = "Tag not found or not deleted", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn restore_tag_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    RecordId(id): RecordId,
) -> Result<Json<TagResponse>, ApiError> {
    let tag = state.db.restore_tag(auth.user_id, id).await?;
    info!("Restored tag {} for user {}", id, auth.user_id);
    Ok(Json(tag.into()))
}
