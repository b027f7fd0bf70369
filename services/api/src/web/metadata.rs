//! services/api/src/web/metadata.rs
//!
//! Link preview lookup used by the bookmark form.

use axum::{extract::State, Json};
use keepstash_core::domain::UrlMetadata;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::web::input::{http_url, required_param, QueryArgs};
use crate::web::rest::ErrorResponse;
use crate::web::state::AppState;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MetadataQuery {
    /// Absolute http(s) URL to inspect (required)
    pub url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UrlMetadataResponse {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: String,
}

impl From<UrlMetadata> for UrlMetadataResponse {
    fn from(metadata: UrlMetadata) -> Self {
        Self {
            title: metadata.title,
            description: metadata.description,
            url: metadata.url,
        }
    }
}

/// GET /metadata - Fetch a page's preview title and description
///
/// Open Graph tags win over Twitter card tags, which win over the plain
/// `<title>` and `<meta name="description">`.
#[utoipa::path(
    get,
    path = "/metadata",
    tag = "Metadata",
    params(MetadataQuery),
    responses(
        (status = 200, description = "Extracted metadata", body = UrlMetadataResponse),
        (status = 400, description = "Invalid or unreachable URL", body = ErrorResponse),
        (status = 404, description = "The URL returned 404", body = ErrorResponse),
        (status = 408, description = "The URL took too long to respond", body = ErrorResponse),
        (status = 500, description = "Any other fetch failure", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn metadata_handler(
    State(state): State<Arc<AppState>>,
    QueryArgs(params): QueryArgs<MetadataQuery>,
) -> Result<Json<UrlMetadataResponse>, ApiError> {
    let url = http_url("url", &required_param("url", params.url)?)?;

    let metadata = state.metadata.fetch_url_metadata(&url).await?;
    Ok(Json(metadata.into()))
}
