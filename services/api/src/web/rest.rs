//! services/api/src/web/rest.rs
//!
//! Assembles the REST router and holds the master definition for the
//! OpenAPI specification.

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use keepstash_core::query::PageMeta;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::{
        security::{ApiKey, ApiKeyValue, SecurityScheme},
        server::Server,
    },
    Modify, OpenApi, ToSchema,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Config, ConfigError};
use crate::web::{
    auth::{self, *},
    bookmarks::{self, *},
    folders::{self, *},
    health::{self, *},
    metadata::{self, *},
    middleware::{require_auth, SESSION_COOKIE},
    state::AppState,
    tags::{self, *},
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::session_handler,
        auth::verify_email_handler,
        auth::forgot_password_handler,
        auth::reset_password_handler,
        auth::change_email_handler,
        folders::create_folder_handler,
        folders::list_folders_handler,
        folders::get_folder_handler,
        folders::update_folder_handler,
        folders::delete_folder_handler,
        folders::restore_folder_handler,
        tags::create_tag_handler,
        tags::list_tags_handler,
        tags::get_tag_handler,
        tags::update_tag_handler,
        tags::delete_tag_handler,
        tags::restore_tag_handler,
        bookmarks::create_bookmark_handler,
        bookmarks::list_bookmarks_handler,
        bookmarks::get_bookmark_handler,
        bookmarks::update_bookmark_handler,
        bookmarks::delete_bookmark_handler,
        bookmarks::restore_bookmark_handler,
        metadata::metadata_handler,
    ),
    components(
        schemas(
            ErrorResponse, PageMetaResponse, HealthResponse,
            SignupRequest, LoginRequest, ForgotPasswordRequest, ResetPasswordRequest,
            ChangeEmailRequest, UserResponse, MessageResponse,
            CreateFolderRequest, UpdateFolderRequest, FolderResponse, FolderPage,
            CreateTagRequest, UpdateTagRequest, TagResponse, TagPage,
            CreateBookmarkRequest, UpdateBookmarkRequest, BookmarkResponse,
            BookmarkDetailsResponse, BookmarkPage, UrlMetadataResponse
        )
    ),
    modifiers(&SessionCookieAuth),
    tags(
        (name = "KeepStash API", description = "Bookmarks organized in folders and tags."),
        (name = "Auth", description = "Accounts and cookie sessions."),
        (name = "Bookmarks"),
        (name = "Folders"),
        (name = "Tags"),
        (name = "Metadata", description = "Link previews for the bookmark form."),
        (name = "Health")
    )
)]
pub struct ApiDoc;

/// Registers the `session` cookie as the API's security scheme.
struct SessionCookieAuth;

impl Modify for SessionCookieAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
            );
        }
    }
}

/// The OpenAPI document with its server URL set to the configured prefix.
pub fn api_doc(app_prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if !app_prefix.is_empty() {
        doc.servers = Some(vec![Server::new(app_prefix)]);
    }
    doc
}

//=========================================================================================
// Shared Response Structs
//=========================================================================================

/// The body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMetaResponse {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl From<PageMeta> for PageMetaResponse {
    fn from(meta: PageMeta) -> Self {
        Self {
            page: meta.page,
            limit: meta.limit,
            total: meta.total,
            total_pages: meta.total_pages,
        }
    }
}

//=========================================================================================
// Router
//=========================================================================================

fn cors_layer(config: &Config) -> Result<CorsLayer, ConfigError> {
    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                ConfigError::InvalidValue("ALLOWED_ORIGINS".to_string(), e.to_string())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]))
}

/// Builds the complete application: API routes under the configured prefix,
/// Swagger UI, CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Result<Router, ConfigError> {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/verify-email", get(verify_email_handler))
        .route("/auth/forgot-password", post(forgot_password_handler))
        .route("/auth/reset-password", post(reset_password_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/session", get(session_handler))
        .route("/auth/change-email", post(change_email_handler))
        .route(
            "/bookmarks",
            post(create_bookmark_handler).get(list_bookmarks_handler),
        )
        .route(
            "/bookmarks/{id}",
            get(get_bookmark_handler)
                .patch(update_bookmark_handler)
                .delete(delete_bookmark_handler),
        )
        .route("/bookmarks/{id}/restore", patch(restore_bookmark_handler))
        .route(
            "/folders",
            post(create_folder_handler).get(list_folders_handler),
        )
        .route(
            "/folders/{id}",
            get(get_folder_handler)
                .patch(update_folder_handler)
                .delete(delete_folder_handler),
        )
        .route("/folders/{id}/restore", patch(restore_folder_handler))
        .route("/tags", post(create_tag_handler).get(list_tags_handler))
        .route(
            "/tags/{id}",
            get(get_tag_handler)
                .patch(update_tag_handler)
                .delete(delete_tag_handler),
        )
        .route("/tags/{id}/restore", patch(restore_tag_handler))
        .route("/metadata", get(metadata_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api_routes = Router::new().merge(public_routes).merge(protected_routes);
    let prefix = state.config.app_prefix.as_str();
    let api_routes = if prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(prefix, api_routes)
    };

    let cors = cors_layer(&state.config)?;

    Ok(Router::new()
        .merge(api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc(prefix)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/auth/signup",
            "/auth/verify-email",
            "/bookmarks",
            "/bookmarks/{id}",
            "/bookmarks/{id}/restore",
            "/folders/{id}/restore",
            "/tags/{id}",
            "/metadata",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn server_url_follows_the_prefix() {
        let doc = api_doc("/api");
        let servers = doc.servers.unwrap_or_default();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].url, "/api");

        assert!(api_doc("").servers.is_none());
    }

    #[test]
    fn session_cookie_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("session"));
    }
}
