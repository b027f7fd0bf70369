pub mod auth;
pub mod bookmarks;
pub mod folders;
pub mod health;
pub mod input;
pub mod metadata;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod tags;

// Re-export what the binaries need to build and document the server.
pub use middleware::require_auth;
pub use rest::{api_doc, router, ApiDoc};
pub use state::{AppState, AuthUser};
