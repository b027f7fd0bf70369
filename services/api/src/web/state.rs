//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use keepstash_core::ports::{DatabaseService, MetadataService, NotificationSender};
use std::sync::Arc;
use uuid::Uuid;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub metadata: Arc<dyn MetadataService>,
    pub notifier: Arc<dyn NotificationSender>,
}

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}
