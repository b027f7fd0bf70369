//! crates/keepstash_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or HTTP clients.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Bookmark, BookmarkChanges, BookmarkDetails, Folder, FolderChanges, NewBookmark, NewFolder,
    NewTag, Notification, Tag, TagChanges, UrlMetadata, User, UserCredentials, Verification,
    VerificationKind,
};
use crate::query::{BookmarkQuery, NameQuery, Page};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The record does not exist or belongs to another user.
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// An upstream host could not be resolved or connected to.
    #[error("Unreachable: {0}")]
    Unreachable(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for users, sessions and the user-owned records.
///
/// Every folder, tag and bookmark operation is scoped to `user_id`; a record
/// owned by someone else behaves exactly like a missing one.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    async fn ping(&self) -> PortResult<()>;

    // --- Users ---
    async fn create_user(
        &self,
        email: &str,
        name: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    async fn mark_email_verified(&self, user_id: Uuid) -> PortResult<User>;

    /// Switches the user's address and marks it verified.
    async fn change_email(&self, user_id: Uuid, new_email: &str) -> PortResult<User>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owner of an unexpired session.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    async fn delete_user_sessions(&self, user_id: Uuid) -> PortResult<()>;

    // --- Verifications ---
    async fn create_verification(
        &self,
        user_id: Uuid,
        kind: VerificationKind,
        value_hash: &str,
        new_email: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Removes and returns an unexpired verification. Each value works once.
    async fn consume_verification(
        &self,
        kind: VerificationKind,
        value_hash: &str,
    ) -> PortResult<Verification>;

    /// Checks a short code against the user's outstanding verification.
    ///
    /// A match consumes it. A miss counts as an attempt, and the verification
    /// is discarded after `MAX_CODE_ATTEMPTS` misses. Every failure is `NotFound`.
    async fn consume_user_code(
        &self,
        user_id: Uuid,
        kind: VerificationKind,
        value_hash: &str,
    ) -> PortResult<Verification>;

    // --- Folders ---
    async fn create_folder(&self, user_id: Uuid, folder: NewFolder) -> PortResult<Folder>;

    async fn list_folders(&self, user_id: Uuid, query: &NameQuery) -> PortResult<Page<Folder>>;

    async fn get_folder(&self, user_id: Uuid, folder_id: Uuid) -> PortResult<Folder>;

    async fn update_folder(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        changes: FolderChanges,
    ) -> PortResult<Folder>;

    async fn delete_folder(&self, user_id: Uuid, folder_id: Uuid) -> PortResult<Folder>;

    async fn restore_folder(&self, user_id: Uuid, folder_id: Uuid) -> PortResult<Folder>;

    // --- Tags ---
    async fn create_tag(&self, user_id: Uuid, tag: NewTag) -> PortResult<Tag>;

    async fn list_tags(&self, user_id: Uuid, query: &NameQuery) -> PortResult<Page<Tag>>;

    async fn get_tag(&self, user_id: Uuid, tag_id: Uuid) -> PortResult<Tag>;

    async fn update_tag(&self, user_id: Uuid, tag_id: Uuid, changes: TagChanges)
        -> PortResult<Tag>;

    async fn delete_tag(&self, user_id: Uuid, tag_id: Uuid) -> PortResult<Tag>;

    async fn restore_tag(&self, user_id: Uuid, tag_id: Uuid) -> PortResult<Tag>;

    // --- Bookmarks ---
    async fn create_bookmark(&self, user_id: Uuid, bookmark: NewBookmark)
        -> PortResult<Bookmark>;

    async fn list_bookmarks(
        &self,
        user_id: Uuid,
        query: &BookmarkQuery,
    ) -> PortResult<Page<BookmarkDetails>>;

    async fn get_bookmark(&self, user_id: Uuid, bookmark_id: Uuid)
        -> PortResult<BookmarkDetails>;

    async fn update_bookmark(
        &self,
        user_id: Uuid,
        bookmark_id: Uuid,
        changes: BookmarkChanges,
    ) -> PortResult<Bookmark>;

    async fn delete_bookmark(&self, user_id: Uuid, bookmark_id: Uuid) -> PortResult<Bookmark>;

    async fn restore_bookmark(&self, user_id: Uuid, bookmark_id: Uuid) -> PortResult<Bookmark>;
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Fetches a page once and extracts its preview title and description.
    async fn fetch_url_metadata(&self, url: &str) -> PortResult<UrlMetadata>;
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: Notification) -> PortResult<()>;
}
