//! crates/keepstash_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

//=========================================================================================
// Users and Authentication
//=========================================================================================

/// Represents a registered user - used throughout the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// What a single-use verification value unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationKind {
    EmailVerification,
    ChangeEmail,
    PasswordReset,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationKind::EmailVerification => "email_verification",
            VerificationKind::ChangeEmail => "change_email",
            VerificationKind::PasswordReset => "password_reset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email_verification" => Some(VerificationKind::EmailVerification),
            "change_email" => Some(VerificationKind::ChangeEmail),
            "password_reset" => Some(VerificationKind::PasswordReset),
            _ => None,
        }
    }
}

/// A stored verification. The secret itself is never kept, only its hash.
#[derive(Debug, Clone)]
pub struct Verification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: VerificationKind,
    pub value_hash: String,
    /// Target address for `ChangeEmail` verifications.
    pub new_email: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Wrong guesses so far. Only short codes are checked per user.
    pub attempts: i32,
}

/// Wrong guesses a one-time code survives before it is discarded.
pub const MAX_CODE_ATTEMPTS: i32 = 3;

/// Messages the auth flow hands to a `NotificationSender`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    EmailVerificationRequested {
        email: String,
        verification_url: String,
        token: String,
    },
    ForgotPasswordOtpRequested {
        email: String,
        otp: String,
    },
}

impl Notification {
    /// The address the notification is delivered to.
    pub fn recipient(&self) -> &str {
        match self {
            Notification::EmailVerificationRequested { email, .. } => email,
            Notification::ForgotPasswordOtpRequested { email, .. } => email,
        }
    }
}

//=========================================================================================
// Soft Delete
//=========================================================================================

/// Lifecycle of every user-owned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Active,
    Deleted,
}

impl RecordState {
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(_) => RecordState::Deleted,
            None => RecordState::Active,
        }
    }

    /// Checks the deleted -> active transition.
    ///
    /// `found` is the record as seen by its owner, including deleted rows.
    /// A missing record and a record that is still active are both reported
    /// as not found so that callers cannot discover other users' ids.
    pub fn ensure_restorable(
        entity: &str,
        id: Uuid,
        found: Option<Option<DateTime<Utc>>>,
    ) -> PortResult<()> {
        match found.map(RecordState::from_deleted_at) {
            None => Err(PortError::NotFound(format!(
                "{} with ID {} not found",
                entity, id
            ))),
            Some(RecordState::Active) => Err(PortError::NotFound(format!(
                "{} with ID {} is not deleted",
                entity, id
            ))),
            Some(RecordState::Deleted) => Ok(()),
        }
    }
}

//=========================================================================================
// Folders, Tags and Bookmarks
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewFolder {
    pub name: String,
    pub description: Option<String>,
}

/// A partial update. `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct FolderChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct TagChanges {
    pub name: Option<String>,
}

/// A saved URL owned by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
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

/// A bookmark together with its folder and flattened tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkDetails {
    pub bookmark: Bookmark,
    pub folder: Option<Folder>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct NewBookmark {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub folder_id: Option<Uuid>,
    pub tag_ids: Vec<Uuid>,
}

/// A partial update. Nested options distinguish "leave alone" from "clear";
/// `tag_ids: Some(..)` replaces the whole link set.
#[derive(Debug, Clone, Default)]
pub struct BookmarkChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    pub folder_id: Option<Option<Uuid>>,
    pub tag_ids: Option<Vec<Uuid>>,
}

//=========================================================================================
// URL Metadata
//=========================================================================================

/// Link-preview data scraped from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: String,
}
