//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepstash_core::domain::{
    Bookmark, BookmarkChanges, BookmarkDetails, Folder, FolderChanges, NewBookmark, NewFolder,
    NewTag, RecordState, Tag, TagChanges, User, UserCredentials, Verification, VerificationKind,
    MAX_CODE_ATTEMPTS,
};
use keepstash_core::ports::{DatabaseService, PortError, PortResult};
use keepstash_core::query::{BookmarkQuery, BookmarkSort, NameQuery, Page};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, email, email_verified, name, created_at, updated_at";
const FOLDER_COLUMNS: &str = "id, user_id, name, description, created_at, updated_at, deleted_at";
const TAG_COLUMNS: &str = "id, user_id, name, created_at, updated_at, deleted_at";
const BOOKMARK_COLUMNS: &str =
    "id, user_id, folder_id, title, description, url, created_at, updated_at, deleted_at";
const VERIFICATION_COLUMNS: &str =
    "id, user_id, kind, value_hash, new_email, expires_at, attempts";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    email_verified: bool,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            email_verified: self.email_verified,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct VerificationRecord {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    value_hash: String,
    new_email: Option<String>,
    expires_at: DateTime<Utc>,
    attempts: i32,
}
impl VerificationRecord {
    fn to_domain(self) -> PortResult<Verification> {
        let kind = VerificationKind::parse(&self.kind).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown verification kind '{}'", self.kind))
        })?;
        Ok(Verification {
            id: self.id,
            user_id: self.user_id,
            kind,
            value_hash: self.value_hash,
            new_email: self.new_email,
            expires_at: self.expires_at,
            attempts: self.attempts,
        })
    }
}

#[derive(FromRow)]
struct FolderRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}
impl FolderRecord {
    fn to_domain(self) -> Folder {
        Folder {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

#[derive(FromRow)]
struct TagRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}
impl TagRecord {
    fn to_domain(self) -> Tag {
        Tag {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// A tag row joined through `bookmark_tags`.
#[derive(FromRow)]
struct LinkedTagRecord {
    bookmark_id: Uuid,
    #[sqlx(flatten)]
    tag: TagRecord,
}

#[derive(FromRow)]
struct BookmarkRecord {
    id: Uuid,
    user_id: Uuid,
    folder_id: Option<Uuid>,
    title: String,
    description: Option<String>,
    url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}
impl BookmarkRecord {
    fn to_domain(self) -> Bookmark {
        Bookmark {
            id: self.id,
            user_id: self.user_id,
            folder_id: self.folder_id,
            title: self.title,
            description: self.description,
            url: self.url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

//=========================================================================================
// Error Helpers
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(entity: &str, id: Uuid) -> PortError {
    PortError::NotFound(format!("{} with ID {} not found", entity, id))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

//=========================================================================================
// Query Building
//=========================================================================================

/// Escapes `%`, `_` and the escape character itself for use inside `ILIKE`.
pub(crate) fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Appends the WHERE-clause body for a bookmark listing over alias `b`.
///
/// The tag filter is a grouped sub-select so that a bookmark qualifies only
/// when it carries every requested tag, before LIMIT/OFFSET are applied.
pub(crate) fn push_bookmark_predicate(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Uuid,
    query: &BookmarkQuery,
) {
    qb.push("b.user_id = ")
        .push_bind(user_id)
        .push(" AND b.deleted_at IS NULL");

    if let Some(term) = query.search_term() {
        qb.push(" AND b.title ILIKE ")
            .push_bind(format!("%{}%", escape_like(term)));
    }
    if let Some(folder_id) = query.folder_id {
        qb.push(" AND b.folder_id = ").push_bind(folder_id);
    }
    if let Some(from) = query.created_from {
        qb.push(" AND b.created_at >= ").push_bind(from);
    }
    if let Some(to) = query.created_to {
        qb.push(" AND b.created_at <= ").push_bind(to);
    }

    let required = query.required_tags();
    if !required.is_empty() {
        let count = required.len() as i64;
        qb.push(
            " AND b.id IN (SELECT bt.bookmark_id FROM bookmark_tags bt WHERE bt.tag_id = ANY(",
        )
        .push_bind(required)
        .push(") GROUP BY bt.bookmark_id HAVING COUNT(DISTINCT bt.tag_id) = ")
        .push_bind(count)
        .push(")");
    }
}

fn bookmark_order(sort: BookmarkSort) -> &'static str {
    match sort {
        BookmarkSort::MostRecent => "b.created_at DESC, b.id DESC",
        BookmarkSort::OldestFirst => "b.created_at ASC, b.id ASC",
        BookmarkSort::Alphabetical => "b.title ASC, b.id ASC",
    }
}

/// Appends the WHERE-clause body shared by folder and tag listings.
pub(crate) fn push_name_predicate(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Uuid,
    query: &NameQuery,
) {
    qb.push("user_id = ")
        .push_bind(user_id)
        .push(" AND deleted_at IS NULL");
    if let Some(term) = query.search_term() {
        qb.push(" AND name ILIKE ")
            .push_bind(format!("%{}%", escape_like(term)));
    }
}

//=========================================================================================
// Shared Soft-Delete and Listing Plumbing
//=========================================================================================

impl DbAdapter {
    async fn fetch_active<R>(
        &self,
        table: &str,
        columns: &str,
        entity: &str,
        user_id: Uuid,
        id: Uuid,
    ) -> PortResult<R>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        sqlx::query_as::<_, R>(&format!(
            "SELECT {columns} FROM {table} WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| not_found(entity, id))
    }

    /// active -> deleted. Missing, foreign and already-deleted rows are all not found.
    async fn soft_delete<R>(
        &self,
        table: &str,
        columns: &str,
        entity: &str,
        user_id: Uuid,
        id: Uuid,
    ) -> PortResult<R>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        sqlx::query_as::<_, R>(&format!(
            "UPDATE {table} SET deleted_at = now() \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL RETURNING {columns}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| not_found(entity, id))
    }

    /// deleted -> active. The only lookup that can see a deleted row.
    async fn restore<R>(
        &self,
        table: &str,
        columns: &str,
        entity: &str,
        user_id: Uuid,
        id: Uuid,
    ) -> PortResult<R>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let found = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&format!(
            "SELECT deleted_at FROM {table} WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        RecordState::ensure_restorable(entity, id, found)?;

        sqlx::query_as::<_, R>(&format!(
            "UPDATE {table} SET deleted_at = NULL, updated_at = now() \
             WHERE id = $1 AND user_id = $2 RETURNING {columns}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn list_by_name<R>(
        &self,
        table: &str,
        columns: &str,
        user_id: Uuid,
        query: &NameQuery,
    ) -> PortResult<(Vec<R>, u64)>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut rows = QueryBuilder::<Postgres>::new(format!("SELECT {columns} FROM {table} WHERE "));
        push_name_predicate(&mut rows, user_id, query);
        rows.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.pagination.limit))
            .push(" OFFSET ")
            .push_bind(query.pagination.offset() as i64);

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {table} WHERE "));
        push_name_predicate(&mut count, user_id, query);

        let records = rows
            .build_query_as::<R>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok((records, total.max(0) as u64))
    }

    /// Attaches folders and tags to a page of bookmarks with two lookups.
    async fn load_details(&self, records: Vec<BookmarkRecord>) -> PortResult<Vec<BookmarkDetails>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let bookmark_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let folder_ids: Vec<Uuid> = records
            .iter()
            .filter_map(|r| r.folder_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut folders: HashMap<Uuid, Folder> = HashMap::new();
        if !folder_ids.is_empty() {
            let rows = sqlx::query_as::<_, FolderRecord>(&format!(
                "SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ANY($1)"
            ))
            .bind(&folder_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
            folders.extend(rows.into_iter().map(|r| (r.id, r.to_domain())));
        }

        let links = sqlx::query_as::<_, LinkedTagRecord>(
            "SELECT bt.bookmark_id, t.id, t.user_id, t.name, t.created_at, t.updated_at, t.deleted_at \
             FROM bookmark_tags bt JOIN tags t ON t.id = bt.tag_id \
             WHERE bt.bookmark_id = ANY($1) ORDER BY t.name ASC, t.id ASC",
        )
        .bind(&bookmark_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
        for link in links {
            tags.entry(link.bookmark_id)
                .or_default()
                .push(link.tag.to_domain());
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let folder = record.folder_id.and_then(|id| folders.get(&id).cloned());
                let tags = tags.remove(&record.id).unwrap_or_default();
                BookmarkDetails {
                    bookmark: record.to_domain(),
                    folder,
                    tags,
                }
            })
            .collect())
    }
}

/// Checks that a folder and tags are active and owned by `user_id`.
async fn ensure_references(
    conn: &mut PgConnection,
    user_id: Uuid,
    folder_id: Option<Uuid>,
    tag_ids: &[Uuid],
) -> PortResult<()> {
    if let Some(folder_id) = folder_id {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM folders WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL)",
        )
        .bind(folder_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(unexpected)?;
        if !exists {
            return Err(not_found("Folder", folder_id));
        }
    }

    if !tag_ids.is_empty() {
        let owned: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM tags WHERE user_id = $1 AND deleted_at IS NULL AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(tag_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(unexpected)?
        .into_iter()
        .collect();
        if let Some(missing) = tag_ids.iter().find(|id| !owned.contains(id)) {
            return Err(not_found("Tag", *missing));
        }
    }
    Ok(())
}

async fn link_tags(conn: &mut PgConnection, bookmark_id: Uuid, tag_ids: &[Uuid]) -> PortResult<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO bookmark_tags (bookmark_id, tag_id) SELECT $1, UNNEST($2::uuid[]) \
         ON CONFLICT DO NOTHING",
    )
    .bind(bookmark_id)
    .bind(tag_ids)
    .execute(&mut *conn)
    .await
    .map_err(unexpected)?;
    Ok(())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn ping(&self) -> PortResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Users ---

    async fn create_user(&self, email: &str, name: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, email, name, hashed_password) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(email)
        .bind(name)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict("User already exists".to_string())
            } else {
                unexpected(e)
            }
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET hashed_password = $1, updated_at = now() WHERE id = $2",
        )
        .bind(hashed_password)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn change_email(&self, user_id: Uuid, new_email: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET email = $1, email_verified = TRUE, updated_at = now() WHERE id = $2 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new_email)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict("Email is already in use".to_string())
            } else {
                unexpected(e)
            }
        })?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    // --- Auth Sessions ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        debug!("Revoked {} sessions for user {}", result.rows_affected(), user_id);
        Ok(())
    }

    // --- Verifications ---

    async fn create_verification(
        &self,
        user_id: Uuid,
        kind: VerificationKind,
        value_hash: &str,
        new_email: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // A new value supersedes any outstanding one of the same kind.
        sqlx::query("DELETE FROM verifications WHERE user_id = $1 AND kind = $2")
            .bind(user_id)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO verifications (id, user_id, kind, value_hash, new_email, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(kind.as_str())
        .bind(value_hash)
        .bind(new_email)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn consume_verification(
        &self,
        kind: VerificationKind,
        value_hash: &str,
    ) -> PortResult<Verification> {
        let record = sqlx::query_as::<_, VerificationRecord>(&format!(
            "DELETE FROM verifications WHERE kind = $1 AND value_hash = $2 \
             RETURNING {VERIFICATION_COLUMNS}"
        ))
        .bind(kind.as_str())
        .bind(value_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound("Verification not found".to_string()))?;

        let verification = record.to_domain()?;
        if verification.expires_at <= Utc::now() {
            return Err(PortError::NotFound("Verification has expired".to_string()));
        }
        Ok(verification)
    }

    async fn consume_user_code(
        &self,
        user_id: Uuid,
        kind: VerificationKind,
        value_hash: &str,
    ) -> PortResult<Verification> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, VerificationRecord>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verifications \
             WHERE user_id = $1 AND kind = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound("Verification not found".to_string()))?;
        let verification = record.to_domain()?;

        let expired = verification.expires_at <= Utc::now();
        let matched = !expired && verification.value_hash == value_hash;
        let attempts = verification.attempts + 1;

        if expired || matched || attempts >= MAX_CODE_ATTEMPTS {
            sqlx::query("DELETE FROM verifications WHERE id = $1")
                .bind(verification.id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        } else {
            sqlx::query("UPDATE verifications SET attempts = $2 WHERE id = $1")
                .bind(verification.id)
                .bind(attempts)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;

        if expired {
            return Err(PortError::NotFound("Verification has expired".to_string()));
        }
        if !matched {
            debug!("Wrong code for user {} ({} of {})", user_id, attempts, MAX_CODE_ATTEMPTS);
            return Err(PortError::NotFound("Verification code does not match".to_string()));
        }
        Ok(verification)
    }

    // --- Folders ---

    async fn create_folder(&self, user_id: Uuid, folder: NewFolder) -> PortResult<Folder> {
        let record = sqlx::query_as::<_, FolderRecord>(&format!(
            "INSERT INTO folders (id, user_id, name, description) VALUES ($1, $2, $3, $4) \
             RETURNING {FOLDER_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(folder.name)
        .bind(folder.description)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_folders(&self, user_id: Uuid, query: &NameQuery) -> PortResult<Page<Folder>> {
        let (records, total) = self
            .list_by_name::<FolderRecord>("folders", FOLDER_COLUMNS, user_id, query)
            .await?;
        let items = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(Page::new(items, query.pagination, total))
    }

    async fn get_folder(&self, user_id: Uuid, folder_id: Uuid) -> PortResult<Folder> {
        self.fetch_active::<FolderRecord>("folders", FOLDER_COLUMNS, "Folder", user_id, folder_id)
            .await
            .map(FolderRecord::to_domain)
    }

    async fn update_folder(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        changes: FolderChanges,
    ) -> PortResult<Folder> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE folders SET updated_at = now()");
        if let Some(name) = changes.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(description) = changes.description {
            qb.push(", description = ").push_bind(description);
        }
        qb.push(" WHERE id = ")
            .push_bind(folder_id)
            .push(" AND user_id = ")
            .push_bind(user_id)
            .push(" AND deleted_at IS NULL RETURNING ")
            .push(FOLDER_COLUMNS);

        qb.build_query_as::<FolderRecord>()
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(FolderRecord::to_domain)
            .ok_or_else(|| not_found("Folder", folder_id))
    }

    async fn delete_folder(&self, user_id: Uuid, folder_id: Uuid) -> PortResult<Folder> {
        self.soft_delete::<FolderRecord>("folders", FOLDER_COLUMNS, "Folder", user_id, folder_id)
            .await
            .map(FolderRecord::to_domain)
    }

    async fn restore_folder(&self, user_id: Uuid, folder_id: Uuid) -> PortResult<Folder> {
        self.restore::<FolderRecord>("folders", FOLDER_COLUMNS, "Folder", user_id, folder_id)
            .await
            .map(FolderRecord::to_domain)
    }

    // --- Tags ---

    async fn create_tag(&self, user_id: Uuid, tag: NewTag) -> PortResult<Tag> {
        let record = sqlx::query_as::<_, TagRecord>(&format!(
            "INSERT INTO tags (id, user_id, name) VALUES ($1, $2, $3) RETURNING {TAG_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(tag.name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_tags(&self, user_id: Uuid, query: &NameQuery) -> PortResult<Page<Tag>> {
        let (records, total) = self
            .list_by_name::<TagRecord>("tags", TAG_COLUMNS, user_id, query)
            .await?;
        let items = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(Page::new(items, query.pagination, total))
    }

    async fn get_tag(&self, user_id: Uuid, tag_id: Uuid) -> PortResult<Tag> {
        self.fetch_active::<TagRecord>("tags", TAG_COLUMNS, "Tag", user_id, tag_id)
            .await
            .map(TagRecord::to_domain)
    }

    async fn update_tag(&self, user_id: Uuid, tag_id: Uuid, changes: TagChanges) -> PortResult<Tag> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tags SET updated_at = now()");
        if let Some(name) = changes.name {
            qb.push(", name = ").push_bind(name);
        }
        qb.push(" WHERE id = ")
            .push_bind(tag_id)
            .push(" AND user_id = ")
            .push_bind(user_id)
            .push(" AND deleted_at IS NULL RETURNING ")
            .push(TAG_COLUMNS);

        qb.build_query_as::<TagRecord>()
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(TagRecord::to_domain)
            .ok_or_else(|| not_found("Tag", tag_id))
    }

    async fn delete_tag(&self, user_id: Uuid, tag_id: Uuid) -> PortResult<Tag> {
        self.soft_delete::<TagRecord>("tags", TAG_COLUMNS, "Tag", user_id, tag_id)
            .await
            .map(TagRecord::to_domain)
    }

    async fn restore_tag(&self, user_id: Uuid, tag_id: Uuid) -> PortResult<Tag> {
        self.restore::<TagRecord>("tags", TAG_COLUMNS, "Tag", user_id, tag_id)
            .await
            .map(TagRecord::to_domain)
    }

    // --- Bookmarks ---

    async fn create_bookmark(&self, user_id: Uuid, bookmark: NewBookmark) -> PortResult<Bookmark> {
        let tag_ids: Vec<Uuid> = dedup(&bookmark.tag_ids);
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        ensure_references(&mut tx, user_id, bookmark.folder_id, &tag_ids).await?;

        let record = sqlx::query_as::<_, BookmarkRecord>(&format!(
            "INSERT INTO bookmarks (id, user_id, folder_id, title, description, url) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {BOOKMARK_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(bookmark.folder_id)
        .bind(bookmark.title)
        .bind(bookmark.description)
        .bind(bookmark.url)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        link_tags(&mut tx, record.id, &tag_ids).await?;
        tx.commit().await.map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn list_bookmarks(
        &self,
        user_id: Uuid,
        query: &BookmarkQuery,
    ) -> PortResult<Page<BookmarkDetails>> {
        let mut rows = QueryBuilder::<Postgres>::new(
            "SELECT b.id, b.user_id, b.folder_id, b.title, b.description, b.url, \
             b.created_at, b.updated_at, b.deleted_at FROM bookmarks b WHERE ",
        );
        push_bookmark_predicate(&mut rows, user_id, query);
        rows.push(" ORDER BY ")
            .push(bookmark_order(query.sort))
            .push(" LIMIT ")
            .push_bind(i64::from(query.pagination.limit))
            .push(" OFFSET ")
            .push_bind(query.pagination.offset() as i64);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookmarks b WHERE ");
        push_bookmark_predicate(&mut count, user_id, query);

        let records = rows
            .build_query_as::<BookmarkRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        debug!(
            "Listed {} of {} bookmarks for user {}",
            records.len(),
            total,
            user_id
        );

        let items = self.load_details(records).await?;
        Ok(Page::new(items, query.pagination, total.max(0) as u64))
    }

    async fn get_bookmark(&self, user_id: Uuid, bookmark_id: Uuid) -> PortResult<BookmarkDetails> {
        let record = self
            .fetch_active::<BookmarkRecord>(
                "bookmarks",
                BOOKMARK_COLUMNS,
                "Bookmark",
                user_id,
                bookmark_id,
            )
            .await?;
        self.load_details(vec![record])
            .await?
            .pop()
            .ok_or_else(|| not_found("Bookmark", bookmark_id))
    }

    async fn update_bookmark(
        &self,
        user_id: Uuid,
        bookmark_id: Uuid,
        changes: BookmarkChanges,
    ) -> PortResult<Bookmark> {
        let tag_ids = changes.tag_ids.as_deref().map(dedup);
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        ensure_references(
            &mut tx,
            user_id,
            changes.folder_id.flatten(),
            tag_ids.as_deref().unwrap_or_default(),
        )
        .await?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE bookmarks SET updated_at = now()");
        if let Some(title) = changes.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = changes.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(url) = changes.url {
            qb.push(", url = ").push_bind(url);
        }
        if let Some(folder_id) = changes.folder_id {
            qb.push(", folder_id = ").push_bind(folder_id);
        }
        qb.push(" WHERE id = ")
            .push_bind(bookmark_id)
            .push(" AND user_id = ")
            .push_bind(user_id)
            .push(" AND deleted_at IS NULL RETURNING ")
            .push(BOOKMARK_COLUMNS);

        let record = qb
            .build_query_as::<BookmarkRecord>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| not_found("Bookmark", bookmark_id))?;

        if let Some(tag_ids) = tag_ids {
            sqlx::query("DELETE FROM bookmark_tags WHERE bookmark_id = $1")
                .bind(bookmark_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
            link_tags(&mut tx, bookmark_id, &tag_ids).await?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn delete_bookmark(&self, user_id: Uuid, bookmark_id: Uuid) -> PortResult<Bookmark> {
        self.soft_delete::<BookmarkRecord>(
            "bookmarks",
            BOOKMARK_COLUMNS,
            "Bookmark",
            user_id,
            bookmark_id,
        )
        .await
        .map(BookmarkRecord::to_domain)
    }

    async fn restore_bookmark(&self, user_id: Uuid, bookmark_id: Uuid) -> PortResult<Bookmark> {
        self.restore::<BookmarkRecord>(
            "bookmarks",
            BOOKMARK_COLUMNS,
            "Bookmark",
            user_id,
            bookmark_id,
        )
        .await
        .map(BookmarkRecord::to_domain)
    }
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
