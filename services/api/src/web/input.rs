//! services/api/src/web/input.rs
//!
//! Request extractors and boundary validation. Malformed input is rejected
//! here as `ApiError::Validation` so it never reaches a port.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use keepstash_core::query::{
    BookmarkQuery, BookmarkSort, NameQuery, Pagination, DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_with::{serde_as, NoneAsEmptyString};
use url::Url;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::ApiError;

pub const FOLDER_NAME_MAX: usize = 100;
pub const TAG_NAME_MAX: usize = 50;
pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 500;

//=========================================================================================
// Extractors
//=========================================================================================

/// `Json<T>` whose rejections render as the service's JSON error body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// The `{id}` path segment of a record route.
pub struct RecordId(pub Uuid);

impl<S> FromRequestParts<S> for RecordId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::validation("id must be a valid UUID"))?;
        Ok(RecordId(id))
    }
}

//=========================================================================================
// Query Strings
//=========================================================================================

/// `Query<T>` whose rejections render as the service's JSON error body.
pub struct QueryArgs<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryArgs<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(QueryArgs(value))
    }
}

/// Query parameters for the folder and tag listings.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive substring of the name
    pub search: Option<String>,
    /// Page number, starting at 1
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub page: Option<u32>,
    /// Items per page, at most 100
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn into_name_query(self) -> Result<NameQuery, ApiError> {
        Ok(NameQuery {
            search: non_blank(self.search),
            pagination: pagination(self.page, self.limit)?,
        })
    }
}

/// Query parameters for the bookmark listing.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListBookmarksQuery {
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    /// Only bookmarks filed in this folder
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub folder: Option<Uuid>,
    /// Comma separated tag IDs. Matches bookmarks carrying all of them.
    pub tags: Option<String>,
    /// `Most Recent` (default), `Oldest First` or `Alphabetical`
    pub sort: Option<String>,
    /// Created at or after; RFC 3339 or YYYY-MM-DD
    pub date_from: Option<String>,
    /// Created at or before; RFC 3339 or YYYY-MM-DD
    pub date_to: Option<String>,
    /// Page number, starting at 1
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub page: Option<u32>,
    /// Items per page, at most 100
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ListBookmarksQuery {
    pub fn into_bookmark_query(self) -> Result<BookmarkQuery, ApiError> {
        let tag_ids = non_blank(self.tags)
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(|id| parse_uuid("tags", id))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let sort = match non_blank(self.sort) {
            Some(raw) => raw
                .parse::<BookmarkSort>()
                .map_err(|e| ApiError::validation(e.to_string()))?,
            None => BookmarkSort::default(),
        };

        Ok(BookmarkQuery {
            search: non_blank(self.search),
            folder_id: self.folder,
            tag_ids,
            created_from: non_blank(self.date_from)
                .map(|raw| parse_date("dateFrom", &raw))
                .transpose()?,
            created_to: non_blank(self.date_to)
                .map(|raw| parse_date("dateTo", &raw))
                .transpose()?,
            sort,
            pagination: pagination(self.page, self.limit)?,
        })
    }
}

/// Trims a text parameter; blank counts as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required_param(field: &str, value: Option<String>) -> Result<String, ApiError> {
    non_blank(value).ok_or_else(|| ApiError::validation(format!("{} is required", field)))
}

fn pagination(page: Option<u32>, limit: Option<u32>) -> Result<Pagination, ApiError> {
    let page = match page {
        Some(0) => return Err(ApiError::validation("page must be a positive integer")),
        Some(page) => page,
        None => DEFAULT_PAGE,
    };
    let limit = match limit {
        Some(limit) if !(1..=MAX_LIMIT).contains(&limit) => {
            return Err(ApiError::validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )))
        }
        Some(limit) => limit,
        None => DEFAULT_LIMIT,
    };
    Ok(Pagination { page, limit })
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::validation(format!("{} must contain valid IDs", field)))
}

/// Accepts an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| {
            ApiError::validation(format!(
                "{} must be an RFC 3339 timestamp or a YYYY-MM-DD date",
                field
            ))
        })
}

//=========================================================================================
// Field Validation
//=========================================================================================

/// Trims `value` and checks it is present and at most `max` characters.
pub fn required_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{} is required", field)));
    }
    check_length(field, trimmed, max)?;
    Ok(trimmed.to_string())
}

/// Like `required_text`, but a blank value becomes `None`.
pub fn optional_text(
    field: &str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, ApiError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(trimmed) => {
            check_length(field, trimmed, max)?;
            Ok(Some(trimmed.to_string()))
        }
    }
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.chars().count() > max {
        return Err(ApiError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

/// Accepts only absolute http(s) URLs with a host.
pub fn http_url(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    let valid = Url::parse(trimmed)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false);
    if !valid {
        return Err(ApiError::validation(format!(
            "{} must be a valid http(s) URL",
            field
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;
    use chrono::TimeZone;

    fn decode<T: DeserializeOwned>(query: &str) -> Result<T, ApiError> {
        let uri: Uri = format!("/items?{query}").parse().unwrap();
        Query::<T>::try_from_uri(&uri)
            .map(|Query(value)| value)
            .map_err(|rejection| ApiError::validation(rejection.body_text()))
    }

    fn bookmarks(query: &str) -> Result<BookmarkQuery, ApiError> {
        decode::<ListBookmarksQuery>(query)?.into_bookmark_query()
    }

    fn names(query: &str) -> Result<NameQuery, ApiError> {
        decode::<ListQuery>(query)?.into_name_query()
    }

    #[test]
    fn defaults_apply_to_an_empty_query() {
        assert_eq!(bookmarks("").unwrap(), BookmarkQuery::default());
        assert_eq!(names("").unwrap(), NameQuery::default());
    }

    #[test]
    fn tags_are_comma_separated() {
        let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
        let query = bookmarks(&format!("tags={t1},%20{t2},")).unwrap();
        assert_eq!(query.tag_ids, vec![t1, t2]);

        assert!(bookmarks(&format!("tags={t1}&tags={t2}")).is_err());
    }

    #[test]
    fn sort_labels_are_url_decoded() {
        let query = bookmarks("sort=Oldest+First").unwrap();
        assert_eq!(query.sort, BookmarkSort::OldestFirst);

        let query = bookmarks("sort=Alphabetical").unwrap();
        assert_eq!(query.sort, BookmarkSort::Alphabetical);

        assert!(bookmarks("sort=Newest").is_err());
    }

    #[test]
    fn blank_values_count_as_absent() {
        let query = bookmarks("folder=&search=%20%20&page=&sort=&tags=").unwrap();
        assert_eq!(query, BookmarkQuery::default());
    }

    #[test]
    fn pagination_bounds_are_enforced() {
        assert!(names("page=0").is_err());
        assert!(names("page=-1").is_err());
        assert!(names("limit=0").is_err());
        assert!(names("limit=101").is_err());
        assert!(names("limit=abc").is_err());
        assert_eq!(
            names("page=3&limit=100&search=%20work%20").unwrap(),
            NameQuery {
                search: Some("work".to_string()),
                pagination: Pagination { page: 3, limit: 100 },
            }
        );
    }

    #[test]
    fn date_range_uses_camel_case_keys() {
        let query = bookmarks("dateFrom=2024-03-05&dateTo=2024-03-06T12:00:00Z").unwrap();
        assert_eq!(
            query.created_from,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(
            query.created_to,
            Some(Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap())
        );
        assert!(bookmarks("dateFrom=yesterday").is_err());
    }

    #[test]
    fn plain_dates_mean_midnight_utc() {
        let date = parse_date("dateTo", "2024-03-05").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());

        let timestamp = parse_date("dateFrom", "2024-03-05T10:30:00+02:00").unwrap();
        assert_eq!(timestamp, Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 0).unwrap());

        assert!(parse_date("dateFrom", "05/03/2024").is_err());
    }

    #[test]
    fn invalid_ids_are_rejected() {
        assert!(bookmarks("folder=not-a-uuid").is_err());
        match bookmarks("tags=123") {
            Err(ApiError::Validation(message)) => assert_eq!(message, "tags must contain valid IDs"),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn text_fields_are_trimmed_and_bounded() {
        assert_eq!(required_text("name", "  Reading  ", 100).unwrap(), "Reading");
        assert!(required_text("name", "   ", 100).is_err());
        assert!(required_text("name", &"x".repeat(51), TAG_NAME_MAX).is_err());
        assert_eq!(optional_text("description", Some(" ".into()), 500).unwrap(), None);
        assert!(optional_text("description", Some("y".repeat(501)), 500).is_err());
    }

    #[test]
    fn only_http_urls_are_accepted() {
        assert_eq!(
            http_url("url", " https://a.example/x ").unwrap(),
            "https://a.example/x"
        );
        assert!(http_url("url", "http://localhost:8080").is_ok());
        assert!(http_url("url", "ftp://a.example").is_err());
        assert!(http_url("url", "a.example/x").is_err());
        assert!(http_url("url", "javascript:alert(1)").is_err());
    }
}
