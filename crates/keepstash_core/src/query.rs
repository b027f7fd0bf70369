//! crates/keepstash_core/src/query.rs
//!
//! Listing parameters and pagination results shared by every storage adapter.
//!
//! A `BookmarkQuery` is an immutable set of filters: each field is optional and
//! narrows the result set when present. Adapters translate it into their own
//! predicate language.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

//=========================================================================================
// Pagination
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    /// Number of rows to skip for this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(pagination: Pagination, total: u64) -> Self {
        let limit = u64::from(pagination.limit.max(1));
        Self {
            page: pagination.page,
            limit: pagination.limit,
            total,
            total_pages: total.div_ceil(limit),
        }
    }
}

/// One page of a listing plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: u64) -> Self {
        Self {
            items,
            meta: PageMeta::new(pagination, total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

//=========================================================================================
// Sorting
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookmarkSort {
    #[default]
    MostRecent,
    OldestFirst,
    Alphabetical,
}

impl BookmarkSort {
    pub const ALL: [BookmarkSort; 3] = [
        BookmarkSort::MostRecent,
        BookmarkSort::OldestFirst,
        BookmarkSort::Alphabetical,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BookmarkSort::MostRecent => "Most Recent",
            BookmarkSort::OldestFirst => "Oldest First",
            BookmarkSort::Alphabetical => "Alphabetical",
        }
    }
}

impl fmt::Display for BookmarkSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sort must be one of: Most Recent, Oldest First, Alphabetical")]
pub struct UnknownSort;

impl FromStr for BookmarkSort {
    type Err = UnknownSort;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookmarkSort::ALL
            .into_iter()
            .find(|sort| sort.label() == s)
            .ok_or(UnknownSort)
    }
}

//=========================================================================================
// Filters
//=========================================================================================

/// Filters for listing a user's active bookmarks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkQuery {
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    pub folder_id: Option<Uuid>,
    /// A bookmark matches only if it carries every one of these tags.
    pub tag_ids: Vec<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort: BookmarkSort,
    pub pagination: Pagination,
}

impl BookmarkQuery {
    /// The requested tags without duplicates, in first-seen order.
    pub fn required_tags(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.tag_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Returns the search term if it has any non-whitespace content.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Listing parameters for folders and tags, which filter by name only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameQuery {
    pub search: Option<String>,
    pub pagination: Pagination,
}

impl NameQuery {
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Tag AND semantics: true when `bookmark_tags` is a superset of `required`.
pub fn has_all_tags(bookmark_tags: &[Uuid], required: &[Uuid]) -> bool {
    let owned: HashSet<&Uuid> = bookmark_tags.iter().collect();
    required.iter().all(|id| owned.contains(id))
}
