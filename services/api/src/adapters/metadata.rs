//! services/api/src/adapters/metadata.rs
//!
//! Implements the `MetadataService` port by fetching a page with `reqwest`
//! and scraping its preview tags with `select`.

use std::time::Duration;

use async_trait::async_trait;
use keepstash_core::domain::UrlMetadata;
use keepstash_core::ports::{MetadataService, PortError, PortResult};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use select::document::Document;
use select::predicate::{Attr, Name, Predicate};
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;
/// Pages larger than this are not scraped.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub struct HttpMetadataAdapter {
    client: Client,
}

impl HttpMetadataAdapter {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataService for HttpMetadataAdapter {
    async fn fetch_url_metadata(&self, url: &str) -> PortResult<UrlMetadata> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(map_fetch_error)?;

        let body = read_capped(response, MAX_BODY_BYTES).await?;
        debug!("Fetched {} bytes from {}", body.len(), url);

        Ok(extract_metadata(&String::from_utf8_lossy(&body), url))
    }
}

/// Reads the body in chunks, giving up once it exceeds `limit` bytes.
async fn read_capped(mut response: Response, limit: usize) -> PortResult<Vec<u8>> {
    let too_large = || {
        PortError::Unexpected("The page is too large to read metadata from".to_string())
    };
    if response
        .content_length()
        .is_some_and(|declared| declared > limit as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_fetch_error)? {
        if body.len() + chunk.len() > limit {
            warn!("Stopped reading {} after {} bytes", response.url(), body.len());
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Maps a failed fetch to the error categories clients can act on.
fn map_fetch_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Timeout("Request timeout - the URL took too long to respond".to_string())
    } else if e.is_connect() {
        PortError::Unreachable(
            "Unable to reach the provided URL. Please check if the URL is correct and accessible."
                .to_string(),
        )
    } else if e.status() == Some(StatusCode::NOT_FOUND) {
        PortError::NotFound("URL not found".to_string())
    } else {
        warn!("Metadata fetch failed: {}", e);
        PortError::Unexpected("Failed to fetch metadata from the provided URL".to_string())
    }
}

/// Picks title and description from a page, Open Graph first, then the
/// Twitter card, then the plain HTML fallback.
pub fn extract_metadata(html: &str, url: &str) -> UrlMetadata {
    let document = Document::from(html);

    let meta_content = |attr: &'static str, value: &'static str| -> Option<String> {
        document
            .find(Name("meta").and(Attr(attr, value)))
            .filter_map(|node| node.attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(str::to_string)
    };

    let title = meta_content("property", "og:title")
        .or_else(|| meta_content("name", "twitter:title"))
        .or_else(|| {
            document
                .find(Name("title"))
                .next()
                .map(|node| node.text().trim().to_string())
                .filter(|text| !text.is_empty())
        });

    let description = meta_content("property", "og:description")
        .or_else(|| meta_content("name", "twitter:description"))
        .or_else(|| meta_content("name", "description"));

    UrlMetadata {
        title,
        description,
        url: url.to_string(),
    }
}
